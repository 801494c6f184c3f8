//! Query AST.
//!
//! The compiler IR between the request and the clause model. Every node is a
//! closed enum or struct borrowing its schema definitions (`'s`); the tree is
//! built by [`crate::query_planner::factory`] and consumed once by
//! [`Operation::transpile`].
//!
//! Transpilation is bottom-up: leaf fields become map projection items,
//! relationship fields become correlated `CALL { WITH parent ... }` blocks
//! projected through their return binding, filters become predicates plus
//! the subqueries they depend on.

pub mod aggregation;
pub mod composite;
pub mod connection;
pub mod fields;
pub mod filters;
pub mod mutations;
pub mod read;
pub mod sort;

use crate::graph_catalog::graph_schema::{Direction, Relationship};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::QueryContext;
use crate::render_plan::clauses::{
    Clause, NodePattern, Pattern, PatternDirection, RelationshipPattern, WithClause,
};
use crate::render_plan::render_expr::RenderExpr;

pub use aggregation::{
    AggregateOperation, AggregationFunction, AggregationItem, AggregationMeasure,
};
pub use composite::{CompositeConnectionReadOperation, CompositeReadOperation};
pub use connection::{ConnectionItem, ConnectionReadOperation, PageInfoField};
pub use fields::Field;
pub use filters::{
    AggregationFilter, Filter, FilterOperator, FilterValue, NullFilter, PropertyFilter,
    PropertyTarget, Quantifier, RelationshipFilter, RelationshipFilterTarget, Validation,
};
pub use mutations::{
    Assignment, CreateInput, CreateOperation, DeleteOperation, NestedMutation, UpdateOperation,
};
pub use read::ReadOperation;
pub use sort::{Pagination, Sort, SortTarget};

/// Output of transpiling one operation
#[derive(Debug, Clone, PartialEq)]
pub struct Transpiled {
    pub clauses: Vec<Clause>,
    /// Expression holding the operation's result; `None` when it returns nothing
    pub projection: Option<RenderExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation<'s> {
    Read(ReadOperation<'s>),
    ConnectionRead(ConnectionReadOperation<'s>),
    Aggregate(AggregateOperation<'s>),
    CompositeRead(CompositeReadOperation<'s>),
    CompositeConnectionRead(CompositeConnectionReadOperation<'s>),
    Create(CreateOperation<'s>),
    Update(UpdateOperation<'s>),
    Delete(DeleteOperation<'s>),
}

impl<'s> Operation<'s> {
    /// Clauses of this operation in `ctx`, ending with a `RETURN` of
    /// `ctx.return_binding` (deletes return nothing)
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Transpiled, CompilationError> {
        let clauses = match self {
            Operation::Read(op) => op.transpile(ctx)?,
            Operation::ConnectionRead(op) => op.transpile(ctx)?,
            Operation::Aggregate(op) => op.transpile(ctx)?,
            Operation::CompositeRead(op) => op.transpile(ctx)?,
            Operation::CompositeConnectionRead(op) => op.transpile(ctx)?,
            Operation::Create(op) => op.transpile(ctx)?,
            Operation::Update(op) => op.transpile(ctx)?,
            Operation::Delete(op) => {
                return Ok(Transpiled {
                    clauses: op.transpile(ctx)?,
                    projection: None,
                })
            }
        };
        Ok(Transpiled {
            clauses,
            projection: Some(RenderExpr::variable(ctx.return_binding.clone())),
        })
    }

    pub fn entity_name(&self) -> &'s str {
        match self {
            Operation::Read(op) => &op.entity.name,
            Operation::ConnectionRead(op) => &op.entity.name,
            Operation::Aggregate(op) => &op.entity.name,
            Operation::CompositeRead(op) => &op.composite.name,
            Operation::CompositeConnectionRead(op) => &op.composite.name,
            Operation::Create(op) => &op.entity.name,
            Operation::Update(op) => &op.entity.name,
            Operation::Delete(op) => &op.entity.name,
        }
    }
}

/// Pattern from `from` across `relationship` to `to`
pub(crate) fn traversal_pattern(
    from: &str,
    relationship: &Relationship,
    relationship_var: Option<&str>,
    to: NodePattern,
) -> Pattern {
    let direction = match relationship.direction {
        Direction::Out => PatternDirection::Right,
        Direction::In => PatternDirection::Left,
        Direction::Either => PatternDirection::Undirected,
    };
    Pattern::node(NodePattern::bound(from)).related(
        RelationshipPattern {
            variable: relationship_var.map(str::to_string),
            rel_type: Some(relationship.graph_type.clone()),
            direction,
        },
        to,
    )
}

/// Pattern used when writing a relationship; undirected relationships are
/// created outgoing
pub(crate) fn creation_pattern(
    from: &str,
    relationship: &Relationship,
    relationship_var: &str,
    to: &str,
) -> Pattern {
    let direction = match relationship.direction {
        Direction::In => PatternDirection::Left,
        Direction::Out | Direction::Either => PatternDirection::Right,
    };
    Pattern::node(NodePattern::bound(from)).related(
        RelationshipPattern {
            variable: Some(relationship_var.to_string()),
            rel_type: Some(relationship.graph_type.clone()),
            direction,
        },
        NodePattern::bound(to),
    )
}

/// Append `more`, separating it from a preceding updating clause with `WITH *`
pub(crate) fn append_after_update(clauses: &mut Vec<Clause>, more: Vec<Clause>) {
    let needs_separator = matches!(
        clauses.last(),
        Some(Clause::Set(_) | Clause::Create(_) | Clause::Merge(_) | Clause::Delete { .. })
    ) && matches!(
        more.first(),
        Some(Clause::Call(_) | Clause::Match(_) | Clause::Unwind { .. })
    );
    if needs_separator {
        clauses.push(Clause::With(WithClause::star()));
    }
    clauses.extend(more);
}

/// Borrowed view of any AST node, for uniform traversal
#[derive(Debug, Clone, Copy)]
pub enum AstNodeRef<'a, 's> {
    Operation(&'a Operation<'s>),
    Field(&'a Field<'s>),
    Filter(&'a Filter<'s>),
    Sort(&'a Sort<'s>),
    Validation(&'a Validation<'s>),
    Aggregation(&'a AggregationItem<'s>),
    Mutation(&'a NestedMutation<'s>),
}

fn filters<'a, 's>(filter: &'a Option<Filter<'s>>) -> impl Iterator<Item = AstNodeRef<'a, 's>> {
    filter.iter().map(AstNodeRef::Filter)
}

fn validations<'a, 's>(items: &'a [Validation<'s>]) -> impl Iterator<Item = AstNodeRef<'a, 's>> {
    items.iter().map(AstNodeRef::Validation)
}

fn fields<'a, 's>(items: &'a [Field<'s>]) -> impl Iterator<Item = AstNodeRef<'a, 's>> {
    items.iter().map(AstNodeRef::Field)
}

fn sorts<'a, 's>(items: &'a [Sort<'s>]) -> impl Iterator<Item = AstNodeRef<'a, 's>> {
    items.iter().map(AstNodeRef::Sort)
}

fn read_children<'a, 's>(op: &'a ReadOperation<'s>) -> Vec<AstNodeRef<'a, 's>> {
    fields(&op.fields)
        .chain(filters(&op.filter))
        .chain(validations(&op.validations))
        .chain(sorts(&op.sort))
        .collect()
}

fn connection_item_children<'a, 's>(items: &'a [ConnectionItem<'s>]) -> Vec<AstNodeRef<'a, 's>> {
    let mut children = Vec::new();
    for item in items {
        match item {
            ConnectionItem::Edges {
                node, properties, ..
            } => {
                if let Some((_, node_fields)) = node {
                    children.extend(fields(node_fields));
                }
                if let Some((_, edge_fields)) = properties {
                    children.extend(fields(edge_fields));
                }
            }
            ConnectionItem::Aggregate { items, .. } => {
                children.extend(items.iter().map(AstNodeRef::Aggregation))
            }
            ConnectionItem::TotalCount { .. }
            | ConnectionItem::PageInfo { .. }
            | ConnectionItem::Typename { .. } => {}
        }
    }
    children
}

impl<'a, 's> AstNodeRef<'a, 's> {
    pub fn children(&self) -> Vec<AstNodeRef<'a, 's>> {
        match *self {
            AstNodeRef::Operation(operation) => match operation {
                Operation::Read(op) => read_children(op),
                Operation::ConnectionRead(op) => {
                    let mut children: Vec<_> = filters(&op.filter)
                        .chain(validations(&op.validations))
                        .chain(sorts(&op.sort))
                        .collect();
                    children.extend(connection_item_children(&op.items));
                    children
                }
                Operation::Aggregate(op) => filters(&op.filter)
                    .chain(validations(&op.validations))
                    .chain(op.items.iter().map(AstNodeRef::Aggregation))
                    .collect(),
                Operation::CompositeRead(op) => {
                    let mut children: Vec<_> = sorts(&op.sort).collect();
                    for branch in &op.branches {
                        children.extend(read_children(branch));
                    }
                    children
                }
                Operation::CompositeConnectionRead(op) => {
                    let mut children: Vec<_> = sorts(&op.sort).collect();
                    for branch in &op.branches {
                        children.extend(read_children(&branch.read));
                        children.extend(fields(&branch.edge_fields));
                    }
                    children.extend(connection_item_children(&op.items));
                    children
                }
                Operation::Create(op) => {
                    let mut children: Vec<_> = fields(&op.fields).collect();
                    for input in &op.inputs {
                        children.extend(validations(&input.validations));
                        children.extend(input.nested.iter().map(AstNodeRef::Mutation));
                    }
                    children
                }
                Operation::Update(op) => filters(&op.filter)
                    .chain(validations(&op.before))
                    .chain(op.nested.iter().map(AstNodeRef::Mutation))
                    .chain(validations(&op.after))
                    .chain(fields(&op.fields))
                    .collect(),
                Operation::Delete(op) => filters(&op.filter)
                    .chain(validations(&op.before))
                    .chain(op.nested.iter().map(AstNodeRef::Mutation))
                    .collect(),
            },
            AstNodeRef::Field(field) => match field {
                Field::Relationship { operation, .. } | Field::Aggregation { operation, .. } => {
                    vec![AstNodeRef::Operation(operation)]
                }
                Field::Attribute { .. } | Field::Typename { .. } | Field::Computed { .. } => {
                    Vec::new()
                }
            },
            AstNodeRef::Filter(filter) => match filter {
                Filter::And(items) | Filter::Or(items) => {
                    items.iter().map(AstNodeRef::Filter).collect()
                }
                Filter::Not(inner) => vec![AstNodeRef::Filter(inner)],
                Filter::Relationship(relationship) => {
                    let mut children: Vec<_> = relationship
                        .targets
                        .iter()
                        .filter_map(|target| target.filter.as_ref())
                        .map(AstNodeRef::Filter)
                        .collect();
                    if let Some(edge) = &relationship.edge_filter {
                        children.push(AstNodeRef::Filter(edge));
                    }
                    children
                }
                Filter::Property(_)
                | Filter::Null(_)
                | Filter::Label(_)
                | Filter::Aggregation(_)
                | Filter::Authenticated => Vec::new(),
            },
            AstNodeRef::Validation(validation) => vec![AstNodeRef::Filter(&validation.predicate)],
            AstNodeRef::Aggregation(item) => match item {
                AggregationItem::Group { items, .. } => {
                    items.iter().map(AstNodeRef::Aggregation).collect()
                }
                AggregationItem::Measure { .. } | AggregationItem::Typename { .. } => Vec::new(),
            },
            AstNodeRef::Sort(_) => Vec::new(),
            AstNodeRef::Mutation(mutation) => mutation.children(),
        }
    }

    /// Whether this node introduces a new graph traversal scope
    fn opens_scope(&self) -> bool {
        match self {
            AstNodeRef::Operation(_) | AstNodeRef::Mutation(_) => true,
            AstNodeRef::Filter(filter) => {
                matches!(filter, Filter::Relationship(_) | Filter::Aggregation(_))
            }
            _ => false,
        }
    }

    /// Deepest chain of nested traversal scopes under (and including) this node
    pub fn depth(&self) -> usize {
        let own = usize::from(self.opens_scope());
        own + self
            .children()
            .iter()
            .map(|child| child.depth())
            .max()
            .unwrap_or(0)
    }
}
