//! Selected fields of one node scope and their projection.

use crate::graph_catalog::graph_schema::Attribute;
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::QueryContext;
use crate::render_plan::clauses::{Clause, WithClause};
use crate::render_plan::render_expr::{MapProjectionItem, ProjectionItem, RenderExpr};

use super::Operation;

#[derive(Debug, Clone, PartialEq)]
pub enum Field<'s> {
    Attribute {
        key: String,
        attribute: &'s Attribute,
    },
    /// Attribute backed by a schema statement
    Computed {
        key: String,
        attribute: &'s Attribute,
    },
    Typename {
        key: String,
        type_name: String,
    },
    /// Read, connection or composite read across a relationship
    Relationship {
        key: String,
        operation: Box<Operation<'s>>,
    },
    /// `<relationship>Aggregate`
    Aggregation {
        key: String,
        operation: Box<Operation<'s>>,
    },
}

pub(crate) struct FieldOutput {
    pub subqueries: Vec<Clause>,
    pub item: MapProjectionItem,
}

impl<'s> Field<'s> {
    pub fn key(&self) -> &str {
        match self {
            Field::Attribute { key, .. }
            | Field::Computed { key, .. }
            | Field::Typename { key, .. }
            | Field::Relationship { key, .. }
            | Field::Aggregation { key, .. } => key,
        }
    }

    /// Projection item for this field over `variable`, plus the subqueries
    /// it reads from
    pub(crate) fn transpile(
        &self,
        variable: &str,
        ctx: &QueryContext<'_>,
    ) -> Result<FieldOutput, CompilationError> {
        let leaf = |item: MapProjectionItem| -> Result<FieldOutput, CompilationError> {
            Ok(FieldOutput {
                subqueries: Vec::new(),
                item,
            })
        };
        match self {
            Field::Attribute { key, attribute } => leaf(attribute_projection(key, variable, attribute)),
            Field::Typename { key, type_name } => leaf(MapProjectionItem::Entry(
                key.clone(),
                RenderExpr::string(type_name.clone()),
            )),
            Field::Computed { key, attribute } => {
                let var = ctx.env().next_binding("var");
                let call = computed_call(ctx, attribute, &var)?;
                Ok(FieldOutput {
                    subqueries: vec![call],
                    item: MapProjectionItem::Entry(key.clone(), RenderExpr::variable(var)),
                })
            }
            Field::Relationship { key, operation } | Field::Aggregation { key, operation } => {
                let (call, var) = nested_operation_call(operation, ctx)?;
                Ok(FieldOutput {
                    subqueries: vec![call],
                    item: MapProjectionItem::Entry(key.clone(), RenderExpr::variable(var)),
                })
            }
        }
    }
}

/// Subqueries and `subject { ... }` map projection of the scope's node
pub(crate) fn project_fields(
    fields: &[Field<'_>],
    ctx: &QueryContext<'_>,
) -> Result<(Vec<Clause>, RenderExpr), CompilationError> {
    project_over(&ctx.subject, fields, ctx)
}

/// `relationship { ... }` projection of relationship properties
pub(crate) fn project_edge_fields(
    fields: &[Field<'_>],
    ctx: &QueryContext<'_>,
) -> Result<(Vec<Clause>, RenderExpr), CompilationError> {
    project_over(ctx.relationship_binding()?, fields, ctx)
}

fn project_over(
    variable: &str,
    fields: &[Field<'_>],
    ctx: &QueryContext<'_>,
) -> Result<(Vec<Clause>, RenderExpr), CompilationError> {
    let mut subqueries = Vec::new();
    let mut items = Vec::with_capacity(fields.len());
    for field in fields {
        let output = field.transpile(variable, ctx)?;
        subqueries.extend(output.subqueries);
        items.push(output.item);
    }
    Ok((
        subqueries,
        RenderExpr::MapProjection {
            variable: variable.to_string(),
            items,
        },
    ))
}

/// `.name` when the response key matches the stored property and the value
/// needs no conversion
fn attribute_projection(key: &str, variable: &str, attribute: &Attribute) -> MapProjectionItem {
    let stored = attribute.database_name();
    let converted = !attribute.is_list && (attribute.kind.is_temporal() || attribute.kind.is_spatial());
    if key == stored && !converted {
        return MapProjectionItem::Property(key.to_string());
    }
    MapProjectionItem::Entry(
        key.to_string(),
        attribute_value(RenderExpr::property(variable, stored), attribute),
    )
}

/// Stored value as the response represents it
pub(crate) fn attribute_value(value: RenderExpr, attribute: &Attribute) -> RenderExpr {
    if attribute.is_list {
        return value;
    }
    if attribute.kind.is_temporal() {
        return RenderExpr::function("toString", vec![value]);
    }
    if attribute.kind.is_spatial() {
        return RenderExpr::Case {
            condition: Box::new(RenderExpr::IsNotNull(Box::new(value.clone()))),
            then: Box::new(RenderExpr::Map(vec![
                ("point".to_string(), value.clone()),
                ("crs".to_string(), value.dot("crs")),
            ])),
            otherwise: Box::new(RenderExpr::null()),
        };
    }
    value
}

/// Correlated subquery running a computed field's statement with `this`
/// bound to the scope's node; its column comes back as `var`
pub(crate) fn computed_call(
    ctx: &QueryContext<'_>,
    attribute: &Attribute,
    var: &str,
) -> Result<Clause, CompilationError> {
    let computed = attribute.computed.as_ref().ok_or_else(|| {
        CompilationError::argument_with_context(
            &attribute.name,
            "attribute has no statement to evaluate",
        )
    })?;
    let subject = ctx.subject.clone();
    let column = ctx.env().next_binding("this");
    let statement = Clause::call(
        vec![subject.clone()],
        vec![
            Clause::With(WithClause::new(vec![ProjectionItem::aliased(
                RenderExpr::variable(subject.clone()),
                "this",
            )])),
            Clause::Raw(computed.statement.clone()),
        ],
    );
    let collected = RenderExpr::function("collect", vec![RenderExpr::variable(column.clone())]);
    let result = if attribute.is_list {
        collected
    } else {
        RenderExpr::function("head", vec![collected])
    };
    Ok(Clause::call(
        vec![subject],
        vec![
            statement,
            Clause::With(WithClause::new(vec![ProjectionItem::aliased(
                RenderExpr::variable(computed.column.clone()),
                column,
            )])),
            Clause::return_as(result, var),
        ],
    ))
}

/// `CALL { WITH subject <operation> }` for a relationship field; returns the
/// call and the variable holding its result
pub(crate) fn nested_operation_call(
    operation: &Operation<'_>,
    ctx: &QueryContext<'_>,
) -> Result<(Clause, String), CompilationError> {
    let env = ctx.env();
    let relationship = env.next_binding("this");
    let node = env.next_binding("this");
    let var = env.next_binding("var");
    let child = ctx.enter(node, Some(relationship), var.clone());
    let transpiled = operation.transpile(&child)?;
    Ok((
        Clause::call(vec![ctx.subject.clone()], transpiled.clauses),
        var,
    ))
}
