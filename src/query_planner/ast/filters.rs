//! Boolean filter trees.
//!
//! A filter transpiles to a predicate expression. Leaves that cannot be
//! expressed inline (aggregations, computed fields) push a correlated
//! `CALL { }` into the enclosing [`FilterScope`] and reference its output
//! variable instead. Within one scope, structurally identical subqueries are
//! emitted once.

use serde_json::Value;
use std::collections::HashMap;

use crate::graph_catalog::graph_schema::{Attribute, ConcreteEntity, Relationship};
use crate::graph_catalog::schema_types::ScalarKind;
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::QueryContext;
use crate::render_plan::clauses::{Clause, NodePattern, Pattern, WithClause};
use crate::render_plan::render_expr::{BinaryOperator, RenderExpr};

use super::aggregation::AggregationMeasure;
use super::fields::computed_call;
use super::traversal_pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    In,
    /// List attribute contains the value
    Includes,
}

impl FilterOperator {
    pub fn from_generic(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => FilterOperator::Eq,
            "gt" => FilterOperator::Gt,
            "gte" => FilterOperator::Gte,
            "lt" => FilterOperator::Lt,
            "lte" => FilterOperator::Lte,
            "contains" => FilterOperator::Contains,
            "startsWith" => FilterOperator::StartsWith,
            "endsWith" => FilterOperator::EndsWith,
            "in" => FilterOperator::In,
            "includes" => FilterOperator::Includes,
            _ => return None,
        })
    }

    pub fn is_textual(self) -> bool {
        matches!(
            self,
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith
        )
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte
        )
    }

    /// Operators usable against a scalar reduction
    pub fn is_comparison(self) -> bool {
        self == FilterOperator::Eq || self.is_ordering()
    }

    pub fn apply(self, left: RenderExpr, right: RenderExpr) -> RenderExpr {
        let operator = match self {
            FilterOperator::Eq => BinaryOperator::Equal,
            FilterOperator::Gt => BinaryOperator::GreaterThan,
            FilterOperator::Gte => BinaryOperator::GreaterThanOrEqual,
            FilterOperator::Lt => BinaryOperator::LessThan,
            FilterOperator::Lte => BinaryOperator::LessThanOrEqual,
            FilterOperator::Contains => BinaryOperator::Contains,
            FilterOperator::StartsWith => BinaryOperator::StartsWith,
            FilterOperator::EndsWith => BinaryOperator::EndsWith,
            FilterOperator::In => BinaryOperator::In,
            FilterOperator::Includes => {
                return RenderExpr::binary(right, BinaryOperator::In, left)
            }
        };
        RenderExpr::binary(left, operator, right)
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Literal(Value),
    /// Principal claim; compiled as a parameter guarded by `IS NOT NULL`
    Claim { path: String, value: Option<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyTarget<'s> {
    NodeAttribute(&'s Attribute),
    EdgeAttribute(&'s Attribute),
    Computed(&'s Attribute),
    Claim { path: String, value: Option<Value> },
}

impl<'s> PropertyTarget<'s> {
    pub fn kind(&self) -> Option<&ScalarKind> {
        match self {
            PropertyTarget::NodeAttribute(attribute)
            | PropertyTarget::EdgeAttribute(attribute)
            | PropertyTarget::Computed(attribute) => Some(&attribute.kind),
            PropertyTarget::Claim { .. } => None,
        }
    }

    fn expression(
        &self,
        ctx: &QueryContext<'_>,
        scope: &mut FilterScope,
        guards: &mut Vec<RenderExpr>,
    ) -> Result<RenderExpr, CompilationError> {
        match self {
            PropertyTarget::NodeAttribute(attribute) => Ok(RenderExpr::property(
                &ctx.subject,
                attribute.database_name(),
            )),
            PropertyTarget::EdgeAttribute(attribute) => Ok(RenderExpr::property(
                ctx.relationship_binding()?,
                attribute.database_name(),
            )),
            PropertyTarget::Computed(attribute) => {
                Ok(RenderExpr::variable(scope.computed(ctx, attribute)?))
            }
            PropertyTarget::Claim { value, .. } => {
                let param = ctx.env().add_param(value.clone().unwrap_or(Value::Null));
                guards.push(RenderExpr::IsNotNull(Box::new(param.clone())));
                Ok(param)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter<'s> {
    pub target: PropertyTarget<'s>,
    pub operator: FilterOperator,
    pub value: FilterValue,
    pub case_insensitive: bool,
}

impl<'s> PropertyFilter<'s> {
    fn transpile(
        &self,
        ctx: &QueryContext<'_>,
        scope: &mut FilterScope,
    ) -> Result<RenderExpr, CompilationError> {
        let env = ctx.env();
        let mut guards = Vec::new();
        let mut left = self.target.expression(ctx, scope, &mut guards)?;
        let mut right = match &self.value {
            FilterValue::Literal(value) => match self.operator {
                FilterOperator::In => env.add_typed_list_param(value.clone(), self.target.kind()),
                _ => env.add_typed_param(value.clone(), self.target.kind()),
            },
            FilterValue::Claim { value, .. } => {
                let param = env.add_param(value.clone().unwrap_or(Value::Null));
                guards.push(RenderExpr::IsNotNull(Box::new(param.clone())));
                param
            }
        };
        if self.case_insensitive {
            left = RenderExpr::function("toLower", vec![left]);
            right = RenderExpr::function("toLower", vec![right]);
        }
        guards.push(self.operator.apply(left, right));
        Ok(RenderExpr::and_all(guards).unwrap_or_else(|| RenderExpr::boolean(true)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NullFilter<'s> {
    pub target: PropertyTarget<'s>,
    pub is_null: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Some,
    All,
    None,
    Single,
}

impl Quantifier {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "some" | "SOME" => Quantifier::Some,
            "all" | "ALL" => Quantifier::All,
            "none" | "NONE" => Quantifier::None,
            "single" | "SINGLE" => Quantifier::Single,
            _ => return None,
        })
    }
}

/// One possible target of a relationship filter. Composite targets have one
/// per constituent, each guarded by its label.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipFilterTarget<'s> {
    pub entity: &'s ConcreteEntity,
    pub filter: Option<Filter<'s>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipFilter<'s> {
    pub relationship: &'s Relationship,
    pub quantifier: Quantifier,
    pub targets: Vec<RelationshipFilterTarget<'s>>,
    pub composite: bool,
    pub edge_filter: Option<Box<Filter<'s>>>,
}

impl<'s> RelationshipFilter<'s> {
    fn transpile(&self, ctx: &QueryContext<'_>) -> Result<RenderExpr, CompilationError> {
        let env = ctx.env();
        let relationship_var = env.next_binding("this");
        let node_var = env.next_binding("this");
        let inner = ctx.enter(
            node_var.clone(),
            Some(relationship_var.clone()),
            ctx.return_binding.clone(),
        );

        let labels = match (self.composite, self.targets.first()) {
            (false, Some(target)) => target.entity.labels.clone(),
            _ => Vec::new(),
        };
        let pattern = traversal_pattern(
            &ctx.subject,
            self.relationship,
            Some(&relationship_var),
            NodePattern::new(node_var.clone(), &labels),
        );

        let mut scope = FilterScope::new();
        let mut parts = Vec::new();
        if self.composite {
            let mut alternatives = Vec::new();
            for target in &self.targets {
                let label = RenderExpr::HasLabels {
                    variable: node_var.clone(),
                    labels: target.entity.labels.clone(),
                };
                let mut conjunction = vec![label];
                if let Some(filter) = &target.filter {
                    conjunction.push(filter.transpile(&inner, &mut scope)?);
                }
                alternatives.extend(RenderExpr::and_all(conjunction));
            }
            // Narrowed to no constituent: nothing can match
            parts.push(RenderExpr::or_all(alternatives).unwrap_or_else(|| RenderExpr::boolean(false)));
        } else if let Some(filter) = self.targets.first().and_then(|t| t.filter.as_ref()) {
            parts.push(filter.transpile(&inner, &mut scope)?);
        }
        if let Some(edge) = &self.edge_filter {
            parts.push(edge.transpile(&inner, &mut scope)?);
        }
        let predicate = RenderExpr::and_all(parts);
        let subqueries = scope.into_clauses();
        let body = |predicate: Option<RenderExpr>| subquery_body(&pattern, &subqueries, predicate);

        Ok(match (self.quantifier, predicate) {
            (Quantifier::Some, predicate) => RenderExpr::Exists(body(predicate)),
            (Quantifier::None, predicate) => RenderExpr::Exists(body(predicate)).negate(),
            (Quantifier::Single, predicate) => RenderExpr::equals(
                RenderExpr::CountSubquery(body(predicate)),
                RenderExpr::integer(1),
            ),
            (Quantifier::All, None) => RenderExpr::Exists(body(None)),
            (Quantifier::All, Some(predicate)) => RenderExpr::And(vec![
                RenderExpr::Exists(body(Some(predicate.clone()))),
                RenderExpr::Exists(body(Some(predicate.negate()))).negate(),
            ]),
        })
    }
}

/// Aggregation leaf: compare one reduction over a relationship's targets
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationFilter<'s> {
    pub relationship: &'s Relationship,
    pub target: &'s ConcreteEntity,
    pub measure: AggregationMeasure<'s>,
    pub operator: FilterOperator,
    pub value: Value,
}

impl<'s> AggregationFilter<'s> {
    fn structural_key(&self, subject: &str) -> String {
        format!(
            "aggregate:{}:{}:{}:{:?}:{}",
            subject,
            self.relationship.name,
            self.measure.key(),
            self.operator,
            self.value
        )
    }

    /// `CALL { WITH subject MATCH ... RETURN <reduction> <op> $param AS var }`
    fn subquery(&self, ctx: &QueryContext<'_>, var: &str) -> Result<Clause, CompilationError> {
        let env = ctx.env();
        let relationship_var = env.next_binding("this");
        let node_var = env.next_binding("this");
        let pattern = traversal_pattern(
            &ctx.subject,
            self.relationship,
            Some(&relationship_var),
            NodePattern::new(node_var.clone(), &self.target.labels),
        );
        let (prelude, reduction) = self.measure.reduction(
            RenderExpr::variable(node_var),
            Some(RenderExpr::variable(relationship_var)),
        )?;
        let compared = if self.measure.compares_length() {
            RenderExpr::function("size", vec![reduction])
        } else {
            reduction
        };
        let param = env.add_typed_param(self.value.clone(), self.measure.value_kind());

        let mut body = vec![Clause::matching(pattern, None)];
        body.extend(prelude);
        body.push(Clause::return_as(self.operator.apply(compared, param), var));
        Ok(Clause::call(vec![ctx.subject.clone()], body))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter<'s> {
    And(Vec<Filter<'s>>),
    Or(Vec<Filter<'s>>),
    Not(Box<Filter<'s>>),
    Property(PropertyFilter<'s>),
    Null(NullFilter<'s>),
    /// Subject carries all these labels
    Label(Vec<String>),
    Relationship(RelationshipFilter<'s>),
    Aggregation(AggregationFilter<'s>),
    /// Principal is authenticated
    Authenticated,
}

impl<'s> Filter<'s> {
    /// AND-combine, flattening nested conjunctions
    pub fn and(filters: Vec<Filter<'s>>) -> Option<Filter<'s>> {
        let mut flat = Vec::with_capacity(filters.len());
        for filter in filters {
            match filter {
                Filter::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Filter::And(flat)),
        }
    }

    pub fn transpile(
        &self,
        ctx: &QueryContext<'_>,
        scope: &mut FilterScope,
    ) -> Result<RenderExpr, CompilationError> {
        match self {
            Filter::And(items) => {
                let parts = items
                    .iter()
                    .map(|f| f.transpile(ctx, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RenderExpr::and_all(parts).unwrap_or_else(|| RenderExpr::boolean(true)))
            }
            Filter::Or(items) => {
                let parts = items
                    .iter()
                    .map(|f| f.transpile(ctx, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RenderExpr::or_all(parts).unwrap_or_else(|| RenderExpr::boolean(false)))
            }
            Filter::Not(inner) => Ok(inner.transpile(ctx, scope)?.negate()),
            Filter::Property(filter) => filter.transpile(ctx, scope),
            Filter::Null(filter) => {
                let mut guards = Vec::new();
                let target = filter.target.expression(ctx, scope, &mut guards)?;
                Ok(if filter.is_null {
                    RenderExpr::IsNull(Box::new(target))
                } else {
                    RenderExpr::IsNotNull(Box::new(target))
                })
            }
            Filter::Label(labels) => Ok(RenderExpr::HasLabels {
                variable: ctx.subject.clone(),
                labels: labels.clone(),
            }),
            Filter::Relationship(filter) => filter.transpile(ctx),
            Filter::Aggregation(filter) => {
                let var = scope.aggregation(ctx, filter)?;
                Ok(RenderExpr::equals(
                    RenderExpr::variable(var),
                    RenderExpr::boolean(true),
                ))
            }
            Filter::Authenticated => {
                let env = ctx.env();
                let param = env.add_param(Value::Bool(env.principal.authenticated));
                Ok(RenderExpr::equals(param, RenderExpr::boolean(true)))
            }
        }
    }
}

/// Subqueries a filter depends on, deduplicated by structure
#[derive(Debug, Default)]
pub struct FilterScope {
    cache: HashMap<String, String>,
    subqueries: Vec<Clause>,
}

impl FilterScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subqueries.is_empty()
    }

    pub fn into_clauses(self) -> Vec<Clause> {
        self.subqueries
    }

    fn computed(
        &mut self,
        ctx: &QueryContext<'_>,
        attribute: &Attribute,
    ) -> Result<String, CompilationError> {
        let key = format!("computed:{}:{}", ctx.subject, attribute.name);
        if let Some(var) = self.cache.get(&key) {
            return Ok(var.clone());
        }
        let var = ctx.env().next_binding("var");
        self.subqueries.push(computed_call(ctx, attribute, &var)?);
        self.cache.insert(key, var.clone());
        Ok(var)
    }

    fn aggregation(
        &mut self,
        ctx: &QueryContext<'_>,
        filter: &AggregationFilter<'_>,
    ) -> Result<String, CompilationError> {
        let key = filter.structural_key(&ctx.subject);
        if let Some(var) = self.cache.get(&key) {
            log::trace!("Reusing aggregation subquery {} for {}", var, key);
            return Ok(var.clone());
        }
        let var = ctx.env().next_binding("var");
        self.subqueries.push(filter.subquery(ctx, &var)?);
        self.cache.insert(key, var.clone());
        Ok(var)
    }
}

/// `MATCH pattern` followed by the filter's subqueries and predicate
fn subquery_body(
    pattern: &Pattern,
    subqueries: &[Clause],
    predicate: Option<RenderExpr>,
) -> Vec<Clause> {
    if subqueries.is_empty() {
        return vec![Clause::matching(pattern.clone(), predicate)];
    }
    let mut clauses = vec![Clause::matching(pattern.clone(), None)];
    clauses.extend(subqueries.iter().cloned());
    if let Some(predicate) = predicate {
        clauses.push(Clause::With(WithClause::filtered(predicate)));
    }
    clauses
}

/// MATCH over `pattern` restricted by `filter`, evaluated in `ctx`
pub fn filtered_match(
    pattern: Pattern,
    filter: Option<&Filter<'_>>,
    ctx: &QueryContext<'_>,
) -> Result<Vec<Clause>, CompilationError> {
    let mut scope = FilterScope::new();
    let predicate = filter.map(|f| f.transpile(ctx, &mut scope)).transpose()?;
    Ok(subquery_body(&pattern, &scope.into_clauses(), predicate))
}

/// Authorization assertion: a predicate that must hold or the program aborts
#[derive(Debug, Clone, PartialEq)]
pub struct Validation<'s> {
    pub predicate: Filter<'s>,
}

/// `WITH * WHERE apoc.util.validatePredicate(NOT (...), "Forbidden", [0])`,
/// preceded by any subqueries the predicates need. Each validation is
/// compiled in its own scope.
pub fn validation_clauses(
    validations: &[Validation<'_>],
    ctx: &QueryContext<'_>,
) -> Result<Vec<Clause>, CompilationError> {
    let mut clauses = Vec::new();
    let mut predicates = Vec::with_capacity(validations.len());
    for validation in validations {
        let mut scope = FilterScope::new();
        predicates.push(validation.predicate.transpile(ctx, &mut scope)?);
        clauses.extend(scope.into_clauses());
    }
    let Some(predicate) = RenderExpr::and_all(predicates) else {
        return Ok(clauses);
    };
    let assertion = RenderExpr::function(
        "apoc.util.validatePredicate",
        vec![
            predicate.negate(),
            RenderExpr::string(ctx.env().forbidden_message()),
            RenderExpr::List(vec![RenderExpr::integer(0)]),
        ],
    );
    clauses.push(Clause::With(WithClause::filtered(assertion)));
    Ok(clauses)
}
