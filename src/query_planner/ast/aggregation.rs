use crate::graph_catalog::graph_schema::{Attribute, ConcreteEntity, Relationship};
use crate::graph_catalog::schema_types::ScalarKind;
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::{Environment, QueryContext};
use crate::render_plan::clauses::{Clause, WithClause};
use crate::render_plan::render_expr::{OrderByItem, ProjectionItem, RenderExpr};

use super::filters::{Filter, Validation};
use super::read::scope_match;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationFunction {
    Min,
    Max,
    Average,
    Sum,
    Shortest,
    Longest,
    AverageLength,
}

impl AggregationFunction {
    /// Reductions selectable in an aggregate selection
    pub fn from_selection(name: &str) -> Option<Self> {
        Some(match name {
            "min" => AggregationFunction::Min,
            "max" => AggregationFunction::Max,
            "average" => AggregationFunction::Average,
            "sum" => AggregationFunction::Sum,
            "shortest" => AggregationFunction::Shortest,
            "longest" => AggregationFunction::Longest,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggregationFunction::Min => "min",
            AggregationFunction::Max => "max",
            AggregationFunction::Average => "average",
            AggregationFunction::Sum => "sum",
            AggregationFunction::Shortest => "shortest",
            AggregationFunction::Longest => "longest",
            AggregationFunction::AverageLength => "averageLength",
        }
    }

    /// Reject reductions the attribute's kind does not support
    pub fn check(self, attribute: &Attribute, path: &str) -> Result<(), CompilationError> {
        let supported = !attribute.is_list
            && match self {
                AggregationFunction::Average | AggregationFunction::Sum => {
                    attribute.kind.is_numeric()
                }
                AggregationFunction::Shortest
                | AggregationFunction::Longest
                | AggregationFunction::AverageLength => attribute.kind == ScalarKind::String,
                AggregationFunction::Min | AggregationFunction::Max => attribute.kind.is_ordered(),
            };
        if supported {
            Ok(())
        } else {
            Err(CompilationError::aggregation_with_context(
                path,
                format!(
                    "`{}` is not defined for {} attribute `{}`",
                    self.as_str(),
                    attribute.kind,
                    attribute.name
                ),
            ))
        }
    }
}

/// What an aggregation reduces
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregationMeasure<'s> {
    /// `count(DISTINCT node)`
    CountNodes,
    /// `count(relationship)`, every matched edge
    CountEdges,
    Node(&'s Attribute, AggregationFunction),
    Edge(&'s Attribute, AggregationFunction),
}

impl<'s> AggregationMeasure<'s> {
    /// Clauses that must precede the reduction, and the reduction itself
    pub fn reduction(
        &self,
        node: RenderExpr,
        relationship: Option<RenderExpr>,
    ) -> Result<(Vec<Clause>, RenderExpr), CompilationError> {
        match self {
            AggregationMeasure::CountNodes => Ok((
                Vec::new(),
                RenderExpr::function("count", vec![RenderExpr::Distinct(Box::new(node))]),
            )),
            AggregationMeasure::CountEdges => {
                let relationship =
                    relationship.ok_or_else(|| CompilationError::missing_binding("relationship"))?;
                Ok((Vec::new(), RenderExpr::function("count", vec![relationship])))
            }
            AggregationMeasure::Node(attribute, function) => {
                Ok(reduce(node.dot(attribute.database_name()), *function))
            }
            AggregationMeasure::Edge(attribute, function) => {
                let relationship =
                    relationship.ok_or_else(|| CompilationError::missing_binding("relationship"))?;
                Ok(reduce(relationship.dot(attribute.database_name()), *function))
            }
        }
    }

    /// Longest/shortest reduce to a string; filters compare its length
    pub fn compares_length(&self) -> bool {
        matches!(
            self,
            AggregationMeasure::Node(
                _,
                AggregationFunction::Longest | AggregationFunction::Shortest
            ) | AggregationMeasure::Edge(
                _,
                AggregationFunction::Longest | AggregationFunction::Shortest
            )
        )
    }

    /// Kind of the reduced value when it keeps the attribute's type
    pub fn value_kind(&self) -> Option<&'s ScalarKind> {
        match *self {
            AggregationMeasure::Node(attribute, function)
            | AggregationMeasure::Edge(attribute, function) => match function {
                AggregationFunction::Min
                | AggregationFunction::Max
                | AggregationFunction::Average
                | AggregationFunction::Sum => Some(&attribute.kind),
                _ => None,
            },
            AggregationMeasure::CountNodes | AggregationMeasure::CountEdges => None,
        }
    }

    pub fn key(&self) -> String {
        match self {
            AggregationMeasure::CountNodes => "nodes".to_string(),
            AggregationMeasure::CountEdges => "edges".to_string(),
            AggregationMeasure::Node(attribute, function) => {
                format!("node.{}.{}", attribute.name, function.as_str())
            }
            AggregationMeasure::Edge(attribute, function) => {
                format!("edge.{}.{}", attribute.name, function.as_str())
            }
        }
    }
}

fn reduce(value: RenderExpr, function: AggregationFunction) -> (Vec<Clause>, RenderExpr) {
    let simple = |name: &str, value: RenderExpr| (Vec::new(), RenderExpr::function(name, vec![value]));
    match function {
        AggregationFunction::Min => simple("min", value),
        AggregationFunction::Max => simple("max", value),
        AggregationFunction::Average => simple("avg", value),
        AggregationFunction::Sum => simple("sum", value),
        AggregationFunction::AverageLength => {
            simple("avg", RenderExpr::function("size", vec![value]))
        }
        AggregationFunction::Longest | AggregationFunction::Shortest => {
            // longest first; ties keep match order
            let ordering = WithClause {
                order_by: vec![OrderByItem {
                    expression: RenderExpr::function("size", vec![value.clone()]),
                    descending: true,
                }],
                ..WithClause::star()
            };
            let pick = if function == AggregationFunction::Longest {
                "head"
            } else {
                "last"
            };
            (
                vec![Clause::With(ordering)],
                RenderExpr::function(
                    pick,
                    vec![RenderExpr::function("collect", vec![value])],
                ),
            )
        }
    }
}

/// One entry of an aggregate selection
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationItem<'s> {
    Measure {
        key: String,
        measure: AggregationMeasure<'s>,
    },
    /// Nested map: `count { nodes edges }`, `node { ... }`, `age { min max }`
    Group {
        key: String,
        items: Vec<AggregationItem<'s>>,
    },
    Typename {
        key: String,
        type_name: String,
    },
}

/// Build the result map of `items`, pushing one isolated subquery per measure
pub(crate) fn project_items<'s, F>(
    items: &[AggregationItem<'s>],
    env: &Environment<'_>,
    calls: &mut Vec<Clause>,
    call_for: &mut F,
) -> Result<RenderExpr, CompilationError>
where
    F: FnMut(&AggregationMeasure<'s>, &str) -> Result<Clause, CompilationError>,
{
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match item {
            AggregationItem::Measure { key, measure } => {
                let var = env.next_binding("var");
                calls.push(call_for(measure, &var)?);
                entries.push((key.clone(), RenderExpr::variable(var)));
            }
            AggregationItem::Group { key, items } => {
                entries.push((key.clone(), project_items(items, env, calls, call_for)?));
            }
            AggregationItem::Typename { key, type_name } => {
                entries.push((key.clone(), RenderExpr::string(type_name.clone())));
            }
        }
    }
    Ok(RenderExpr::Map(entries))
}

/// Measure over a collected connection edge list:
/// `CALL { WITH edges UNWIND edges AS edge WITH edge.node AS n ... RETURN ... }`
pub(crate) fn edge_list_call(
    edges: &str,
    ctx: &QueryContext<'_>,
    measure: &AggregationMeasure<'_>,
    var: &str,
) -> Result<Clause, CompilationError> {
    let edge = ctx.env().next_binding("edge");
    let mut items = vec![ProjectionItem::aliased(
        RenderExpr::variable(edge.clone()).dot("node"),
        ctx.subject.clone(),
    )];
    if let Some(relationship) = &ctx.relationship {
        items.push(ProjectionItem::aliased(
            RenderExpr::variable(edge.clone()).dot("relationship"),
            relationship.clone(),
        ));
    }
    let (prelude, reduction) = measure.reduction(
        RenderExpr::variable(ctx.subject.clone()),
        ctx.relationship.clone().map(RenderExpr::Variable),
    )?;
    let mut body = vec![
        Clause::Unwind {
            expression: RenderExpr::variable(edges),
            alias: edge,
        },
        Clause::With(WithClause::new(items)),
    ];
    body.extend(prelude);
    body.push(Clause::return_as(reduction, var));
    Ok(Clause::call(vec![edges.to_string()], body))
}

/// Root `*Aggregate` operation, or a relationship aggregation field
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOperation<'s> {
    pub entity: &'s ConcreteEntity,
    pub relationship: Option<&'s Relationship>,
    pub filter: Option<Filter<'s>>,
    pub validations: Vec<Validation<'s>>,
    pub items: Vec<AggregationItem<'s>>,
}

impl<'s> AggregateOperation<'s> {
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let mut calls = Vec::new();
        let projection = project_items(&self.items, ctx.env(), &mut calls, &mut |measure, var| {
            self.measure_call(ctx, measure, var)
        })?;
        calls.push(Clause::return_as(projection, ctx.return_binding.clone()));
        Ok(calls)
    }

    /// Isolated subquery: traverse, filter, then reduce
    fn measure_call(
        &self,
        ctx: &QueryContext<'_>,
        measure: &AggregationMeasure<'_>,
        var: &str,
    ) -> Result<Clause, CompilationError> {
        let imports = match self.relationship {
            Some(_) => vec![ctx.parent_subject()?.to_string()],
            None => Vec::new(),
        };
        let mut body = scope_match(
            self.entity,
            self.relationship,
            self.filter.as_ref(),
            &self.validations,
            ctx,
        )?;
        let (prelude, reduction) = measure.reduction(
            RenderExpr::variable(ctx.subject.clone()),
            ctx.relationship.clone().map(RenderExpr::Variable),
        )?;
        body.extend(prelude);
        body.push(Clause::return_as(reduction, var));
        Ok(Clause::call(imports, body))
    }
}
