use crate::graph_catalog::graph_schema::{ConcreteEntity, Relationship};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::QueryContext;
use crate::render_plan::clauses::{Clause, NodePattern, Pattern, WithClause};
use crate::render_plan::render_expr::{ProjectionItem, RenderExpr};

use super::fields::{project_fields, Field};
use super::filters::{filtered_match, validation_clauses, Filter, Validation};
use super::sort::{sort_clauses, sort_key, Pagination, Sort};
use super::traversal_pattern;

/// Read of one concrete entity, at the root or across a relationship
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation<'s> {
    pub entity: &'s ConcreteEntity,
    /// Relationship from the parent scope; `None` at the root
    pub relationship: Option<&'s Relationship>,
    pub filter: Option<Filter<'s>>,
    pub validations: Vec<Validation<'s>>,
    pub fields: Vec<Field<'s>>,
    pub sort: Vec<Sort<'s>>,
    pub pagination: Pagination,
}

impl<'s> ReadOperation<'s> {
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let mut clauses = self.distinct_targets(ctx)?;
        clauses.extend(sort_clauses(&self.sort, &self.pagination, ctx)?);
        let (subqueries, projection) = project_fields(&self.fields, ctx)?;
        clauses.extend(subqueries);
        match self.relationship {
            None => clauses.push(Clause::return_as(projection, ctx.return_binding.clone())),
            Some(relationship) => {
                clauses.push(Clause::With(WithClause::new(vec![ProjectionItem::aliased(
                    projection,
                    ctx.subject.clone(),
                )])));
                clauses.push(Clause::return_as(
                    collect_result(RenderExpr::variable(ctx.subject.clone()), relationship.is_list),
                    ctx.return_binding.clone(),
                ));
            }
        }
        Ok(clauses)
    }

    /// Matched, filtered and validated nodes of this scope
    pub(crate) fn traversal(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        scope_match(
            self.entity,
            self.relationship,
            self.filter.as_ref(),
            &self.validations,
            ctx,
        )
    }

    /// Traversal that yields each related node once, however many
    /// relationships lead to it
    fn distinct_targets(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let mut clauses = self.traversal(ctx)?;
        if self.relationship.is_some() {
            clauses.push(Clause::With(WithClause {
                distinct: true,
                ..WithClause::new(vec![ProjectionItem::variable(&ctx.subject)])
            }));
        }
        Ok(clauses)
    }

    /// One UNION branch of a composite read:
    /// `RETURN subject { ... } AS column, <key> AS sort_column, ...`.
    /// On a branch, `sort` holds the keys the merged rows are ordered by;
    /// they travel as their own columns, outside the response map.
    pub(crate) fn transpile_branch(
        &self,
        ctx: &QueryContext<'_>,
        column: &str,
        sort_columns: &[String],
    ) -> Result<Vec<Clause>, CompilationError> {
        let mut clauses = import_parent(ctx)?;
        clauses.extend(self.distinct_targets(ctx)?);
        let (subqueries, projection) = project_fields(&self.fields, ctx)?;
        clauses.extend(subqueries);
        let mut items = vec![ProjectionItem::aliased(projection, column)];
        for (sort, sort_column) in self.sort.iter().zip(sort_columns) {
            let key = sort_key(sort, ctx, &mut clauses)?;
            items.push(ProjectionItem::aliased(key, sort_column.clone()));
        }
        clauses.push(Clause::returning(items));
        Ok(clauses)
    }
}

/// `MATCH` of the scope's node (from the parent across `relationship` when
/// nested), then filter and validations
pub(crate) fn scope_match(
    entity: &ConcreteEntity,
    relationship: Option<&Relationship>,
    filter: Option<&Filter<'_>>,
    validations: &[Validation<'_>],
    ctx: &QueryContext<'_>,
) -> Result<Vec<Clause>, CompilationError> {
    let node = NodePattern::new(ctx.subject.clone(), &entity.labels);
    let pattern = match relationship {
        Some(relationship) => traversal_pattern(
            ctx.parent_subject()?,
            relationship,
            Some(ctx.relationship_binding()?),
            node,
        ),
        None => Pattern::node(node),
    };
    let mut clauses = filtered_match(pattern, filter, ctx)?;
    clauses.extend(validation_clauses(validations, ctx)?);
    Ok(clauses)
}

/// Explicit `WITH parent` opening a UNION branch inside a correlated subquery
pub(crate) fn import_parent(ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
    if ctx.is_root() {
        return Ok(Vec::new());
    }
    Ok(vec![Clause::With(WithClause::new(vec![
        ProjectionItem::variable(ctx.parent_subject()?),
    ]))])
}

/// `collect(x)`, or `head(collect(x))` for single-valued relationships
pub(crate) fn collect_result(value: RenderExpr, is_list: bool) -> RenderExpr {
    let collected = RenderExpr::function("collect", vec![value]);
    if is_list {
        collected
    } else {
        RenderExpr::function("head", vec![collected])
    }
}
