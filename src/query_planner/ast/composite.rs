//! Reads over interfaces and unions.
//!
//! Each constituent becomes one branch of a `CALL { ... UNION ... }`; every
//! branch returns a single column of the same name so the union is well
//! formed. Sorting and paging apply to the merged rows.

use crate::graph_catalog::graph_schema::{CompositeEntity, Relationship};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::QueryContext;
use crate::render_plan::clauses::{Clause, WithClause};
use crate::render_plan::render_expr::{OrderByItem, ProjectionItem, RenderExpr};

use super::connection::{collect_edges, item_key, ConnectionItem, Window};
use super::fields::{project_edge_fields, project_fields, Field};
use super::read::{collect_result, import_parent, ReadOperation};
use super::sort::{sort_key, Pagination, Sort};

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeReadOperation<'s> {
    pub composite: &'s CompositeEntity,
    pub relationship: Option<&'s Relationship>,
    /// One per selected constituent, in declaration order
    pub branches: Vec<ReadOperation<'s>>,
    pub sort: Vec<Sort<'s>>,
    pub pagination: Pagination,
}

impl<'s> CompositeReadOperation<'s> {
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let env = ctx.env();
        let column = env.next_binding("var");
        let sort_columns = sort_columns(&self.sort, ctx);
        let bodies = branch_bodies(&self.branches, ctx, |branch, branch_ctx| {
            branch.transpile_branch(branch_ctx, &column, &sort_columns)
        })?;
        let mut clauses = vec![union_call(&self.composite.name, bodies, &column)?];

        if !self.sort.is_empty() || !self.pagination.is_empty() {
            let order_by = self
                .sort
                .iter()
                .zip(&sort_columns)
                .map(|(sort, sort_column)| OrderByItem {
                    expression: RenderExpr::variable(sort_column.clone()),
                    descending: sort.descending,
                })
                .collect();
            let (skip, limit) = self.pagination.params(env);
            let mut items = vec![ProjectionItem::variable(&column)];
            items.extend(sort_columns.iter().map(|name| ProjectionItem::variable(name)));
            clauses.push(Clause::With(WithClause {
                order_by,
                skip,
                limit,
                ..WithClause::new(items)
            }));
        }

        let result = match self.relationship {
            None => RenderExpr::variable(column),
            Some(relationship) => collect_result(RenderExpr::variable(column), relationship.is_list),
        };
        clauses.push(Clause::return_as(result, ctx.return_binding.clone()));
        Ok(clauses)
    }
}

/// Constituent branch of a composite connection: the node read plus the
/// relationship properties selected on its edges
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionBranch<'s> {
    pub read: ReadOperation<'s>,
    pub edge_fields: Vec<Field<'s>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeConnectionReadOperation<'s> {
    pub composite: &'s CompositeEntity,
    pub relationship: Option<&'s Relationship>,
    pub branches: Vec<ConnectionBranch<'s>>,
    pub sort: Vec<Sort<'s>>,
    pub pagination: Pagination,
    pub items: Vec<ConnectionItem<'s>>,
}

impl<'s> CompositeConnectionReadOperation<'s> {
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let env = ctx.env();
        let column = env.next_binding("var");
        let sort_columns = sort_columns(&self.sort, ctx);
        let bodies = branch_bodies(&self.branches, ctx, |branch, branch_ctx| {
            let mut clauses = import_parent(branch_ctx)?;
            clauses.extend(branch.read.traversal(branch_ctx)?);
            let (subqueries, node) = project_fields(&branch.read.fields, branch_ctx)?;
            clauses.extend(subqueries);
            let mut edge = vec![("node".to_string(), node)];
            if branch_ctx.relationship.is_some() {
                let (subqueries, properties) = project_edge_fields(&branch.edge_fields, branch_ctx)?;
                clauses.extend(subqueries);
                edge.push(("properties".to_string(), properties));
            }
            // Sort keys ride along in the edge map; the response only reads
            // `node` and `properties` from it
            for (sort, sort_column) in branch.read.sort.iter().zip(&sort_columns) {
                let key = sort_key(sort, branch_ctx, &mut clauses)?;
                edge.push((sort_column.clone(), key));
            }
            clauses.push(Clause::return_as(RenderExpr::Map(edge), &column));
            Ok(clauses)
        })?;
        let mut clauses = vec![union_call(&self.composite.name, bodies, &column)?];

        let edges = env.next_binding("edges");
        let total = env.next_binding("totalCount");
        clauses.extend(collect_edges(RenderExpr::variable(column), &edges, &total));

        let windowed = self
            .items
            .iter()
            .any(|item| matches!(item, ConnectionItem::Edges { .. } | ConnectionItem::PageInfo { .. }));
        let (skip, limit) = if windowed {
            self.pagination.params(env)
        } else {
            (None, None)
        };
        let window = Window {
            edges: &edges,
            total: &total,
            skip: skip.as_ref(),
            limit: limit.as_ref(),
        };

        let mut calls = Vec::new();
        let mut entries = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let value = match item {
                ConnectionItem::Edges {
                    node,
                    properties,
                    typename,
                    ..
                } => {
                    let var = env.next_binding("var");
                    let edge = env.next_binding("edge");
                    let edge_var = RenderExpr::variable(edge.clone());
                    let node_base = edge_var.clone().dot("node");
                    let edge_base = edge_var.clone().dot("properties");
                    let order_by: Vec<OrderByItem> = self
                        .sort
                        .iter()
                        .zip(&sort_columns)
                        .map(|(sort, sort_column)| OrderByItem {
                            expression: edge_var.clone().dot(sort_column.clone()),
                            descending: sort.descending,
                        })
                        .collect();

                    let mut body = vec![Clause::Unwind {
                        expression: RenderExpr::variable(edges.clone()),
                        alias: edge.clone(),
                    }];
                    if !order_by.is_empty() || window.skip.is_some() || window.limit.is_some() {
                        body.push(Clause::With(WithClause {
                            order_by,
                            skip: window.skip.cloned(),
                            limit: window.limit.cloned(),
                            ..WithClause::new(vec![ProjectionItem::variable(&edge)])
                        }));
                    }
                    let mut projected = Vec::new();
                    if let Some((key, _)) = node {
                        projected.push((key.clone(), node_base.clone()));
                    }
                    if let Some((key, _)) = properties {
                        projected.push((key.clone(), edge_base.clone()));
                    }
                    if let Some((key, type_name)) = typename {
                        projected.push((key.clone(), RenderExpr::string(type_name.clone())));
                    }
                    body.push(Clause::return_as(
                        RenderExpr::function("collect", vec![RenderExpr::Map(projected)]),
                        &var,
                    ));
                    calls.push(Clause::call(vec![edges.clone()], body));
                    RenderExpr::variable(var)
                }
                ConnectionItem::Aggregate { .. } => {
                    return Err(CompilationError::aggregation_with_context(
                        format!("{}.{}", self.composite.name, item_key(item)),
                        "aggregations over interface or union connections are not supported",
                    ))
                }
                other => window.scalar_item(other)?,
            };
            entries.push((item_key(item).to_string(), value));
        }
        clauses.extend(calls);
        clauses.push(Clause::return_as(
            RenderExpr::Map(entries),
            ctx.return_binding.clone(),
        ));
        Ok(clauses)
    }
}

/// Column names shared by every branch for the merged sort keys
fn sort_columns(sort: &[Sort<'_>], ctx: &QueryContext<'_>) -> Vec<String> {
    sort.iter().map(|_| ctx.env().next_binding("sort")).collect()
}

/// Transpile each branch in its own scope: the first reuses `ctx`'s
/// bindings, later ones get fresh ones
fn branch_bodies<'c, T, F>(
    branches: &[T],
    ctx: &QueryContext<'c>,
    mut transpile: F,
) -> Result<Vec<Vec<Clause>>, CompilationError>
where
    F: FnMut(&T, &QueryContext<'c>) -> Result<Vec<Clause>, CompilationError>,
{
    let mut bodies = Vec::with_capacity(branches.len());
    for (index, branch) in branches.iter().enumerate() {
        let branch_ctx = if index == 0 {
            ctx.clone()
        } else {
            ctx.fresh_sibling()
        };
        bodies.push(transpile(branch, &branch_ctx)?);
    }
    Ok(bodies)
}

/// `CALL { b1 UNION b2 ... }`; with no branch left, an empty row set bound
/// to `column`
fn union_call(
    entity: &str,
    bodies: Vec<Vec<Clause>>,
    column: &str,
) -> Result<Clause, CompilationError> {
    if bodies.is_empty() {
        return Ok(Clause::Unwind {
            expression: RenderExpr::List(Vec::new()),
            alias: column.to_string(),
        });
    }
    ensure_union_compatible(entity, &bodies)?;
    Ok(Clause::call(Vec::new(), vec![Clause::Union(bodies)]))
}

/// Every UNION branch must end in a RETURN exposing the same columns
pub(crate) fn ensure_union_compatible(
    entity: &str,
    bodies: &[Vec<Clause>],
) -> Result<(), CompilationError> {
    let columns = |body: &[Clause]| -> Vec<String> {
        body.last()
            .and_then(Clause::returned_columns)
            .unwrap_or_default()
            .into_iter()
            .map(|column| column.unwrap_or("<expression>").to_string())
            .collect()
    };
    let Some(first) = bodies.first() else {
        return Ok(());
    };
    let expected = columns(first);
    for body in &bodies[1..] {
        let found = columns(body);
        if found != expected {
            return Err(CompilationError::PolymorphicProjectionMismatch {
                entity: entity.to_string(),
                expected,
                found,
            });
        }
    }
    Ok(())
}
