//! Relay-style connection reads.
//!
//! ```text
//! MATCH ...                                        matched scope
//! WITH collect({ node: n, relationship: r }) AS edges
//! WITH edges, size(edges) AS totalCount
//! CALL { WITH edges UNWIND edges AS edge ... }     one window per `edges` selection
//! CALL { WITH edges UNWIND edges AS edge ... }     one per aggregate measure
//! RETURN { totalCount: ..., edges: ..., pageInfo: { ... } } AS result
//! ```
//!
//! `totalCount` counts the whole filtered set; only the `edges` windows are
//! sorted and paged.

use crate::graph_catalog::graph_schema::{ConcreteEntity, Relationship};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::QueryContext;
use crate::render_plan::clauses::{Clause, WithClause};
use crate::render_plan::render_expr::{BinaryOperator, ProjectionItem, RenderExpr};

use super::aggregation::{edge_list_call, project_items, AggregationItem};
use super::fields::{project_edge_fields, project_fields, Field};
use super::filters::{Filter, Validation};
use super::read::scope_match;
use super::sort::{ordered_window, Pagination, Sort};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageInfoField {
    HasNextPage(String),
    HasPreviousPage(String),
    Typename(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionItem<'s> {
    TotalCount {
        key: String,
    },
    Edges {
        key: String,
        /// Response key and fields of `node`
        node: Option<(String, Vec<Field<'s>>)>,
        /// Response key and fields of `properties`
        properties: Option<(String, Vec<Field<'s>>)>,
        /// Response key and type name of an edge-level `__typename`
        typename: Option<(String, String)>,
    },
    PageInfo {
        key: String,
        fields: Vec<PageInfoField>,
    },
    Aggregate {
        key: String,
        items: Vec<AggregationItem<'s>>,
    },
    Typename {
        key: String,
        type_name: String,
    },
}

impl<'s> ConnectionItem<'s> {
    fn needs_window(&self) -> bool {
        matches!(
            self,
            ConnectionItem::Edges { .. } | ConnectionItem::PageInfo { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionReadOperation<'s> {
    pub entity: &'s ConcreteEntity,
    pub relationship: Option<&'s Relationship>,
    pub filter: Option<Filter<'s>>,
    pub validations: Vec<Validation<'s>>,
    pub sort: Vec<Sort<'s>>,
    pub pagination: Pagination,
    pub items: Vec<ConnectionItem<'s>>,
}

impl<'s> ConnectionReadOperation<'s> {
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let env = ctx.env();
        let mut clauses = scope_match(
            self.entity,
            self.relationship,
            self.filter.as_ref(),
            &self.validations,
            ctx,
        )?;

        let mut edge = vec![(
            "node".to_string(),
            RenderExpr::variable(ctx.subject.clone()),
        )];
        if let Some(relationship) = &ctx.relationship {
            edge.push((
                "relationship".to_string(),
                RenderExpr::variable(relationship.clone()),
            ));
        }
        let edges = env.next_binding("edges");
        let total = env.next_binding("totalCount");
        clauses.extend(collect_edges(RenderExpr::Map(edge), &edges, &total));

        let (skip, limit) = if self.items.iter().any(ConnectionItem::needs_window) {
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
                    calls.push(self.edge_window(ctx, &window, node, properties, typename, &var)?);
                    RenderExpr::variable(var)
                }
                ConnectionItem::Aggregate { items, .. } => {
                    project_items(items, env, &mut calls, &mut |measure, var| {
                        edge_list_call(&edges, ctx, measure, var)
                    })?
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

    /// `CALL { WITH edges UNWIND edges AS edge WITH edge.node AS n ... RETURN collect({...}) }`
    fn edge_window(
        &self,
        ctx: &QueryContext<'_>,
        window: &Window<'_>,
        node: &Option<(String, Vec<Field<'_>>)>,
        properties: &Option<(String, Vec<Field<'_>>)>,
        typename: &Option<(String, String)>,
        var: &str,
    ) -> Result<Clause, CompilationError> {
        let edge = ctx.env().next_binding("edge");
        let mut unpacked = vec![ProjectionItem::aliased(
            RenderExpr::variable(edge.clone()).dot("node"),
            ctx.subject.clone(),
        )];
        if let Some(relationship) = &ctx.relationship {
            unpacked.push(ProjectionItem::aliased(
                RenderExpr::variable(edge.clone()).dot("relationship"),
                relationship.clone(),
            ));
        }
        let mut body = vec![
            Clause::Unwind {
                expression: RenderExpr::variable(window.edges),
                alias: edge,
            },
            Clause::With(WithClause::new(unpacked)),
        ];
        body.extend(ordered_window(
            &self.sort,
            window.skip.cloned(),
            window.limit.cloned(),
            ctx,
        )?);

        let mut entries = Vec::new();
        if let Some((key, fields)) = node {
            let (subqueries, projection) = project_fields(fields, ctx)?;
            body.extend(subqueries);
            entries.push((key.clone(), projection));
        }
        if let Some((key, fields)) = properties {
            let (subqueries, projection) = project_edge_fields(fields, ctx)?;
            body.extend(subqueries);
            entries.push((key.clone(), projection));
        }
        if let Some((key, type_name)) = typename {
            entries.push((key.clone(), RenderExpr::string(type_name.clone())));
        }
        body.push(Clause::return_as(
            RenderExpr::function("collect", vec![RenderExpr::Map(entries)]),
            var,
        ));
        Ok(Clause::call(vec![window.edges.to_string()], body))
    }
}

/// `WITH collect(edge) AS edges` then `WITH edges, size(edges) AS totalCount`
pub(crate) fn collect_edges(edge: RenderExpr, edges: &str, total: &str) -> Vec<Clause> {
    vec![
        Clause::With(WithClause::new(vec![ProjectionItem::aliased(
            RenderExpr::function("collect", vec![edge]),
            edges,
        )])),
        Clause::With(WithClause::new(vec![
            ProjectionItem::variable(edges),
            ProjectionItem::aliased(
                RenderExpr::function("size", vec![RenderExpr::variable(edges)]),
                total,
            ),
        ])),
    ]
}

pub(crate) fn item_key<'a>(item: &'a ConnectionItem<'_>) -> &'a str {
    match item {
        ConnectionItem::TotalCount { key }
        | ConnectionItem::Edges { key, .. }
        | ConnectionItem::PageInfo { key, .. }
        | ConnectionItem::Aggregate { key, .. }
        | ConnectionItem::Typename { key, .. } => key,
    }
}

/// Bindings shared by every item of one connection
pub(crate) struct Window<'a> {
    pub edges: &'a str,
    pub total: &'a str,
    pub skip: Option<&'a RenderExpr>,
    pub limit: Option<&'a RenderExpr>,
}

impl<'a> Window<'a> {
    /// Items computed from the edge list and page bounds alone
    pub(crate) fn scalar_item(&self, item: &ConnectionItem<'_>) -> Result<RenderExpr, CompilationError> {
        match item {
            ConnectionItem::TotalCount { .. } => Ok(RenderExpr::variable(self.total)),
            ConnectionItem::Typename { type_name, .. } => Ok(RenderExpr::string(type_name.clone())),
            ConnectionItem::PageInfo { fields, .. } => Ok(RenderExpr::Map(
                fields
                    .iter()
                    .map(|field| match field {
                        PageInfoField::HasNextPage(key) => (key.clone(), self.has_next_page()),
                        PageInfoField::HasPreviousPage(key) => {
                            (key.clone(), self.has_previous_page())
                        }
                        PageInfoField::Typename(key) => {
                            (key.clone(), RenderExpr::string("PageInfo"))
                        }
                    })
                    .collect(),
            )),
            ConnectionItem::Edges { .. } | ConnectionItem::Aggregate { .. } => Err(
                CompilationError::missing_binding(format!("{} window", item_key(item))),
            ),
        }
    }

    /// `skip + limit < totalCount`; false without a limit
    fn has_next_page(&self) -> RenderExpr {
        let Some(limit) = self.limit else {
            return RenderExpr::boolean(false);
        };
        let end = match self.skip {
            Some(skip) => RenderExpr::binary(skip.clone(), BinaryOperator::Addition, limit.clone()),
            None => limit.clone(),
        };
        RenderExpr::binary(end, BinaryOperator::LessThan, RenderExpr::variable(self.total))
    }

    /// `skip > 0`; false without a skip
    fn has_previous_page(&self) -> RenderExpr {
        match self.skip {
            Some(skip) => RenderExpr::binary(
                skip.clone(),
                BinaryOperator::GreaterThan,
                RenderExpr::integer(0),
            ),
            None => RenderExpr::boolean(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::testing::movie_schema;
    use crate::query_planner::ast::{Operation, ReadOperation};
    use crate::query_planner::plan_ctx::Environment;
    use crate::query_planner::request::Principal;
    use crate::render_plan::to_cypher::render_clauses;
    use crate::render_plan::ToCypher;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_root_connection_counts_before_paging() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let ctx = QueryContext::root(&env, env.next_binding("this"), "this");
        let movie = schema.concrete_entity("Movie").unwrap();
        let op = ConnectionReadOperation {
            entity: movie,
            relationship: None,
            filter: None,
            validations: Vec::new(),
            sort: Vec::new(),
            pagination: Pagination {
                skip: None,
                limit: Some(2),
            },
            items: vec![
                ConnectionItem::TotalCount {
                    key: "totalCount".to_string(),
                },
                ConnectionItem::Edges {
                    key: "edges".to_string(),
                    node: Some((
                        "node".to_string(),
                        vec![Field::Attribute {
                            key: "title".to_string(),
                            attribute: movie.attribute("title").unwrap(),
                        }],
                    )),
                    properties: None,
                    typename: None,
                },
            ],
        };
        let expected = "MATCH (this0:Movie)
WITH collect({ node: this0 }) AS edges1
WITH edges1, size(edges1) AS totalCount2
CALL {
    WITH edges1
    UNWIND edges1 AS edge5
    WITH edge5.node AS this0
    WITH *
    LIMIT $param3
    RETURN collect({ node: this0 { .title } }) AS var4
}
RETURN { totalCount: totalCount2, edges: var4 } AS this";
        assert_eq!(render_clauses(&op.transpile(&ctx).unwrap()), expected);
    }

    #[test]
    fn test_nested_connection_keeps_every_edge() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let ctx = QueryContext::root(&env, env.next_binding("this"), "this");
        let movie = schema.concrete_entity("Movie").unwrap();
        let actor = schema.concrete_entity("Actor").unwrap();
        let actors = movie.relationship("actors").unwrap();
        let connection = ConnectionReadOperation {
            entity: actor,
            relationship: Some(actors),
            filter: None,
            validations: Vec::new(),
            sort: Vec::new(),
            pagination: Pagination::default(),
            items: vec![
                ConnectionItem::TotalCount {
                    key: "totalCount".to_string(),
                },
                ConnectionItem::Edges {
                    key: "edges".to_string(),
                    node: Some((
                        "node".to_string(),
                        vec![Field::Attribute {
                            key: "name".to_string(),
                            attribute: actor.attribute("name").unwrap(),
                        }],
                    )),
                    properties: Some((
                        "properties".to_string(),
                        vec![Field::Attribute {
                            key: "role".to_string(),
                            attribute: schema
                                .relationship_properties(actors)
                                .unwrap()
                                .attributes
                                .get("role")
                                .unwrap(),
                        }],
                    )),
                    typename: None,
                },
            ],
        };
        let op = ReadOperation {
            entity: movie,
            relationship: None,
            filter: None,
            validations: Vec::new(),
            fields: vec![
                Field::Attribute {
                    key: "title".to_string(),
                    attribute: movie.attribute("title").unwrap(),
                },
                Field::Relationship {
                    key: "actorsConnection".to_string(),
                    operation: Box::new(Operation::ConnectionRead(connection)),
                },
            ],
            sort: Vec::new(),
            pagination: Pagination::default(),
        };
        // No `WITH DISTINCT`: an actor credited twice yields two edges
        let expected = "MATCH (this0:Movie)
CALL {
    WITH this0
    MATCH (this0)<-[this1:ACTED_IN]-(this2:Actor)
    WITH collect({ node: this2, relationship: this1 }) AS edges4
    WITH edges4, size(edges4) AS totalCount5
    CALL {
        WITH edges4
        UNWIND edges4 AS edge7
        WITH edge7.node AS this2, edge7.relationship AS this1
        RETURN collect({ node: this2 { .name }, properties: this1 { .role } }) AS var6
    }
    RETURN { totalCount: totalCount5, edges: var6 } AS var3
}
RETURN this0 { .title, actorsConnection: var3 } AS this";
        assert_eq!(render_clauses(&op.transpile(&ctx).unwrap()), expected);
    }

    #[test]
    fn test_count_only_connection_mints_no_page_params() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let ctx = QueryContext::root(&env, env.next_binding("this"), "this");
        let op = ConnectionReadOperation {
            entity: schema.concrete_entity("Movie").unwrap(),
            relationship: None,
            filter: None,
            validations: Vec::new(),
            sort: Vec::new(),
            pagination: Pagination {
                skip: Some(5),
                limit: Some(2),
            },
            items: vec![ConnectionItem::TotalCount {
                key: "totalCount".to_string(),
            }],
        };
        op.transpile(&ctx).unwrap();
        assert!(env.into_params().is_empty());
    }

    #[test]
    fn test_page_info_bounds() {
        let skip = RenderExpr::Parameter("param1".to_string());
        let limit = RenderExpr::Parameter("param2".to_string());
        let window = Window {
            edges: "edges0",
            total: "totalCount1",
            skip: Some(&skip),
            limit: Some(&limit),
        };
        assert_eq!(
            window.has_next_page().to_cypher(),
            "$param1 + $param2 < totalCount1"
        );
        assert_eq!(window.has_previous_page().to_cypher(), "$param1 > 0");
        let unbounded = Window {
            edges: "edges0",
            total: "totalCount1",
            skip: None,
            limit: None,
        };
        assert_eq!(unbounded.has_next_page().to_cypher(), "false");
        assert_eq!(unbounded.has_previous_page().to_cypher(), "false");
    }
}
