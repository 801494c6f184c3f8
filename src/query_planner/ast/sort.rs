use serde_json::Value;

use crate::graph_catalog::graph_schema::{Attribute, ConcreteEntity};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::{Environment, QueryContext};
use crate::render_plan::clauses::{Clause, WithClause};
use crate::render_plan::render_expr::{OrderByItem, RenderExpr};

use super::fields::computed_call;

#[derive(Debug, Clone, PartialEq)]
pub enum SortTarget<'s> {
    NodeAttribute(&'s Attribute),
    EdgeAttribute(&'s Attribute),
    Computed(&'s Attribute),
}

impl<'s> SortTarget<'s> {
    pub fn attribute(&self) -> &'s Attribute {
        match *self {
            SortTarget::NodeAttribute(attribute)
            | SortTarget::EdgeAttribute(attribute)
            | SortTarget::Computed(attribute) => attribute,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort<'s> {
    pub target: SortTarget<'s>,
    pub descending: bool,
}

impl<'s> Sort<'s> {
    /// The same sort against `member`'s own declaration of the attribute.
    /// Interface sorts resolve against the shared attributes, which may map
    /// to a different database name on each implementation.
    pub fn for_member(&self, member: &'s ConcreteEntity) -> Result<Sort<'s>, CompilationError> {
        let target = match &self.target {
            SortTarget::EdgeAttribute(attribute) => SortTarget::EdgeAttribute(*attribute),
            other => {
                let name = &other.attribute().name;
                let attribute = member.attribute(name).ok_or_else(|| {
                    CompilationError::argument_with_context(
                        "sort",
                        format!("`{}` cannot sort by `{}`", member.name, name),
                    )
                })?;
                if attribute.is_computed() {
                    SortTarget::Computed(attribute)
                } else {
                    SortTarget::NodeAttribute(attribute)
                }
            }
        };
        Ok(Sort {
            target,
            descending: self.descending,
        })
    }
}

/// `skip`/`limit` after the effective limit has been resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl Pagination {
    pub fn is_empty(&self) -> bool {
        self.skip.is_none() && self.limit.is_none()
    }

    /// Parameters for `SKIP` and `LIMIT`, skip first
    pub fn params(&self, env: &Environment<'_>) -> (Option<RenderExpr>, Option<RenderExpr>) {
        let skip = self.skip.map(|skip| env.add_param(Value::from(skip)));
        let limit = self.limit.map(|limit| env.add_param(Value::from(limit)));
        (skip, limit)
    }
}

/// `WITH * ORDER BY ... SKIP ... LIMIT ...` over the current scope, preceded
/// by the subqueries computed sort keys need
pub(crate) fn sort_clauses(
    sort: &[Sort<'_>],
    pagination: &Pagination,
    ctx: &QueryContext<'_>,
) -> Result<Vec<Clause>, CompilationError> {
    if sort.is_empty() && pagination.is_empty() {
        return Ok(Vec::new());
    }
    let (skip, limit) = pagination.params(ctx.env());
    ordered_window(sort, skip, limit, ctx)
}

/// Same as [`sort_clauses`] with `SKIP`/`LIMIT` expressions minted by the caller
pub(crate) fn ordered_window(
    sort: &[Sort<'_>],
    skip: Option<RenderExpr>,
    limit: Option<RenderExpr>,
    ctx: &QueryContext<'_>,
) -> Result<Vec<Clause>, CompilationError> {
    if sort.is_empty() && skip.is_none() && limit.is_none() {
        return Ok(Vec::new());
    }
    let mut clauses = Vec::new();
    let mut order_by = Vec::with_capacity(sort.len());
    for item in sort {
        let expression = sort_key(item, ctx, &mut clauses)?;
        order_by.push(OrderByItem {
            expression,
            descending: item.descending,
        });
    }
    clauses.push(Clause::With(WithClause {
        order_by,
        skip,
        limit,
        ..WithClause::star()
    }));
    Ok(clauses)
}

/// Value `item` orders by in the current scope; computed keys push the
/// subquery that produces them onto `clauses`
pub(crate) fn sort_key(
    item: &Sort<'_>,
    ctx: &QueryContext<'_>,
    clauses: &mut Vec<Clause>,
) -> Result<RenderExpr, CompilationError> {
    Ok(match &item.target {
        SortTarget::NodeAttribute(attribute) => {
            RenderExpr::property(&ctx.subject, attribute.database_name())
        }
        SortTarget::EdgeAttribute(attribute) => {
            RenderExpr::property(ctx.relationship_binding()?, attribute.database_name())
        }
        SortTarget::Computed(attribute) => {
            let var = ctx.env().next_binding("var");
            clauses.push(computed_call(ctx, attribute, &var)?);
            RenderExpr::variable(var)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::graph_schema::Entity;
    use crate::graph_catalog::testing::movie_schema;
    use crate::query_planner::request::Principal;
    use crate::render_plan::to_cypher::render_clauses;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sort_uses_database_name() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let ctx = QueryContext::root(&env, env.next_binding("this"), "this");
        let movie = schema.concrete_entity("Movie").unwrap();
        let sort = vec![Sort {
            target: SortTarget::NodeAttribute(movie.attribute("tagline").unwrap()),
            descending: true,
        }];
        let pagination = Pagination {
            skip: None,
            limit: Some(5),
        };
        let clauses = sort_clauses(&sort, &pagination, &ctx).unwrap();
        assert_eq!(
            render_clauses(&clauses),
            "WITH *\nORDER BY this0.tag_line DESC\nLIMIT $param1"
        );
        assert_eq!(env.into_params()["param1"], Value::from(5u64));
    }

    #[test]
    fn test_nothing_to_sort_or_page() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let ctx = QueryContext::root(&env, env.next_binding("this"), "this");
        assert!(sort_clauses(&[], &Pagination::default(), &ctx)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_member_sort_uses_member_declaration() {
        let schema = movie_schema();
        let Entity::Composite(production) = schema.resolve_entity("Production").unwrap() else {
            panic!("Production is an interface");
        };
        let sort = Sort {
            target: SortTarget::NodeAttribute(production.shared_attributes.get("title").unwrap()),
            descending: true,
        };
        let movie = schema.concrete_entity("Movie").unwrap();
        let member = sort.for_member(movie).unwrap();
        assert!(member.descending);
        assert!(std::ptr::eq(member.target.attribute(), movie.attribute("title").unwrap()));

        let person = schema.concrete_entity("Person").unwrap();
        assert!(matches!(
            sort.for_member(person),
            Err(CompilationError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_edge_sort_key_needs_relationship() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let acted_in = schema
            .relationship_properties(
                schema
                    .concrete_entity("Movie")
                    .unwrap()
                    .relationship("actors")
                    .unwrap(),
            )
            .unwrap();
        let sort = Sort {
            target: SortTarget::EdgeAttribute(acted_in.attribute("screenTime").unwrap()),
            descending: false,
        };
        let mut clauses = Vec::new();
        let root = QueryContext::root(&env, env.next_binding("this"), "this");
        assert_eq!(
            sort_key(&sort, &root, &mut clauses).unwrap_err(),
            CompilationError::missing_binding("relationship")
        );
        let nested = root.enter("this2".to_string(), Some("this1".to_string()), "var3".to_string());
        assert_eq!(
            sort_key(&sort, &nested, &mut clauses).unwrap(),
            RenderExpr::property("this1", "screenTime")
        );
        assert!(clauses.is_empty());
    }
}
