//! Create, update and delete, with nested relationship mutations.
//!
//! Every nested mutation is an isolated `CALL { WITH parent ... }` ending in
//! `RETURN count(*)`, which always yields exactly one row, so a nested
//! operation that matches nothing never removes the parent's row.

use serde_json::Value;

use crate::graph_catalog::graph_schema::{Attribute, ConcreteEntity, Relationship};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::plan_ctx::{Environment, QueryContext};
use crate::render_plan::clauses::{Clause, NodePattern, Pattern};
use crate::render_plan::render_expr::{ProjectionItem, RenderExpr};

use super::fields::{project_fields, Field};
use super::filters::{filtered_match, validation_clauses, Filter, Validation};
use super::{append_after_update, creation_pattern, traversal_pattern, AstNodeRef};

/// `attribute = value` written by a mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<'s> {
    pub attribute: &'s Attribute,
    pub value: Value,
}

/// `SET v.a = $p, v.b = $q`; `None` when nothing is written
fn set_clause(variable: &str, assignments: &[Assignment<'_>], env: &Environment<'_>) -> Option<Clause> {
    if assignments.is_empty() {
        return None;
    }
    Some(Clause::Set(
        assignments
            .iter()
            .map(|assignment| {
                let attribute = assignment.attribute;
                let kind = (!attribute.is_list).then_some(&attribute.kind);
                (
                    RenderExpr::property(variable, attribute.database_name()),
                    env.add_typed_param(assignment.value.clone(), kind),
                )
            })
            .collect(),
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateInput<'s> {
    pub assignments: Vec<Assignment<'s>>,
    pub nested: Vec<NestedMutation<'s>>,
    /// Checked once the node and its nested mutations are written
    pub validations: Vec<Validation<'s>>,
}

impl<'s> CreateInput<'s> {
    /// `CREATE` of the scope's node, its properties, nested mutations and
    /// post-write validations
    fn write(&self, entity: &ConcreteEntity, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let mut clauses = vec![Clause::Create(Pattern::node(NodePattern::new(
            ctx.subject.clone(),
            &entity.labels,
        )))];
        clauses.extend(set_clause(&ctx.subject, &self.assignments, ctx.env()));
        for nested in &self.nested {
            append_after_update(&mut clauses, vec![nested.transpile(ctx)?]);
        }
        append_after_update(&mut clauses, validation_clauses(&self.validations, ctx)?);
        Ok(clauses)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation<'s> {
    pub entity: &'s ConcreteEntity,
    pub inputs: Vec<CreateInput<'s>>,
    pub fields: Vec<Field<'s>>,
}

impl<'s> CreateOperation<'s> {
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let mut clauses = Vec::with_capacity(self.inputs.len() + 1);
        let mut scopes = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            let input_ctx = if index == 0 {
                ctx.clone()
            } else {
                ctx.fresh_sibling()
            };
            let mut body = input.write(self.entity, &input_ctx)?;
            body.push(Clause::returning(vec![ProjectionItem::variable(
                &input_ctx.subject,
            )]));
            clauses.push(Clause::call(Vec::new(), body));
            scopes.push(input_ctx);
        }
        let mut projections = Vec::with_capacity(scopes.len());
        for scope in &scopes {
            let (subqueries, projection) = project_fields(&self.fields, scope)?;
            clauses.extend(subqueries);
            projections.push(projection);
        }
        clauses.push(Clause::return_as(
            RenderExpr::List(projections),
            ctx.return_binding.clone(),
        ));
        Ok(clauses)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation<'s> {
    pub entity: &'s ConcreteEntity,
    pub filter: Option<Filter<'s>>,
    pub before: Vec<Validation<'s>>,
    pub assignments: Vec<Assignment<'s>>,
    pub nested: Vec<NestedMutation<'s>>,
    pub after: Vec<Validation<'s>>,
    pub fields: Vec<Field<'s>>,
}

impl<'s> UpdateOperation<'s> {
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let pattern = Pattern::node(NodePattern::new(ctx.subject.clone(), &self.entity.labels));
        let mut clauses = filtered_match(pattern, self.filter.as_ref(), ctx)?;
        clauses.extend(validation_clauses(&self.before, ctx)?);
        clauses.extend(set_clause(&ctx.subject, &self.assignments, ctx.env()));
        for nested in &self.nested {
            append_after_update(&mut clauses, vec![nested.transpile(ctx)?]);
        }
        append_after_update(&mut clauses, validation_clauses(&self.after, ctx)?);
        let (subqueries, projection) = project_fields(&self.fields, ctx)?;
        append_after_update(&mut clauses, subqueries);
        clauses.push(Clause::return_as(
            RenderExpr::function("collect", vec![RenderExpr::Distinct(Box::new(projection))]),
            ctx.return_binding.clone(),
        ));
        Ok(clauses)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation<'s> {
    pub entity: &'s ConcreteEntity,
    pub filter: Option<Filter<'s>>,
    pub before: Vec<Validation<'s>>,
    pub nested: Vec<NestedMutation<'s>>,
}

impl<'s> DeleteOperation<'s> {
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Vec<Clause>, CompilationError> {
        let pattern = Pattern::node(NodePattern::new(ctx.subject.clone(), &self.entity.labels));
        let mut clauses = filtered_match(pattern, self.filter.as_ref(), ctx)?;
        clauses.extend(validation_clauses(&self.before, ctx)?);
        for nested in &self.nested {
            append_after_update(&mut clauses, vec![nested.transpile(ctx)?]);
        }
        append_after_update(
            &mut clauses,
            vec![Clause::Delete {
                detach: true,
                variables: vec![ctx.subject.clone()],
            }],
        );
        Ok(clauses)
    }
}

/// Mutation of a relationship's targets, run for each parent node
#[derive(Debug, Clone, PartialEq)]
pub enum NestedMutation<'s> {
    Create {
        relationship: &'s Relationship,
        target: &'s ConcreteEntity,
        input: CreateInput<'s>,
        edge: Vec<Assignment<'s>>,
    },
    Connect {
        relationship: &'s Relationship,
        target: &'s ConcreteEntity,
        filter: Option<Filter<'s>>,
        edge: Vec<Assignment<'s>>,
        validations: Vec<Validation<'s>>,
    },
    Disconnect {
        relationship: &'s Relationship,
        target: &'s ConcreteEntity,
        filter: Option<Filter<'s>>,
        validations: Vec<Validation<'s>>,
    },
    Update {
        relationship: &'s Relationship,
        target: &'s ConcreteEntity,
        filter: Option<Filter<'s>>,
        before: Vec<Validation<'s>>,
        node: Vec<Assignment<'s>>,
        edge: Vec<Assignment<'s>>,
        after: Vec<Validation<'s>>,
    },
    Delete {
        relationship: &'s Relationship,
        target: &'s ConcreteEntity,
        filter: Option<Filter<'s>>,
        before: Vec<Validation<'s>>,
        nested: Vec<NestedMutation<'s>>,
    },
}

impl<'s> NestedMutation<'s> {
    pub fn relationship(&self) -> &'s Relationship {
        match self {
            NestedMutation::Create { relationship, .. }
            | NestedMutation::Connect { relationship, .. }
            | NestedMutation::Disconnect { relationship, .. }
            | NestedMutation::Update { relationship, .. }
            | NestedMutation::Delete { relationship, .. } => relationship,
        }
    }

    pub fn children<'a>(&'a self) -> Vec<AstNodeRef<'a, 's>> {
        let filter = |filter: &'a Option<Filter<'s>>| filter.iter().map(AstNodeRef::Filter);
        let checks = |items: &'a [Validation<'s>]| items.iter().map(AstNodeRef::Validation);
        match self {
            NestedMutation::Create { input, .. } => checks(&input.validations)
                .chain(input.nested.iter().map(AstNodeRef::Mutation))
                .collect(),
            NestedMutation::Connect {
                filter: f,
                validations,
                ..
            }
            | NestedMutation::Disconnect {
                filter: f,
                validations,
                ..
            } => filter(f).chain(checks(validations)).collect(),
            NestedMutation::Update {
                filter: f,
                before,
                after,
                ..
            } => filter(f).chain(checks(before)).chain(checks(after)).collect(),
            NestedMutation::Delete {
                filter: f,
                before,
                nested,
                ..
            } => filter(f)
                .chain(checks(before))
                .chain(nested.iter().map(AstNodeRef::Mutation))
                .collect(),
        }
    }

    /// `CALL { WITH parent ... RETURN count(*) AS var }` in the parent's scope
    pub fn transpile(&self, ctx: &QueryContext<'_>) -> Result<Clause, CompilationError> {
        let env = ctx.env();
        let relationship_var = env.next_binding("this");
        let node_var = env.next_binding("this");
        let var = env.next_binding("var");
        let parent = ctx.subject.clone();
        let child = ctx.enter(node_var.clone(), Some(relationship_var.clone()), var.clone());
        let relationship = self.relationship();

        let mut body = match self {
            NestedMutation::Create {
                target, input, edge, ..
            } => {
                let mut clauses = vec![Clause::Create(Pattern::node(NodePattern::new(
                    node_var.clone(),
                    &target.labels,
                )))];
                clauses.extend(set_clause(&node_var, &input.assignments, env));
                clauses.push(Clause::Create(creation_pattern(
                    &parent,
                    relationship,
                    &relationship_var,
                    &node_var,
                )));
                clauses.extend(set_clause(&relationship_var, edge, env));
                for nested in &input.nested {
                    append_after_update(&mut clauses, vec![nested.transpile(&child)?]);
                }
                append_after_update(&mut clauses, validation_clauses(&input.validations, &child)?);
                clauses
            }
            NestedMutation::Connect {
                target,
                filter,
                edge,
                validations,
                ..
            } => {
                let pattern = Pattern::node(NodePattern::new(node_var.clone(), &target.labels));
                let mut clauses = filtered_match(pattern, filter.as_ref(), &child)?;
                clauses.push(Clause::Merge(creation_pattern(
                    &parent,
                    relationship,
                    &relationship_var,
                    &node_var,
                )));
                clauses.extend(set_clause(&relationship_var, edge, env));
                append_after_update(&mut clauses, validation_clauses(validations, &child)?);
                clauses
            }
            NestedMutation::Disconnect {
                target,
                filter,
                validations,
                ..
            } => {
                let mut clauses = self.match_targets(&parent, target, filter.as_ref(), &child)?;
                clauses.extend(validation_clauses(validations, &child)?);
                clauses.push(Clause::Delete {
                    detach: false,
                    variables: vec![relationship_var.clone()],
                });
                clauses
            }
            NestedMutation::Update {
                target,
                filter,
                before,
                node,
                edge,
                after,
                ..
            } => {
                let mut clauses = self.match_targets(&parent, target, filter.as_ref(), &child)?;
                clauses.extend(validation_clauses(before, &child)?);
                clauses.extend(set_clause(&node_var, node, env));
                clauses.extend(set_clause(&relationship_var, edge, env));
                append_after_update(&mut clauses, validation_clauses(after, &child)?);
                clauses
            }
            NestedMutation::Delete {
                target,
                filter,
                before,
                nested,
                ..
            } => {
                let mut clauses = self.match_targets(&parent, target, filter.as_ref(), &child)?;
                clauses.extend(validation_clauses(before, &child)?);
                for inner in nested {
                    append_after_update(&mut clauses, vec![inner.transpile(&child)?]);
                }
                append_after_update(
                    &mut clauses,
                    vec![Clause::Delete {
                        detach: true,
                        variables: vec![node_var.clone()],
                    }],
                );
                clauses
            }
        };
        body.push(Clause::return_as(
            RenderExpr::function("count", vec![RenderExpr::Star]),
            var,
        ));
        Ok(Clause::call(vec![parent], body))
    }

    /// Existing targets reached from `parent`, restricted by `filter`
    fn match_targets(
        &self,
        parent: &str,
        target: &ConcreteEntity,
        filter: Option<&Filter<'_>>,
        child: &QueryContext<'_>,
    ) -> Result<Vec<Clause>, CompilationError> {
        let pattern = traversal_pattern(
            parent,
            self.relationship(),
            Some(child.relationship_binding()?),
            NodePattern::new(child.subject.clone(), &target.labels),
        );
        filtered_match(pattern, filter, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::testing::movie_schema;
    use crate::query_planner::ast::filters::{FilterOperator, FilterValue, PropertyFilter, PropertyTarget};
    use crate::query_planner::request::Principal;
    use crate::render_plan::to_cypher::render_clauses;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn equals<'s>(attribute: &'s Attribute, value: Value) -> Filter<'s> {
        Filter::Property(PropertyFilter {
            target: PropertyTarget::NodeAttribute(attribute),
            operator: FilterOperator::Eq,
            value: FilterValue::Literal(value),
            case_insensitive: false,
        })
    }

    #[test]
    fn test_create_with_nested_connect() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let ctx = QueryContext::root(&env, env.next_binding("this"), "this");
        let movie = schema.concrete_entity("Movie").unwrap();
        let actor = schema.concrete_entity("Actor").unwrap();
        let title = movie.attribute("title").unwrap();
        let op = CreateOperation {
            entity: movie,
            inputs: vec![CreateInput {
                assignments: vec![Assignment {
                    attribute: title,
                    value: json!("Matrix"),
                }],
                nested: vec![NestedMutation::Connect {
                    relationship: movie.relationship("actors").unwrap(),
                    target: actor,
                    filter: Some(equals(actor.attribute("name").unwrap(), json!("Keanu"))),
                    edge: Vec::new(),
                    validations: Vec::new(),
                }],
                validations: Vec::new(),
            }],
            fields: vec![Field::Attribute {
                key: "title".to_string(),
                attribute: title,
            }],
        };
        let expected = "CALL {
    CREATE (this0:Movie)
    SET this0.title = $param1
    WITH *
    CALL {
        WITH this0
        MATCH (this3:Actor)
        WHERE this3.name = $param5
        MERGE (this0)<-[this2:ACTED_IN]-(this3)
        RETURN count(*) AS var4
    }
    RETURN this0
}
RETURN [this0 { .title }] AS this";
        assert_eq!(render_clauses(&op.transpile(&ctx).unwrap()), expected);
    }

    #[test]
    fn test_update_collects_distinct_projection() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let ctx = QueryContext::root(&env, env.next_binding("this"), "this");
        let movie = schema.concrete_entity("Movie").unwrap();
        let title = movie.attribute("title").unwrap();
        let op = UpdateOperation {
            entity: movie,
            filter: Some(equals(title, json!("Old"))),
            before: Vec::new(),
            assignments: vec![Assignment {
                attribute: title,
                value: json!("New"),
            }],
            nested: Vec::new(),
            after: Vec::new(),
            fields: vec![Field::Attribute {
                key: "title".to_string(),
                attribute: title,
            }],
        };
        let expected = "MATCH (this0:Movie)
WHERE this0.title = $param1
SET this0.title = $param2
RETURN collect(DISTINCT this0 { .title }) AS this";
        assert_eq!(render_clauses(&op.transpile(&ctx).unwrap()), expected);
    }

    #[test]
    fn test_delete_with_nested_disconnect() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let ctx = QueryContext::root(&env, env.next_binding("this"), "this");
        let movie = schema.concrete_entity("Movie").unwrap();
        let person = schema.concrete_entity("Person").unwrap();
        let op = DeleteOperation {
            entity: movie,
            filter: Some(equals(movie.attribute("title").unwrap(), json!("X"))),
            before: Vec::new(),
            nested: vec![NestedMutation::Disconnect {
                relationship: movie.relationship("director").unwrap(),
                target: person,
                filter: None,
                validations: Vec::new(),
            }],
        };
        let expected = "MATCH (this0:Movie)
WHERE this0.title = $param1
CALL {
    WITH this0
    MATCH (this0)<-[this2:DIRECTED]-(this3:Person:Crew)
    DELETE this2
    RETURN count(*) AS var4
}
DETACH DELETE this0";
        assert_eq!(render_clauses(&op.transpile(&ctx).unwrap()), expected);
    }

    #[test]
    fn test_datetime_assignment_is_converted() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let env = Environment::new(&schema, &config, &principal);
        let movie = schema.concrete_entity("Movie").unwrap();
        let set = set_clause(
            "this0",
            &[Assignment {
                attribute: movie.attribute("premiere").unwrap(),
                value: json!("1999-03-31T00:00:00Z"),
            }],
            &env,
        )
        .unwrap();
        assert_eq!(
            crate::render_plan::ToCypher::to_cypher(&set),
            "SET this0.premiere = datetime($param0)"
        );
        assert!(set_clause("this0", &[], &env).is_none());
    }
}
