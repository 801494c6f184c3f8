//! Authorization injection.
//!
//! Turns the declared rules that apply to an operation into AST sub-trees:
//! filter rules become one more conjunct of the node filter, validate rules
//! become [`Validation`]s placed before or after the guarded clauses. Node
//! and field rules are compiled independently, so each gets its own
//! parameters.

use crate::graph_catalog::authorization::{
    AuthorizationKind, AuthorizationOperation, AuthorizationRule, AuthorizationWhen,
};
use crate::graph_catalog::graph_schema::{Attribute, ConcreteEntity};
use crate::query_planner::ast::{Field, Filter, Validation};
use crate::query_planner::errors::CompilationError;

use super::filter_factory::FilterSubject;
use super::{as_object, child_path, AstFactory};

/// Filter and validations guarding one read scope
#[derive(Debug, Default)]
pub(crate) struct ReadAuthorization<'s> {
    pub filter: Option<Filter<'s>>,
    pub validations: Vec<Validation<'s>>,
}

/// Attributes a selection reads, for field-level rules
pub(crate) fn selected_attributes<'s>(fields: &[Field<'s>]) -> Vec<&'s Attribute> {
    fields
        .iter()
        .filter_map(|field| match field {
            Field::Attribute { attribute, .. } | Field::Computed { attribute, .. } => {
                Some(*attribute)
            }
            _ => None,
        })
        .collect()
}

impl<'s> AstFactory<'s> {
    /// Predicate of one rule: authentication, `node` template and `jwt`
    /// template AND-ed; `None` when the rule constrains nothing
    fn rule_predicate(
        &self,
        entity: &'s ConcreteEntity,
        rule: &AuthorizationRule,
        path: &str,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let mut parts = Vec::with_capacity(3);
        if rule.require_authentication {
            parts.push(Filter::Authenticated);
        }
        if let Some(node) = &rule.predicate.node {
            let node_path = child_path(path, "node");
            let object = as_object(node, &node_path)?;
            parts.extend(self.claims_filter(FilterSubject::Node(entity), object, &node_path)?);
        }
        if let Some(jwt) = &rule.predicate.jwt {
            let jwt_path = child_path(path, "jwt");
            let object = as_object(jwt, &jwt_path)?;
            parts.extend(self.claims_filter(FilterSubject::Claims, object, &jwt_path)?);
        }
        Ok(Filter::and(parts))
    }

    /// Rules of the entity followed by the rules of each touched attribute
    fn applicable_rules<'r>(
        entity: &'r ConcreteEntity,
        attributes: &[&'r Attribute],
    ) -> Vec<(String, &'r AuthorizationRule)> {
        let entity_rules = entity
            .authorization
            .iter()
            .enumerate()
            .map(move |(index, rule)| (format!("{}.authorization[{}]", entity.name, index), rule));
        let field_rules = attributes.iter().flat_map(move |&attribute| {
            attribute.authorization.iter().enumerate().map(move |(index, rule)| {
                (
                    format!("{}.{}.authorization[{}]", entity.name, attribute.name, index),
                    rule,
                )
            })
        });
        entity_rules.chain(field_rules).collect()
    }

    /// Filter rules for `operation`, AND-ed
    pub(crate) fn authorization_filter(
        &self,
        entity: &'s ConcreteEntity,
        attributes: &[&'s Attribute],
        operation: AuthorizationOperation,
    ) -> Result<Option<Filter<'s>>, CompilationError> {
        let mut parts = Vec::new();
        for (path, rule) in Self::applicable_rules(entity, attributes) {
            if rule.kind == AuthorizationKind::Filter && rule.applies_to(operation) {
                parts.extend(self.rule_predicate(entity, rule, &path)?);
            }
        }
        if !parts.is_empty() {
            log::trace!(
                "Injecting {} filter rule(s) on {} for {:?}",
                parts.len(),
                entity.name,
                operation
            );
        }
        Ok(Filter::and(parts))
    }

    /// Validate rules for `operation` evaluated at `when`, one per rule
    pub(crate) fn authorization_validations(
        &self,
        entity: &'s ConcreteEntity,
        attributes: &[&'s Attribute],
        operation: AuthorizationOperation,
        when: AuthorizationWhen,
    ) -> Result<Vec<Validation<'s>>, CompilationError> {
        let mut validations = Vec::new();
        for (path, rule) in Self::applicable_rules(entity, attributes) {
            if rule.applies_at(operation, when) {
                if let Some(predicate) = self.rule_predicate(entity, rule, &path)? {
                    validations.push(Validation { predicate });
                }
            }
        }
        if !validations.is_empty() {
            log::trace!(
                "Injecting {} {:?} validation(s) on {} for {:?}",
                validations.len(),
                when,
                entity.name,
                operation
            );
        }
        Ok(validations)
    }

    /// Filter and validations of a read scope reading `attributes`
    pub(crate) fn read_authorization(
        &self,
        entity: &'s ConcreteEntity,
        attributes: &[&'s Attribute],
        operation: AuthorizationOperation,
    ) -> Result<ReadAuthorization<'s>, CompilationError> {
        Ok(ReadAuthorization {
            filter: self.authorization_filter(entity, attributes, operation)?,
            validations: self.authorization_validations(
                entity,
                attributes,
                operation,
                AuthorizationWhen::Before,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph_catalog::testing::movie_schema;
    use crate::query_planner::ast::{FilterValue, PropertyFilter, PropertyTarget};
    use crate::query_planner::request::Principal;
    use serde_json::json;

    #[test]
    fn test_filter_rule_binds_claim() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal =
            Principal::authenticated(json!({ "sub": "u1" }).as_object().cloned().unwrap());
        let factory = AstFactory::new(&schema, &config, &principal);
        let post = schema.concrete_entity("Post").unwrap();
        let auth = factory
            .read_authorization(post, &[], AuthorizationOperation::Read)
            .unwrap();
        let Some(Filter::And(parts)) = auth.filter else {
            panic!("expected authentication AND claim comparison");
        };
        assert_eq!(parts[0], Filter::Authenticated);
        assert!(matches!(
            &parts[1],
            Filter::Property(PropertyFilter {
                target: PropertyTarget::NodeAttribute(attribute),
                value: FilterValue::Claim { path, value: Some(_) },
                ..
            }) if attribute.name == "authorId" && path == "sub"
        ));
        assert!(auth.validations.is_empty());
    }

    #[test]
    fn test_validation_timing() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        let post = schema.concrete_entity("Post").unwrap();
        let count = |operation, when| {
            factory
                .authorization_validations(post, &[], operation, when)
                .unwrap()
                .len()
        };
        assert_eq!(count(AuthorizationOperation::Update, AuthorizationWhen::Before), 1);
        assert_eq!(count(AuthorizationOperation::Update, AuthorizationWhen::After), 1);
        assert_eq!(count(AuthorizationOperation::Delete, AuthorizationWhen::After), 0);
        assert_eq!(count(AuthorizationOperation::Create, AuthorizationWhen::After), 1);
    }

    #[test]
    fn test_field_rules_follow_selection() {
        let schema = movie_schema();
        let config = CompilerConfig::default();
        let principal = Principal::anonymous();
        let factory = AstFactory::new(&schema, &config, &principal);
        let post = schema.concrete_entity("Post").unwrap();
        let secret = post.attribute("secret").unwrap();
        let content = post.attribute("content").unwrap();
        let with_secret = factory
            .read_authorization(post, &[content, secret], AuthorizationOperation::Read)
            .unwrap();
        assert_eq!(with_secret.validations.len(), 1);
        let without = factory
            .read_authorization(post, &[content], AuthorizationOperation::Read)
            .unwrap();
        assert!(without.validations.is_empty());
    }
}
