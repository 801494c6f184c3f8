//! Declared authorization rules woven into compiled programs.

use serde_json::json;

use super::{claims, cypher, cypher_as};
use crate::config::CompilerConfig;
use crate::query_planner::request::{FieldSelection, OperationKind, Principal, QueryRequest};

fn posts(fields: &[&str]) -> QueryRequest {
    QueryRequest::read("Post").select(FieldSelection::leaves(fields))
}

#[test]
fn test_filter_rule_narrows_reads() {
    let principal = Principal::authenticated(claims(json!({ "sub": "u1" })));
    let (cypher, params) = cypher_as(&posts(&["content"]), &principal, &CompilerConfig::default());
    assert!(cypher.contains("this0.authorId = $param"));
    assert!(cypher.contains("IS NOT NULL"));
    assert!(params.values().any(|value| value == &json!("u1")));
    assert!(params.values().any(|value| value == &json!(true)));
    assert!(!cypher.contains("apoc.util.validatePredicate"));
}

#[test]
fn test_anonymous_principal_binds_null_claims() {
    let (cypher, params) = cypher(&posts(&["content"]));
    assert!(cypher.contains("this0.authorId = $param"));
    assert!(params.values().any(|value| value.is_null()));
    assert!(params.values().any(|value| value == &json!(false)));
}

#[test]
fn test_field_rule_applies_only_when_selected() {
    let (without, _) = cypher(&posts(&["content"]));
    assert!(!without.contains("apoc.util.validatePredicate"));

    let (with_secret, _) = cypher(&posts(&["content", "secret"]));
    assert!(with_secret.contains("apoc.util.validatePredicate(NOT ("));
    assert!(with_secret.contains("\"Forbidden\""));
}

#[test]
fn test_custom_forbidden_message() {
    let config = CompilerConfig {
        forbidden_message: "Access denied".to_string(),
        ..CompilerConfig::default()
    };
    let (cypher, _) = cypher_as(&posts(&["secret"]), &Principal::anonymous(), &config);
    assert!(cypher.contains("\"Access denied\""));
}

#[test]
fn test_nested_reads_carry_target_rules() {
    let request = QueryRequest::read("User").select(vec![
        FieldSelection::new("name"),
        FieldSelection::new("posts").select(FieldSelection::leaves(&["content"])),
    ]);
    let (cypher, _) = cypher(&request);
    assert!(cypher.contains(":HAS_POST]->(this2:Post)"));
    assert!(cypher.contains("this2.authorId = $param"));
}

#[test]
fn test_update_validates_before_and_after() {
    let request = QueryRequest::new(OperationKind::Update, "Post")
        .arg("where", json!({ "id": "p1" }))
        .arg("update", json!({ "content": "edited" }))
        .select(FieldSelection::leaves(&["id"]));
    let principal = Principal::authenticated(claims(json!({ "sub": "u1" })));
    let (cypher, _) = cypher_as(&request, &principal, &CompilerConfig::default());
    assert_eq!(cypher.matches("apoc.util.validatePredicate").count(), 2);
    let set = cypher.find("SET").unwrap();
    let first = cypher.find("apoc.util.validatePredicate").unwrap();
    let last = cypher.rfind("apoc.util.validatePredicate").unwrap();
    assert!(first < set && set < last);
}
