//! Create, update and delete programs.

use serde_json::json;

use super::{claims, compile_error, cypher, cypher_as};
use crate::config::CompilerConfig;
use crate::graph_catalog::testing::movie_schema;
use crate::query_planner::compile;
use crate::query_planner::errors::CompilationError;
use crate::query_planner::request::{FieldSelection, OperationKind, Principal, QueryRequest};

#[test]
fn test_create_each_input_in_own_call() {
    let request = QueryRequest::new(OperationKind::Create, "Movie")
        .arg("input", json!([{ "title": "A" }, { "title": "B", "premiere": "1999-03-31T00:00:00Z" }]))
        .select(FieldSelection::leaves(&["title"]));
    let (cypher, params) = cypher(&request);
    assert_eq!(cypher.matches("CREATE (").count(), 2);
    assert!(cypher.contains("datetime($param"));
    assert!(cypher.ends_with("AS this"));
    assert!(params.values().any(|value| value == &json!("B")));
}

#[test]
fn test_nested_create_writes_edge_properties() {
    let request = QueryRequest::new(OperationKind::Create, "Movie")
        .arg(
            "input",
            json!({
                "title": "The Matrix",
                "actors": { "create": { "node": { "name": "Keanu" }, "edge": { "role": "Neo" } } }
            }),
        )
        .select(FieldSelection::leaves(&["title"]));
    let (cypher, _) = cypher(&request);
    assert!(cypher.contains("CREATE (this0)<-["));
    assert!(cypher.contains(":ACTED_IN]-("));
    assert!(cypher.contains(".role = $param"));
    assert!(cypher.contains("RETURN count(*) AS var"));
}

#[test]
fn test_connect_and_disconnect_single_relationship() {
    let request = QueryRequest::new(OperationKind::Update, "Movie")
        .arg("where", json!({ "title": "The Matrix" }))
        .arg("connect", json!({ "director": { "where": { "node": { "name": "Lana" } } } }))
        .arg("disconnect", json!({ "director": { "where": { "node": { "name": "Joel" } } } }))
        .select(FieldSelection::leaves(&["title"]));
    let (cypher, _) = cypher(&request);
    assert!(cypher.contains("MERGE (this0)<-["));
    assert!(cypher.contains("DELETE this"));
    assert!(cypher.contains("RETURN collect(DISTINCT this0 { .title }) AS this"));
}

#[test]
fn test_delete_returns_nothing() {
    let schema = movie_schema();
    let request = QueryRequest::new(OperationKind::Delete, "Movie").arg("where", json!({ "title": "X" }));
    let program = compile(&schema, &request, &Principal::anonymous(), &CompilerConfig::default()).unwrap();
    assert_eq!(program.return_binding, None);
    let cypher = program.cypher();
    assert!(cypher.ends_with("DETACH DELETE this0"));
    assert!(!cypher.contains("RETURN"));
}

#[test]
fn test_nested_delete_runs_before_parent() {
    let request = QueryRequest::new(OperationKind::Delete, "User")
        .arg("where", json!({ "id": "u1" }))
        .arg("delete", json!({ "posts": { "where": { "node": { "content_CONTAINS": "spam" } } } }));
    let principal = Principal::authenticated(claims(json!({ "sub": "u1" })));
    let (cypher, _) = cypher_as(&request, &principal, &CompilerConfig::default());
    let nested = cypher.find("DETACH DELETE this3").unwrap();
    let parent = cypher.find("DETACH DELETE this0").unwrap();
    assert!(nested < parent);
    assert!(cypher.contains("apoc.util.validatePredicate"));
}

#[test]
fn test_disallowed_nested_operation() {
    let request = QueryRequest::new(OperationKind::Update, "Movie")
        .arg("delete", json!({ "director": { "where": { "node": { "name": "Lana" } } } }));
    assert!(matches!(
        compile_error(&request),
        CompilationError::NestedOperationNotPermitted { .. }
    ));
}

#[test]
fn test_composite_targets_cannot_be_mutated() {
    let request = QueryRequest::new(OperationKind::Update, "Actor")
        .arg("connect", json!({ "actedIn": { "where": { "node": { "title": "Dark" } } } }));
    assert!(matches!(
        compile_error(&request),
        CompilationError::UnsupportedMutation { .. }
    ));
    let direct = QueryRequest::new(OperationKind::Create, "Production").arg("input", json!({ "title": "X" }));
    assert!(matches!(
        compile_error(&direct),
        CompilationError::UnsupportedMutation { .. }
    ));
}
