//! Root aggregates, `<rel>Aggregate` fields and connection aggregates.

use serde_json::json;

use super::{compile_error, cypher};
use crate::query_planner::errors::CompilationError;
use crate::query_planner::request::{FieldSelection, QueryRequest};

#[test]
fn test_root_aggregate_measures_are_isolated_calls() {
    let request = QueryRequest::aggregate("Movie")
        .arg("where", json!({ "released_GT": 1990 }))
        .select(vec![
            FieldSelection::new("count"),
            FieldSelection::new("released").select(FieldSelection::leaves(&["min", "max", "average"])),
            FieldSelection::new("title").select(FieldSelection::leaves(&["longest"])),
        ]);
    let (cypher, _) = cypher(&request);
    assert_eq!(cypher.matches("CALL {").count(), 5);
    assert!(cypher.contains("count(DISTINCT this0)"));
    assert!(cypher.contains("min(this0.released)"));
    assert!(cypher.contains("avg(this0.released)"));
    assert!(cypher.contains("ORDER BY size(this0.title) DESC"));
    assert!(cypher.contains("released: { min: "));
}

#[test]
fn test_relationship_aggregate_counts_nodes_and_edges() {
    let request = QueryRequest::read("Movie").select(vec![
        FieldSelection::new("title"),
        FieldSelection::new("actorsAggregate").select(vec![
            FieldSelection::new("count").select(FieldSelection::leaves(&["nodes", "edges"])),
            FieldSelection::new("edge").select(vec![
                FieldSelection::new("screenTime").select(FieldSelection::leaves(&["sum"])),
            ]),
        ]),
    ]);
    let (cypher, _) = cypher(&request);
    assert!(cypher.contains("WITH this0"));
    assert!(cypher.contains(":ACTED_IN]-("));
    assert!(cypher.contains(".screenTime)"));
    assert!(cypher.contains("sum("));
    assert!(cypher.contains("{ count: { nodes: "));
}

#[test]
fn test_connection_aggregate_reduces_edge_list() {
    let request = QueryRequest::read("Movie").select(vec![FieldSelection::new("actorsConnection").select(vec![
        FieldSelection::new("aggregate").select(vec![
            FieldSelection::new("count"),
            FieldSelection::new("node")
                .select(vec![FieldSelection::new("age").select(FieldSelection::leaves(&["max"]))]),
        ]),
    ])]);
    let (cypher, _) = cypher(&request);
    assert!(cypher.contains("UNWIND edges"));
    assert!(cypher.contains("max("));
}

#[test]
fn test_reductions_follow_attribute_kind() {
    let sum_of_strings = QueryRequest::aggregate("Actor")
        .select(vec![FieldSelection::new("name").select(FieldSelection::leaves(&["sum"]))]);
    assert!(matches!(
        compile_error(&sum_of_strings),
        CompilationError::UnsupportedAggregation { .. }
    ));
    let computed = QueryRequest::aggregate("Movie")
        .select(vec![FieldSelection::new("actorCount").select(FieldSelection::leaves(&["max"]))]);
    assert!(matches!(
        compile_error(&computed),
        CompilationError::UnsupportedAggregation { .. }
    ));
}

#[test]
fn test_root_aggregate_has_no_edges() {
    let request = QueryRequest::aggregate("Movie").select(vec![
        FieldSelection::new("count").select(FieldSelection::leaves(&["edges"])),
    ]);
    assert_eq!(
        compile_error(&request),
        CompilationError::unknown_field("Count", "edges")
    );
}
