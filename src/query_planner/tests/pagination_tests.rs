//! Sorting, limits and cursor paging.

use serde_json::json;

use super::{compile_error, cypher, cypher_as};
use crate::config::CompilerConfig;
use crate::query_planner::errors::CompilationError;
use crate::query_planner::request::{FieldSelection, Principal, QueryRequest};
use crate::utils::cursor::offset_to_cursor;

#[test]
fn test_sort_and_page_bound_as_parameters() {
    let request = QueryRequest::read("Movie")
        .arg("sort", json!([{ "released": "DESC" }, { "title": "ASC" }]))
        .arg("offset", json!(10))
        .arg("limit", json!(5))
        .select(FieldSelection::leaves(&["title"]));
    let (cypher, params) = cypher(&request);
    assert!(cypher.contains("ORDER BY this0.released DESC, this0.title ASC"));
    assert!(cypher.contains("SKIP $param"));
    assert!(cypher.contains("LIMIT $param"));
    assert!(params.values().any(|value| value == &json!(10)));
    assert!(params.values().any(|value| value == &json!(5)));
}

#[test]
fn test_configured_limits_cap_requests() {
    let config = CompilerConfig {
        default_limit: Some(20),
        max_limit: Some(100),
        ..CompilerConfig::default()
    };
    let unbounded = QueryRequest::read("Movie").select(FieldSelection::leaves(&["title"]));
    let (_, params) = cypher_as(&unbounded, &Principal::anonymous(), &config);
    assert!(params.values().any(|value| value == &json!(20)));

    let greedy = unbounded.clone().arg("limit", json!(1000));
    let (_, params) = cypher_as(&greedy, &Principal::anonymous(), &config);
    assert!(params.values().any(|value| value == &json!(100)));
}

#[test]
fn test_entity_limit_skips_single_relationships() {
    let request = QueryRequest::read("Movie").select(vec![
        FieldSelection::new("director").select(FieldSelection::leaves(&["name"])),
    ]);
    let (single, _) = cypher(&request);
    assert!(!single.contains("LIMIT"));
    assert!(single.contains("head(collect("));

    let people = QueryRequest::read("Person").select(FieldSelection::leaves(&["name"]));
    let (cypher, params) = cypher(&people);
    assert!(cypher.contains("LIMIT $param"));
    assert!(params.values().any(|value| value == &json!(10)));
}

#[test]
fn test_connection_pages_after_cursor() {
    let request = QueryRequest::connection("Movie")
        .arg("first", json!(2))
        .arg("after", json!(offset_to_cursor(3)))
        .arg("sort", json!([{ "title": "ASC" }]))
        .select(vec![
            FieldSelection::new("totalCount"),
            FieldSelection::new("edges")
                .select(vec![FieldSelection::new("node").select(FieldSelection::leaves(&["title"]))]),
            FieldSelection::new("pageInfo").select(FieldSelection::leaves(&["hasNextPage", "hasPreviousPage"])),
        ]);
    let (cypher, params) = cypher(&request);
    assert!(cypher.contains("size(edges"));
    assert!(cypher.contains("ORDER BY this0.title ASC"));
    assert!(params.values().any(|value| value == &json!(4)));
    assert!(params.values().any(|value| value == &json!(2)));
}

#[test]
fn test_last_possible_cursor_is_rejected() {
    let request = QueryRequest::connection("Movie")
        .arg("after", json!(offset_to_cursor(u64::MAX)))
        .select(FieldSelection::leaves(&["totalCount"]));
    assert!(matches!(
        compile_error(&request),
        CompilationError::InvalidArgument { ref path, .. } if path.ends_with("after")
    ));
}

#[test]
fn test_connection_edge_sort_uses_relationship() {
    let request = QueryRequest::read("Movie").select(vec![FieldSelection::new("actorsConnection")
        .arg("sort", json!([{ "edge": { "screenTime": "DESC" } }]))
        .select(vec![FieldSelection::new("edges").select(vec![
            FieldSelection::new("node").select(FieldSelection::leaves(&["name"])),
            FieldSelection::new("properties").select(FieldSelection::leaves(&["screenTime"])),
        ])])]);
    let (cypher, _) = cypher(&request);
    assert!(cypher.contains("ORDER BY this1.screenTime DESC"));
}

#[test]
fn test_invalid_cursor_and_duplicate_limits() {
    let bad_cursor = QueryRequest::connection("Movie")
        .arg("after", json!("not-a-cursor"))
        .select(vec![FieldSelection::new("totalCount")]);
    assert!(matches!(
        compile_error(&bad_cursor),
        CompilationError::InvalidArgument { .. }
    ));

    let duplicated = QueryRequest::read("Movie")
        .arg("limit", json!(1))
        .arg("options", json!({ "limit": 2 }))
        .select(FieldSelection::leaves(&["title"]));
    assert!(matches!(
        compile_error(&duplicated),
        CompilationError::UnsupportedFilterCombination { .. }
    ));
}

#[test]
fn test_relationship_field_dedupes_targets_but_connection_does_not() {
    let list = QueryRequest::read("Movie")
        .select(vec![FieldSelection::new("actors").select(FieldSelection::leaves(&["name"]))]);
    let (list_cypher, _) = cypher(&list);
    assert!(list_cypher.contains("WITH DISTINCT this2"));

    let connection = QueryRequest::read("Movie").select(vec![FieldSelection::new("actorsConnection")
        .select(vec![FieldSelection::new("edges").select(vec![
            FieldSelection::new("node").select(FieldSelection::leaves(&["name"])),
        ])])]);
    let (connection_cypher, _) = cypher(&connection);
    assert!(!connection_cypher.contains("DISTINCT"));
    assert!(connection_cypher.contains("collect({ node: this2, relationship: this1 })"));
}
