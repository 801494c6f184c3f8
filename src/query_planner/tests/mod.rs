//! End-to-end compilation scenarios over the movie schema.

mod aggregation_tests;
mod authorization_tests;
mod mutation_tests;
mod pagination_tests;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::CompilerConfig;
use crate::graph_catalog::testing::movie_schema;
use crate::query_planner::compile;
use crate::query_planner::errors::CompilationError;
use crate::query_planner::request::{FieldSelection, Principal, QueryRequest};

/// Compile `request` anonymously with the default limits
fn cypher(request: &QueryRequest) -> (String, IndexMap<String, Value>) {
    cypher_as(request, &Principal::anonymous(), &CompilerConfig::default())
}

fn cypher_as(
    request: &QueryRequest,
    principal: &Principal,
    config: &CompilerConfig,
) -> (String, IndexMap<String, Value>) {
    let schema = movie_schema();
    let program = compile(&schema, request, principal, config).expect("request should compile");
    (program.cypher(), program.params)
}

fn compile_error(request: &QueryRequest) -> CompilationError {
    let schema = movie_schema();
    compile(&schema, request, &Principal::anonymous(), &CompilerConfig::default())
        .expect_err("request should be rejected")
}

fn claims(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn test_compilation_is_deterministic() {
    let request = QueryRequest::read("Movie")
        .arg("where", serde_json::json!({ "actors_SOME": { "name_STARTS_WITH": "K" } }))
        .select(vec![
            FieldSelection::new("title"),
            FieldSelection::new("actors")
                .select(FieldSelection::leaves(&["name"])),
        ]);
    assert_eq!(cypher(&request), cypher(&request));
}

#[test]
fn test_depth_limit() {
    let request = QueryRequest::read("Movie").select(vec![FieldSelection::new("actors").select(vec![
        FieldSelection::new("movies").select(vec![FieldSelection::new("actors").select(FieldSelection::leaves(&["name"]))]),
    ])]);
    let config = CompilerConfig {
        max_query_depth: 3,
        ..CompilerConfig::default()
    };
    let schema = movie_schema();
    assert_eq!(
        compile(&schema, &request, &Principal::anonymous(), &config).unwrap_err(),
        CompilationError::QueryTooDeep { depth: 4, max: 3 }
    );
    let (cypher, _) = cypher(&request);
    assert_eq!(cypher.matches("CALL {").count(), 3);
}
