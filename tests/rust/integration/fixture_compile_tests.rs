//! Fixture requests compiled against the library schema

use graphcypher::config::CompilerConfig;
use graphcypher::query_planner::compile;
use graphcypher::query_planner::errors::CompilationError;
use graphcypher::query_planner::request::{FieldSelection, OperationKind, Principal, QueryRequest};
use graphcypher::render_plan::RenderedProgram;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

use super::{fixture_path, library_schema, read_fixture};

fn compiler_config() -> CompilerConfig {
    CompilerConfig::from_yaml_file(fixture_path("compiler.yaml")).expect("compiler config")
}

fn compile_fixture(name: &str, principal: &Principal) -> RenderedProgram {
    let schema = library_schema();
    let request: QueryRequest = read_fixture(name);
    let program = compile(&schema, &request, principal, &compiler_config())
        .unwrap_or_else(|e| panic!("{} should compile: {}", name, e));
    RenderedProgram::from(&program)
}

#[test_case("requests/books_by_author.json" ; "json read")]
#[test_case("requests/create_review.yaml" ; "yaml create")]
#[test_case("requests/shelf.yaml" ; "union read")]
fn test_fixture_compiles_deterministically(name: &str) {
    let principal: Principal = read_fixture("principal.yaml");
    let first = compile_fixture(name, &principal);
    let second = compile_fixture(name, &principal);
    assert_eq!(first.cypher, second.cypher);
    assert_eq!(first.params, second.params);
    for key in first.params.keys() {
        assert!(first.cypher.contains(&format!("${}", key)), "unused parameter {}", key);
    }
}

#[test]
fn test_books_by_author() {
    let program = compile_fixture("requests/books_by_author.json", &Principal::anonymous());
    assert!(program.cypher.starts_with("MATCH (this0:Book)"));
    assert!(program.cypher.contains("EXISTS {"));
    assert!(program.cypher.contains(":WROTE]-("));
    assert!(program.cypher.contains("(this0)<-["));
    assert!(program.cypher.contains("this0.pages > $param"));
    assert!(program.cypher.contains("this0.sub_title"));
    assert!(program.cypher.contains("ORDER BY this0.title ASC"));
    assert!(program.cypher.ends_with("AS this"));
    assert!(program.params.values().any(|value| value == &json!("Ursula K. Le Guin")));
    assert!(program.params.values().any(|value| value == &json!(200)));
    // Book declares its own max of 100, so the requested 5 stands
    assert!(program.params.values().any(|value| value == &json!(5)));
}

#[test]
fn test_create_review_checks_reviewer() {
    let principal: Principal = read_fixture("principal.yaml");
    let program = compile_fixture("requests/create_review.yaml", &principal);
    assert!(program.cypher.contains("CREATE ("));
    assert!(program.cypher.contains(":REVIEWS]->("));
    assert!(program.cypher.contains("apoc.util.validatePredicate"));
    assert!(program.cypher.contains("\"Not allowed\""));
    assert!(program.params.values().any(|value| value == &json!("member-7")));
    assert!(program.params.values().any(|value| value == &json!("978-0441478125")));
}

#[test]
fn test_union_read_covers_every_member() {
    let program = compile_fixture("requests/shelf.yaml", &Principal::anonymous());
    assert!(program.cypher.contains("UNION"));
    assert!(program.cypher.contains(":Book)"));
    assert!(program.cypher.contains(":Magazine)"));
    assert!(program.cypher.contains("__typename: \"Book\""));
    assert!(program.cypher.contains("__typename: \"Magazine\""));
}

#[test]
fn test_configured_depth_limit() {
    let request = QueryRequest::read("Review").select(vec![FieldSelection::new("book").select(vec![
        FieldSelection::new("reviews").select(vec![
            FieldSelection::new("book").select(vec![
                FieldSelection::new("reviews").select(FieldSelection::leaves(&["rating"])),
            ]),
        ]),
    ])]);
    let schema = library_schema();
    let error = compile(&schema, &request, &Principal::anonymous(), &compiler_config()).unwrap_err();
    assert_eq!(error, CompilationError::QueryTooDeep { depth: 5, max: 4 });
}

#[test]
fn test_nested_create_not_permitted() {
    let request = QueryRequest::new(OperationKind::Create, "Review")
    .arg(
        "input",
        json!({ "id": "r-2", "book": { "create": { "node": { "isbn": "1", "title": "New" } } } }),
    )
    .select(FieldSelection::leaves(&["id"]));
    let schema = library_schema();
    let error = compile(&schema, &request, &Principal::anonymous(), &CompilerConfig::default()).unwrap_err();
    assert!(matches!(
        error,
        CompilationError::NestedOperationNotPermitted { ref relationship, .. } if relationship == "book"
    ));
}

#[test]
fn test_unknown_entity() {
    let schema = library_schema();
    let request = QueryRequest::read("Periodical").select(FieldSelection::leaves(&["title"]));
    assert_eq!(
        compile(&schema, &request, &Principal::anonymous(), &CompilerConfig::default()).unwrap_err(),
        CompilationError::UnknownEntity { name: "Periodical".to_string() }
    );
}
