//! Integration tests - compile fixture requests through the public API
//!
//! Schemas, requests and principals are loaded from `tests/fixtures`, the same
//! way the command-line tool reads them.

mod concurrency_tests;
mod fixture_compile_tests;
mod schema_loading_tests;

use std::path::PathBuf;

use graphcypher::graph_catalog::{GraphSchema, GraphSchemaConfig};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Read a JSON or YAML fixture document
pub fn read_fixture<T: serde::de::DeserializeOwned>(name: &str) -> T {
    let content = std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("reading fixture {}: {}", name, e));
    serde_yaml::from_str(&content).unwrap_or_else(|e| panic!("parsing fixture {}: {}", name, e))
}

pub fn library_schema() -> GraphSchema {
    GraphSchemaConfig::from_yaml_file(fixture_path("library_schema.yaml"))
        .and_then(|config| config.build())
        .expect("library schema should build")
}
