//! graphcypher - selection-set queries over a property-graph schema, compiled
//! to parameterised Cypher.
//!
//! This crate provides:
//! - A schema model loaded from YAML (entities, interfaces, unions,
//!   relationship properties, authorization rules)
//! - A typed query AST built from a request and its field selection
//! - Transpilation of that AST into Cypher clauses plus bound parameters
//!
//! ```no_run
//! use graphcypher::config::CompilerConfig;
//! use graphcypher::graph_catalog::GraphSchemaConfig;
//! use graphcypher::query_planner::compile;
//! use graphcypher::query_planner::request::{FieldSelection, Principal, QueryRequest};
//!
//! let schema = GraphSchemaConfig::from_yaml_file("schema.yaml")?.build()?;
//! let request = QueryRequest::read("Movie").select(FieldSelection::leaves(&["title"]));
//! let program = compile(&schema, &request, &Principal::anonymous(), &CompilerConfig::default())?;
//! println!("{}", program.cypher());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod graph_catalog;
pub mod query_planner;
pub mod render_plan;
pub mod utils;
