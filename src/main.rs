use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use graphcypher::config::CompilerConfig;
use graphcypher::graph_catalog::GraphSchemaConfig;
use graphcypher::query_planner::compile;
use graphcypher::query_planner::request::{Principal, QueryRequest};
use graphcypher::render_plan::RenderedProgram;

/// graphcypher - compile a selection-set request into Cypher
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema definition (YAML)
    #[arg(long)]
    schema: PathBuf,

    /// Request to compile (JSON or YAML)
    #[arg(long)]
    request: PathBuf,

    /// Principal the request runs as (JSON or YAML); anonymous when omitted
    #[arg(long)]
    principal: Option<PathBuf>,

    /// Compiler limits (YAML); read from GRAPHCYPHER_* variables when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the Cypher text only
    #[arg(long)]
    cypher_only: bool,
}

/// JSON is a subset of YAML, so one parser reads both
fn read_document<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => CompilerConfig::from_yaml_file(path)?,
        None => CompilerConfig::from_env()?,
    };
    let schema = GraphSchemaConfig::from_yaml_file(&cli.schema)?.build()?;
    let request: QueryRequest = read_document(&cli.request)?;
    let principal = match &cli.principal {
        Some(path) => read_document(path)?,
        None => Principal::anonymous(),
    };

    let program = compile(&schema, &request, &principal, &config)?;
    if cli.cypher_only {
        println!("{}", program.cypher());
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(&RenderedProgram::from(&program))?
        );
    }
    Ok(())
}

fn main() {
    // Defaults to WARN so stdout stays machine-readable; override with RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
