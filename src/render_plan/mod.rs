//! Clause-level representation of a compiled program and its text rendering.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

pub mod clauses;
pub mod render_expr;
pub mod to_cypher;

pub use clauses::Clause;
pub use render_expr::RenderExpr;

pub trait ToCypher {
    fn to_cypher(&self) -> String;
}

/// Output of one compilation: clauses, bound parameters and the name of the
/// variable holding the response (absent for deletes).
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct CompiledProgram {
    pub clauses: Vec<Clause>,
    pub params: IndexMap<String, Value>,
    pub return_binding: Option<String>,
}

impl CompiledProgram {
    pub fn cypher(&self) -> String {
        to_cypher::render_clauses(&self.clauses)
    }
}

/// What the CLI and callers that only need the text get
#[derive(Debug, Clone, Serialize)]
pub struct RenderedProgram {
    pub cypher: String,
    pub params: IndexMap<String, Value>,
}

impl From<&CompiledProgram> for RenderedProgram {
    fn from(program: &CompiledProgram) -> Self {
        RenderedProgram {
            cypher: program.cypher(),
            params: program.params.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::clauses::{NodePattern, Pattern};
    use super::render_expr::ProjectionItem;
    use super::*;

    #[test]
    fn test_program_renders_clauses_in_order() {
        let mut params = IndexMap::new();
        params.insert("param1".to_string(), Value::from("Matrix"));
        let program = CompiledProgram {
            clauses: vec![
                Clause::matching(
                    Pattern::node(NodePattern::new("this0", &["Movie".to_string()])),
                    Some(RenderExpr::equals(
                        RenderExpr::property("this0", "title"),
                        RenderExpr::Parameter("param1".to_string()),
                    )),
                ),
                Clause::returning(vec![ProjectionItem::aliased(
                    RenderExpr::variable("this0"),
                    "this",
                )]),
            ],
            params,
            return_binding: Some("this".to_string()),
        };
        assert_eq!(
            program.cypher(),
            "MATCH (this0:Movie)\nWHERE this0.title = $param1\nRETURN this0 AS this"
        );
        let rendered = serde_json::to_value(RenderedProgram::from(&program)).unwrap();
        assert_eq!(rendered["params"]["param1"], "Matrix");
    }
}
