//! Request to program: build the AST, check its depth, transpile it.

pub mod ast;
pub mod errors;
pub mod factory;
pub mod plan_ctx;
pub mod request;

#[cfg(test)]
mod tests;

use crate::config::CompilerConfig;
use crate::graph_catalog::graph_schema::GraphSchema;
use crate::render_plan::CompiledProgram;

use ast::{AstNodeRef, Operation};
use errors::CompilationError;
use factory::AstFactory;
use plan_ctx::{Environment, QueryContext};
use request::{Principal, QueryRequest};

/// Name the response is returned under
pub const RETURN_BINDING: &str = "this";

/// Compile `request` against `schema` for `principal`.
///
/// Compilation is deterministic: the same inputs always give the same clauses
/// and parameter names.
pub fn compile(
    schema: &GraphSchema,
    request: &QueryRequest,
    principal: &Principal,
    config: &CompilerConfig,
) -> Result<CompiledProgram, CompilationError> {
    let operation = AstFactory::new(schema, config, principal).build(request)?;

    let depth = AstNodeRef::Operation(&operation).depth();
    let max = config.max_query_depth as usize;
    if depth > max {
        log::warn!("Rejecting {} request nested {} levels deep", request.entity, depth);
        return Err(CompilationError::QueryTooDeep { depth, max });
    }

    let env = Environment::new(schema, config, principal);
    let ctx = QueryContext::root(&env, env.next_binding("this"), RETURN_BINDING);
    let transpiled = operation.transpile(&ctx)?;
    let return_binding = match operation {
        Operation::Delete(_) => None,
        _ => Some(RETURN_BINDING.to_string()),
    };
    drop(ctx);
    let params = env.into_params();
    log::debug!(
        "Compiled {:?} on {} into {} clause(s) with {} parameter(s)",
        request.operation,
        request.entity,
        transpiled.clauses.len(),
        params.len()
    );
    Ok(CompiledProgram {
        clauses: transpiled.clauses,
        params,
        return_binding,
    })
}
