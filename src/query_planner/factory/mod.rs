//! AST factory.
//!
//! Recursive descent over (schema entity, field selection, arguments). Each
//! level resolves names against the schema model, injects the authorization
//! rules that apply to it and hands the nested selections to the level below.
//! Nothing here emits clauses.

pub mod auth_factory;
pub mod field_factory;
pub mod filter_factory;
pub mod mutation_factory;
pub mod sort_and_pagination;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::CompilerConfig;
use crate::graph_catalog::graph_schema::{Entity, GraphSchema, Relationship};
use crate::query_planner::ast::Operation;
use crate::query_planner::errors::CompilationError;
use crate::query_planner::request::{FieldSelection, OperationKind, Principal, QueryRequest};

pub struct AstFactory<'s> {
    pub(crate) schema: &'s GraphSchema,
    pub(crate) config: &'s CompilerConfig,
    pub(crate) principal: &'s Principal,
}

/// Relationship a nested operation is reached through
#[derive(Debug, Clone, Copy)]
pub(crate) struct Via<'s> {
    /// Name of the entity owning the relationship
    pub parent: &'s str,
    pub relationship: &'s Relationship,
}

impl<'s> Via<'s> {
    /// `MovieActors`, the prefix of the nested connection's type names
    pub fn type_prefix(&self) -> String {
        let mut name = self.relationship.name.chars();
        let capitalized = match name.next() {
            Some(first) => first.to_uppercase().chain(name).collect::<String>(),
            None => String::new(),
        };
        format!("{}{}", self.parent, capitalized)
    }
}

impl<'s> AstFactory<'s> {
    pub fn new(
        schema: &'s GraphSchema,
        config: &'s CompilerConfig,
        principal: &'s Principal,
    ) -> Self {
        AstFactory {
            schema,
            config,
            principal,
        }
    }

    pub fn build(&self, request: &QueryRequest) -> Result<Operation<'s>, CompilationError> {
        let entity = self.schema.resolve_entity(&request.entity)?;
        log::debug!(
            "Building {:?} operation on {}",
            request.operation,
            entity.name()
        );
        let path = entity.name();
        let args = &request.args;
        let selection = &request.selection;
        let on_types = &request.on_types;
        match (request.operation, entity) {
            (OperationKind::Read, Entity::Concrete(concrete)) => Ok(Operation::Read(
                self.read_operation(concrete, None, args, selection, on_types, path)?,
            )),
            (OperationKind::Read, Entity::Composite(composite)) => Ok(Operation::CompositeRead(
                self.composite_read(composite, None, args, selection, on_types, path)?,
            )),
            (OperationKind::Connection, Entity::Concrete(concrete)) => {
                Ok(Operation::ConnectionRead(self.connection_operation(
                    concrete, None, args, selection, path,
                )?))
            }
            (OperationKind::Connection, Entity::Composite(composite)) => {
                Ok(Operation::CompositeConnectionRead(
                    self.composite_connection(composite, None, args, selection, path)?,
                ))
            }
            (OperationKind::Aggregate, Entity::Concrete(concrete)) => Ok(Operation::Aggregate(
                self.aggregate_operation(concrete, args, selection, path)?,
            )),
            (OperationKind::Aggregate, Entity::Composite(_)) => {
                Err(CompilationError::aggregation_with_context(
                    path,
                    "interfaces and unions cannot be aggregated",
                ))
            }
            (OperationKind::Create, Entity::Concrete(concrete)) => Ok(Operation::Create(
                self.create_operation(concrete, args, selection, on_types, path)?,
            )),
            (OperationKind::Update, Entity::Concrete(concrete)) => Ok(Operation::Update(
                self.update_operation(concrete, args, selection, on_types, path)?,
            )),
            (OperationKind::Delete, Entity::Concrete(concrete)) => Ok(Operation::Delete(
                self.delete_operation(concrete, args, path)?,
            )),
            (
                OperationKind::Create | OperationKind::Update | OperationKind::Delete,
                Entity::Composite(_),
            ) => Err(CompilationError::mutation_with_context(
                path,
                "interfaces and unions cannot be mutated directly",
            )),
        }
    }
}

/// Selection of a concrete entity: the common fields plus its own `on`
/// fragment, first occurrence of each response key wins
pub(crate) fn effective_selection<'a>(
    type_name: &str,
    selection: &'a [FieldSelection],
    on_types: &'a IndexMap<String, Vec<FieldSelection>>,
) -> Vec<&'a FieldSelection> {
    let mut merged: Vec<&FieldSelection> = Vec::with_capacity(selection.len());
    let fragment = on_types.get(type_name).map(Vec::as_slice).unwrap_or_default();
    for field in selection.iter().chain(fragment) {
        if !merged
            .iter()
            .any(|seen| seen.response_key() == field.response_key())
        {
            merged.push(field);
        }
    }
    merged
}

pub(crate) fn child_path(path: &str, key: &str) -> String {
    format!("{}.{}", path, key)
}

/// Object-valued argument; `null` and absence are both `None`
pub(crate) fn object_arg<'a>(
    args: &'a Map<String, Value>,
    name: &str,
    path: &str,
) -> Result<Option<&'a Map<String, Value>>, CompilationError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(object)) => Ok(Some(object)),
        Some(_) => Err(CompilationError::argument_with_context(
            child_path(path, name),
            "expected an object",
        )),
    }
}

/// List-valued argument; a single object is accepted as a one-element list
pub(crate) fn list_arg<'a>(
    args: &'a Map<String, Value>,
    name: &str,
    path: &str,
) -> Result<Vec<&'a Value>, CompilationError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.iter().collect()),
        Some(value @ Value::Object(_)) => Ok(vec![value]),
        Some(_) => Err(CompilationError::argument_with_context(
            child_path(path, name),
            "expected a list",
        )),
    }
}

pub(crate) fn as_object<'a>(
    value: &'a Value,
    path: &str,
) -> Result<&'a Map<String, Value>, CompilationError> {
    value
        .as_object()
        .ok_or_else(|| CompilationError::argument_with_context(path, "expected an object"))
}

pub(crate) fn as_u64(value: &Value, path: &str) -> Result<u64, CompilationError> {
    value.as_u64().ok_or_else(|| {
        CompilationError::argument_with_context(path, "expected a non-negative integer")
    })
}
