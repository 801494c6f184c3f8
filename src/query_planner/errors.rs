//! # Compilation Error Types
//!
//! Every failure raised while turning a request into a program. All of them
//! abort the compilation; there are no partial programs.
//!
//! `Forbidden` is deliberately absent: authorization validations are compiled
//! into runtime assertions, so a forbidden request still compiles and only
//! fails when the database evaluates the assertion. See [`RuntimeFailure`].

use thiserror::Error;

use crate::graph_catalog::errors::GraphSchemaError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompilationError {
    #[error("No entity named `{name}` in the schema model")]
    UnknownEntity { name: String },

    #[error("Entity `{entity}` has no field named `{field}`")]
    UnknownField { entity: String, field: String },

    #[error("Unsupported filter combination at `{path}`: {reason}")]
    UnsupportedFilterCombination { path: String, reason: String },

    #[error(
        "UNION branches of `{entity}` return different columns: expected {expected:?}, found {found:?}"
    )]
    PolymorphicProjectionMismatch {
        entity: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Unsupported aggregation at `{path}`: {reason}")]
    UnsupportedAggregation { path: String, reason: String },

    #[error("Invalid argument at `{path}`: {reason}")]
    InvalidArgument { path: String, reason: String },

    #[error("Nested `{operation}` is not permitted on relationship `{entity}.{relationship}`")]
    NestedOperationNotPermitted {
        entity: String,
        relationship: String,
        operation: String,
    },

    #[error("Unsupported mutation at `{path}`: {reason}")]
    UnsupportedMutation { path: String, reason: String },

    #[error("Query depth {depth} exceeds the configured maximum of {max}")]
    QueryTooDeep { depth: usize, max: usize },

    #[error("No `{binding}` binding in scope")]
    MissingBinding { binding: String },

    #[error("Schema error: {0}")]
    Schema(GraphSchemaError),
}

impl From<GraphSchemaError> for CompilationError {
    fn from(error: GraphSchemaError) -> Self {
        match error {
            GraphSchemaError::UnknownEntity { name } => CompilationError::UnknownEntity { name },
            GraphSchemaError::UnknownField { entity, field } => {
                CompilationError::UnknownField { entity, field }
            }
            other => CompilationError::Schema(other),
        }
    }
}

impl CompilationError {
    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        CompilationError::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    pub fn filter_with_context(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CompilationError::UnsupportedFilterCombination {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn argument_with_context(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CompilationError::InvalidArgument {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn aggregation_with_context(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CompilationError::UnsupportedAggregation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn mutation_with_context(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CompilationError::UnsupportedMutation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_binding(binding: impl Into<String>) -> Self {
        CompilationError::MissingBinding {
            binding: binding.into(),
        }
    }
}

/// Failures surfaced by the database while running a compiled program
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeFailure {
    #[error("Forbidden")]
    Forbidden,
}

impl RuntimeFailure {
    /// Recognise the failure raised by a validation assertion.
    ///
    /// `message` is the configured forbidden message that was compiled into
    /// the program; the database wraps it in its own error text.
    pub fn from_database_message(error: &str, message: &str) -> Option<Self> {
        if error.contains(message) {
            Some(RuntimeFailure::Forbidden)
        } else {
            None
        }
    }
}
