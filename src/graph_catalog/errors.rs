//! # Graph Schema Error Types
//!
//! Errors raised while loading a schema definition and while resolving names
//! against the built schema model.
//!
//! ## Error Categories
//!
//! - **Resolution Errors**: a request references an entity or field the model
//!   does not contain. The request-facing schema is generated from the same
//!   model, so these signal drift between the two and are never user errors.
//! - **Configuration Errors**: file I/O, YAML parsing and structural validation
//!   of the schema definition.
//!
//! ## Usage Patterns
//!
//! ```ignore
//! GraphSchemaError::config_error_with_context(
//!     "schema.yaml",
//!     "interface `Production` lists unknown implementation `Show`"
//! )
//! ```

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphSchemaError {
    #[error("No entity named `{name}` in the schema model")]
    UnknownEntity { name: String },
    #[error("Entity `{entity}` has no field named `{field}`")]
    UnknownField { entity: String, field: String },
    #[error("Failed to read schema definition: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse schema definition: {error}")]
    ConfigParseError { error: String },
    #[error("Invalid schema definition: {message}")]
    InvalidConfig { message: String },
}

impl GraphSchemaError {
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        GraphSchemaError::UnknownEntity { name: name.into() }
    }

    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        GraphSchemaError::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Create a configuration error with context information
    ///
    /// # Example
    /// ```ignore
    /// GraphSchemaError::config_error_with_context(
    ///     "Movie.actors",
    ///     "relationship target `Person` is not declared"
    /// )
    /// ```
    pub fn config_error_with_context(
        location: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        GraphSchemaError::InvalidConfig {
            message: format!("{}: {}", location.into(), context.into()),
        }
    }
}
