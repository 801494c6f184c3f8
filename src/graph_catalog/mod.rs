//! Schema model: entities, attributes, relationships and composite types.
//!
//! The model is built once from a [`GraphSchemaConfig`] and is read-only
//! afterwards. Every compilation borrows entity and relationship definitions
//! from it instead of copying them.

pub mod authorization;
pub mod config;
pub mod errors;
pub mod graph_schema;
pub mod schema_types;

#[cfg(test)]
pub mod testing;

pub use authorization::{
    AuthorizationKind, AuthorizationOperation, AuthorizationPredicate, AuthorizationRule,
    AuthorizationWhen,
};
pub use config::GraphSchemaConfig;
pub use errors::GraphSchemaError;
pub use graph_schema::{
    Attribute, CompositeEntity, CompositeKind, ComputedField, ConcreteEntity, Direction, Entity,
    GraphSchema, LimitPolicy, NestedOperation, Relationship, RelationshipProperties,
};
pub use schema_types::ScalarKind;
