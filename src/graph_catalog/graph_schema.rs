use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use super::authorization::AuthorizationRule;
use super::errors::GraphSchemaError;
use super::schema_types::ScalarKind;

/// Custom-Cypher field: `statement` runs with `this` bound to the owning node and
/// must return `column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedField {
    pub statement: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    /// Physical property name, when it differs from `name`
    pub database_alias: Option<String>,
    pub kind: ScalarKind,
    pub is_list: bool,
    pub nullable: bool,
    pub is_unique: bool,
    pub computed: Option<ComputedField>,
    /// Field-level rules; compiled independently of the entity's rules
    pub authorization: Vec<AuthorizationRule>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Attribute {
            name: name.into(),
            database_alias: None,
            kind,
            is_list: false,
            nullable: true,
            is_unique: false,
            computed: None,
            authorization: Vec::new(),
        }
    }

    /// Name of the property stored in the graph
    pub fn database_name(&self) -> &str {
        self.database_alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// `(source)-[:TYPE]->(target)`
    Out,
    /// `(source)<-[:TYPE]-(target)`
    In,
    /// `(source)-[:TYPE]-(target)`; created as outgoing
    Either,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Out => write!(f, "OUT"),
            Direction::In => write!(f, "IN"),
            Direction::Either => write!(f, "EITHER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NestedOperation {
    Connect,
    Create,
    Update,
    Disconnect,
    Delete,
}

impl NestedOperation {
    pub const ALL: [NestedOperation; 5] = [
        NestedOperation::Connect,
        NestedOperation::Create,
        NestedOperation::Update,
        NestedOperation::Disconnect,
        NestedOperation::Delete,
    ];
}

impl fmt::Display for NestedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NestedOperation::Connect => "connect",
            NestedOperation::Create => "create",
            NestedOperation::Update => "update",
            NestedOperation::Disconnect => "disconnect",
            NestedOperation::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    /// Field-facing name
    pub name: String,
    /// Physical relationship type
    pub graph_type: String,
    pub direction: Direction,
    /// Name of the target entity, concrete or composite
    pub target: String,
    pub is_list: bool,
    /// Name of the relationship-properties entity
    pub properties: Option<String>,
    pub nested_operations: BTreeSet<NestedOperation>,
}

impl Relationship {
    pub fn allows(&self, operation: NestedOperation) -> bool {
        self.nested_operations.contains(&operation)
    }
}

/// Attributes carried by a relationship type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipProperties {
    pub name: String,
    pub attributes: IndexMap<String, Attribute>,
}

impl RelationshipProperties {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

/// Default and maximum page size for list reads of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitPolicy {
    #[serde(default)]
    pub default: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcreteEntity {
    pub name: String,
    pub labels: Vec<String>,
    pub attributes: IndexMap<String, Attribute>,
    pub relationships: IndexMap<String, Relationship>,
    pub authorization: Vec<AuthorizationRule>,
    pub limit: Option<LimitPolicy>,
}

impl ConcreteEntity {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    pub fn main_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeKind {
    Interface,
    Union,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeEntity {
    pub name: String,
    pub kind: CompositeKind,
    /// Concrete entity names, in declaration order
    pub constituents: Vec<String>,
    /// Interfaces only: attributes present on every constituent
    pub shared_attributes: IndexMap<String, Attribute>,
    /// Interfaces only: relationships present on every constituent
    pub relationships: IndexMap<String, Relationship>,
}

impl CompositeEntity {
    pub fn is_union(&self) -> bool {
        self.kind == CompositeKind::Union
    }

    pub fn has_constituent(&self, name: &str) -> bool {
        self.constituents.iter().any(|c| c == name)
    }
}

/// A resolved entity reference, borrowed from the schema model
#[derive(Debug, Clone, Copy)]
pub enum Entity<'s> {
    Concrete(&'s ConcreteEntity),
    Composite(&'s CompositeEntity),
}

impl<'s> Entity<'s> {
    pub fn name(&self) -> &'s str {
        match self {
            Entity::Concrete(entity) => &entity.name,
            Entity::Composite(entity) => &entity.name,
        }
    }

    pub fn as_concrete(&self) -> Option<&'s ConcreteEntity> {
        match self {
            Entity::Concrete(entity) => Some(entity),
            Entity::Composite(_) => None,
        }
    }
}

/// The schema model.
///
/// Built once by [`super::config::GraphSchemaConfig::build`] and read-only
/// afterwards: there is no mutation API, so a built schema can be shared behind
/// an `Arc` by any number of concurrent compilations.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSchema {
    entities: IndexMap<String, ConcreteEntity>,
    composites: IndexMap<String, CompositeEntity>,
    relationship_properties: HashMap<String, RelationshipProperties>,
}

impl GraphSchema {
    pub(crate) fn new(
        entities: IndexMap<String, ConcreteEntity>,
        composites: IndexMap<String, CompositeEntity>,
        relationship_properties: HashMap<String, RelationshipProperties>,
    ) -> Self {
        GraphSchema {
            entities,
            composites,
            relationship_properties,
        }
    }

    pub fn resolve_entity(&self, name: &str) -> Result<Entity<'_>, GraphSchemaError> {
        if let Some(entity) = self.entities.get(name) {
            return Ok(Entity::Concrete(entity));
        }
        self.composites
            .get(name)
            .map(Entity::Composite)
            .ok_or_else(|| GraphSchemaError::unknown_entity(name))
    }

    pub fn concrete_entity(&self, name: &str) -> Result<&ConcreteEntity, GraphSchemaError> {
        self.entities
            .get(name)
            .ok_or_else(|| GraphSchemaError::unknown_entity(name))
    }

    pub fn resolve_relationship<'a>(
        &self,
        entity: &'a ConcreteEntity,
        field: &str,
    ) -> Result<&'a Relationship, GraphSchemaError> {
        entity
            .relationship(field)
            .ok_or_else(|| GraphSchemaError::unknown_field(&entity.name, field))
    }

    pub fn relationship_target(&self, relationship: &Relationship) -> Result<Entity<'_>, GraphSchemaError> {
        self.resolve_entity(&relationship.target)
    }

    pub fn relationship_properties(&self, relationship: &Relationship) -> Option<&RelationshipProperties> {
        relationship
            .properties
            .as_ref()
            .and_then(|name| self.relationship_properties.get(name))
    }

    pub fn constituents(&self, composite: &CompositeEntity) -> Result<Vec<&ConcreteEntity>, GraphSchemaError> {
        composite
            .constituents
            .iter()
            .map(|name| self.concrete_entity(name))
            .collect()
    }

    /// Every concrete entity a (possibly composite) entity stands for
    pub fn concrete_members<'a>(&'a self, entity: Entity<'a>) -> Result<Vec<&'a ConcreteEntity>, GraphSchemaError> {
        match entity {
            Entity::Concrete(concrete) => Ok(vec![concrete]),
            Entity::Composite(composite) => self.constituents(composite),
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &ConcreteEntity> {
        self.entities.values()
    }

    pub fn composites(&self) -> impl Iterator<Item = &CompositeEntity> {
        self.composites.values()
    }
}
