/// Schema definition loading.
///
/// This module maps a YAML (or JSON) schema definition onto the schema model.
/// It supports:
///
/// - Loading from YAML files and strings
/// - Structural validation (targets exist, composites are well formed)
/// - Building the immutable [`GraphSchema`]
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Schema definitions are written in YAML with the following structure:
///
/// ```yaml
/// enums: [Genre]
/// entities:
///   Movie:
///     labels: [Movie]               # defaults to [<name>]
///     attributes:
///       title: { type: String, unique: true, nullable: false }
///       tagline: { type: String, alias: tag_line }
///     relationships:
///       actors:
///         type: ACTED_IN             # physical relationship type
///         direction: IN              # OUT (default) | IN | EITHER
///         target: Actor
///         properties: ActedIn
///     limit: { default: 10, max: 100 }
/// relationshipProperties:
///   ActedIn:
///     attributes:
///       screenTime: { type: Int }
/// interfaces:
///   Production:
///     implementations: [Movie, Series]
///     attributes:
///       title: { type: String }
/// unions:
///   Search:
///     members: [Movie, Series]
/// ```
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::authorization::AuthorizationRule;
use super::errors::GraphSchemaError;
use super::graph_schema::{
    Attribute, CompositeEntity, CompositeKind, ComputedField, ConcreteEntity, Direction,
    GraphSchema, LimitPolicy, NestedOperation, Relationship, RelationshipProperties,
};
use super::schema_types::ScalarKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSchemaConfig {
    #[serde(default)]
    pub enums: Vec<String>,
    #[serde(default)]
    pub entities: IndexMap<String, EntityDefinition>,
    #[serde(default)]
    pub relationship_properties: IndexMap<String, RelationshipPropertiesDefinition>,
    #[serde(default)]
    pub interfaces: IndexMap<String, InterfaceDefinition>,
    #[serde(default)]
    pub unions: IndexMap<String, UnionDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDefinition {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeDefinition>,
    #[serde(default)]
    pub relationships: IndexMap<String, RelationshipDefinition>,
    #[serde(default)]
    pub authorization: Vec<AuthorizationRule>,
    #[serde(default)]
    pub limit: Option<LimitPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Scalar type name; `[T]` declares a list
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub list: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub computed: Option<ComputedField>,
    #[serde(default)]
    pub authorization: Vec<AuthorizationRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDefinition {
    #[serde(rename = "type")]
    pub graph_type: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    pub target: String,
    #[serde(default = "default_true")]
    pub list: bool,
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub nested_operations: Option<BTreeSet<NestedOperation>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipPropertiesDefinition {
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceDefinition {
    pub implementations: Vec<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeDefinition>,
    #[serde(default)]
    pub relationships: IndexMap<String, RelationshipDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnionDefinition {
    pub members: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_direction() -> Direction {
    Direction::Out
}

impl GraphSchemaConfig {
    /// Load a schema definition from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, GraphSchemaError> {
        let contents = fs::read_to_string(path).map_err(|e| GraphSchemaError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse a schema definition from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, GraphSchemaError> {
        serde_yaml::from_str(yaml).map_err(|e| GraphSchemaError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Structural validation of the definition
    pub fn validate(&self) -> Result<(), GraphSchemaError> {
        if self.entities.is_empty() {
            return Err(GraphSchemaError::InvalidConfig {
                message: "Schema must contain at least one entity definition".to_string(),
            });
        }

        // Entity, composite and relationship-properties names share one namespace
        let mut seen = HashSet::new();
        let all_names = self
            .entities
            .keys()
            .chain(self.interfaces.keys())
            .chain(self.unions.keys())
            .chain(self.relationship_properties.keys());
        for name in all_names {
            if !seen.insert(name.as_str()) {
                return Err(GraphSchemaError::config_error_with_context(
                    name,
                    "type name declared more than once",
                ));
            }
        }

        for (entity_name, entity) in &self.entities {
            for (rel_name, rel) in &entity.relationships {
                self.validate_relationship(&format!("{}.{}", entity_name, rel_name), rel)?;
            }
            for (attr_name, attr) in &entity.attributes {
                if attr.computed.is_some() && attr.alias.is_some() {
                    return Err(GraphSchemaError::config_error_with_context(
                        format!("{}.{}", entity_name, attr_name),
                        "computed attributes cannot declare a database alias",
                    ));
                }
            }
        }

        for (name, interface) in &self.interfaces {
            self.validate_constituents(name, &interface.implementations)?;
            for implementation in &interface.implementations {
                let entity = &self.entities[implementation.as_str()];
                for (attr_name, attr) in &interface.attributes {
                    let Some(own) = entity.attributes.get(attr_name) else {
                        return Err(GraphSchemaError::config_error_with_context(
                            format!("{}.{}", name, attr_name),
                            format!("implementation `{}` does not declare this attribute", implementation),
                        ));
                    };
                    if own.type_name != attr.type_name || own.list != attr.list {
                        return Err(GraphSchemaError::config_error_with_context(
                            format!("{}.{}", name, attr_name),
                            format!("implementation `{}` declares an incompatible type", implementation),
                        ));
                    }
                }
                for rel_name in interface.relationships.keys() {
                    if !entity.relationships.contains_key(rel_name) {
                        return Err(GraphSchemaError::config_error_with_context(
                            format!("{}.{}", name, rel_name),
                            format!("implementation `{}` does not declare this relationship", implementation),
                        ));
                    }
                }
            }
            for (rel_name, rel) in &interface.relationships {
                self.validate_relationship(&format!("{}.{}", name, rel_name), rel)?;
            }
        }

        for (name, union) in &self.unions {
            self.validate_constituents(name, &union.members)?;
        }

        Ok(())
    }

    fn validate_relationship(&self, location: &str, rel: &RelationshipDefinition) -> Result<(), GraphSchemaError> {
        let target = rel.target.as_str();
        if !self.entities.contains_key(target)
            && !self.interfaces.contains_key(target)
            && !self.unions.contains_key(target)
        {
            return Err(GraphSchemaError::config_error_with_context(
                location,
                format!("relationship target `{}` is not declared", target),
            ));
        }
        if let Some(properties) = &rel.properties {
            if !self.relationship_properties.contains_key(properties) {
                return Err(GraphSchemaError::config_error_with_context(
                    location,
                    format!("relationship properties `{}` are not declared", properties),
                ));
            }
        }
        if rel.graph_type.trim().is_empty() {
            return Err(GraphSchemaError::config_error_with_context(
                location,
                "relationship type cannot be empty",
            ));
        }
        Ok(())
    }

    fn validate_constituents(&self, name: &str, members: &[String]) -> Result<(), GraphSchemaError> {
        if members.is_empty() {
            return Err(GraphSchemaError::config_error_with_context(
                name,
                "composite type must have at least one constituent",
            ));
        }
        for member in members {
            if !self.entities.contains_key(member) {
                return Err(GraphSchemaError::config_error_with_context(
                    name,
                    format!("constituent `{}` is not a declared entity", member),
                ));
            }
        }
        Ok(())
    }

    /// Validate and build the immutable schema model
    pub fn build(&self) -> Result<GraphSchema, GraphSchemaError> {
        self.validate()?;

        let enums = &self.enums;
        let entities = self
            .entities
            .iter()
            .map(|(name, def)| {
                let labels = if def.labels.is_empty() {
                    vec![name.clone()]
                } else {
                    def.labels.clone()
                };
                let entity = ConcreteEntity {
                    name: name.clone(),
                    labels,
                    attributes: build_attributes(&def.attributes, enums),
                    relationships: build_relationships(&def.relationships),
                    authorization: def.authorization.clone(),
                    limit: def.limit,
                };
                (name.clone(), entity)
            })
            .collect::<IndexMap<_, _>>();

        let mut composites = IndexMap::new();
        for (name, def) in &self.interfaces {
            composites.insert(
                name.clone(),
                CompositeEntity {
                    name: name.clone(),
                    kind: CompositeKind::Interface,
                    constituents: def.implementations.clone(),
                    shared_attributes: build_attributes(&def.attributes, enums),
                    relationships: build_relationships(&def.relationships),
                },
            );
        }
        for (name, def) in &self.unions {
            composites.insert(
                name.clone(),
                CompositeEntity {
                    name: name.clone(),
                    kind: CompositeKind::Union,
                    constituents: def.members.clone(),
                    shared_attributes: IndexMap::new(),
                    relationships: IndexMap::new(),
                },
            );
        }

        let relationship_properties = self
            .relationship_properties
            .iter()
            .map(|(name, def)| {
                (
                    name.clone(),
                    RelationshipProperties {
                        name: name.clone(),
                        attributes: build_attributes(&def.attributes, enums),
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        log::debug!(
            "Built schema model: {} entities, {} composites, {} relationship property types",
            entities.len(),
            composites.len(),
            relationship_properties.len()
        );

        Ok(GraphSchema::new(entities, composites, relationship_properties))
    }
}

fn build_attributes(defs: &IndexMap<String, AttributeDefinition>, enums: &[String]) -> IndexMap<String, Attribute> {
    defs.iter()
        .map(|(name, def)| {
            let (type_name, bracketed) = match def
                .type_name
                .trim()
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
            {
                Some(inner) => (inner, true),
                None => (def.type_name.trim(), false),
            };
            let attribute = Attribute {
                name: name.clone(),
                database_alias: def.alias.clone(),
                kind: ScalarKind::parse(type_name, enums),
                is_list: def.list || bracketed,
                nullable: def.nullable,
                is_unique: def.unique,
                computed: def.computed.clone(),
                authorization: def.authorization.clone(),
            };
            (name.clone(), attribute)
        })
        .collect()
}

fn build_relationships(defs: &IndexMap<String, RelationshipDefinition>) -> IndexMap<String, Relationship> {
    defs.iter()
        .map(|(name, def)| {
            let relationship = Relationship {
                name: name.clone(),
                graph_type: def.graph_type.clone(),
                direction: def.direction,
                target: def.target.clone(),
                is_list: def.list,
                properties: def.properties.clone(),
                nested_operations: def
                    .nested_operations
                    .clone()
                    .unwrap_or_else(|| NestedOperation::ALL.into_iter().collect()),
            };
            (name.clone(), relationship)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::graph_schema::Entity;
    use crate::graph_catalog::testing::MOVIE_SCHEMA_YAML;

    #[test]
    fn test_build_fixture_schema() {
        let schema = GraphSchemaConfig::from_yaml_str(MOVIE_SCHEMA_YAML)
            .unwrap()
            .build()
            .unwrap();
        let movie = schema.concrete_entity("Movie").unwrap();
        // declaration order is preserved
        let names: Vec<&str> = movie.attributes.keys().map(String::as_str).collect();
        assert_eq!(&names[..3], &["id", "title", "tagline"]);
        assert_eq!(movie.labels, vec!["Movie".to_string()]);
        let Entity::Composite(production) = schema.resolve_entity("Production").unwrap() else {
            panic!("Production should be composite");
        };
        assert_eq!(production.constituents, vec!["Movie", "Series"]);
        assert!(production.shared_attributes.contains_key("title"));
    }

    #[test]
    fn test_list_type_notation() {
        let yaml = r#"
entities:
  Movie:
    attributes:
      tags: { type: "[String]" }
"#;
        let schema = GraphSchemaConfig::from_yaml_str(yaml).unwrap().build().unwrap();
        let tags = schema.concrete_entity("Movie").unwrap().attribute("tags").unwrap();
        assert!(tags.is_list);
        assert_eq!(tags.kind, ScalarKind::String);
    }

    #[test]
    fn test_unknown_relationship_target() {
        let yaml = r#"
entities:
  Movie:
    relationships:
      actors: { type: ACTED_IN, target: Person }
"#;
        let err = GraphSchemaConfig::from_yaml_str(yaml).unwrap().build().unwrap_err();
        assert!(matches!(err, GraphSchemaError::InvalidConfig { .. }));
        assert!(err.to_string().contains("Person"));
    }

    #[test]
    fn test_interface_attribute_must_exist_on_implementations() {
        let yaml = r#"
entities:
  Movie:
    attributes:
      title: { type: String }
  Series:
    attributes:
      name: { type: String }
interfaces:
  Production:
    implementations: [Movie, Series]
    attributes:
      title: { type: String }
"#;
        let err = GraphSchemaConfig::from_yaml_str(yaml).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("Series"));
    }

    #[test]
    fn test_empty_union_rejected() {
        let yaml = r#"
entities:
  Movie: {}
unions:
  Search:
    members: []
"#;
        let err = GraphSchemaConfig::from_yaml_str(yaml).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("at least one constituent"));
    }

    #[test]
    fn test_duplicate_type_names_rejected() {
        let yaml = r#"
entities:
  Movie: {}
unions:
  Movie:
    members: [Movie]
"#;
        assert!(GraphSchemaConfig::from_yaml_str(yaml).unwrap().build().is_err());
    }
}
