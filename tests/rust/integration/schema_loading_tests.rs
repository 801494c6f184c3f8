//! Loading schema definitions from disk and rejecting inconsistent ones

use std::io::Write;

use graphcypher::graph_catalog::{CompositeKind, Entity, GraphSchemaConfig, GraphSchemaError};
use tempfile::NamedTempFile;

use super::library_schema;

fn write_schema(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(yaml.as_bytes()).expect("write schema");
    file
}

#[test]
fn test_library_schema_loads() {
    let schema = library_schema();

    let book = schema.concrete_entity("Book").unwrap();
    assert_eq!(book.main_label(), "Book");
    assert_eq!(book.attribute("subtitle").unwrap().database_name(), "sub_title");
    assert!(book.relationship("authors").is_some());

    match schema.resolve_entity("Publication").unwrap() {
        Entity::Composite(publication) => {
            assert_eq!(publication.kind, CompositeKind::Interface);
            let members: Vec<_> = schema
                .constituents(publication)
                .unwrap()
                .into_iter()
                .map(|entity| entity.name.as_str())
                .collect();
            assert_eq!(members, vec!["Book", "Magazine"]);
        }
        Entity::Concrete(_) => panic!("Publication should be an interface"),
    }
    assert!(matches!(schema.resolve_entity("Shelf").unwrap(), Entity::Composite(_)));
}

#[test]
fn test_schema_from_temp_file() {
    let file = write_schema(
        r#"
entities:
  Tag:
    attributes:
      label: { type: String, nullable: false }
"#,
    );
    let schema = GraphSchemaConfig::from_yaml_file(file.path())
        .and_then(|config| config.build())
        .unwrap();
    assert!(schema.concrete_entity("Tag").is_ok());
    assert!(schema.resolve_entity("Label").is_err());
}

#[test]
fn test_missing_schema_file() {
    let result = GraphSchemaConfig::from_yaml_file("/nonexistent/schema.yaml");
    assert!(matches!(result, Err(GraphSchemaError::ConfigReadError { .. })));
}

#[test]
fn test_undeclared_relationship_target_rejected() {
    let file = write_schema(
        r#"
entities:
  Book:
    attributes:
      title: { type: String }
    relationships:
      publisher: { type: PUBLISHED_BY, target: Publisher }
"#,
    );
    let config = GraphSchemaConfig::from_yaml_file(file.path()).unwrap();
    match config.build() {
        Err(GraphSchemaError::InvalidConfig { message }) => {
            assert!(message.contains("Book.publisher"));
            assert!(message.contains("`Publisher` is not declared"));
        }
        other => panic!("expected an invalid config error, got {:?}", other),
    }
}

#[test]
fn test_interface_attribute_must_exist_on_implementations() {
    let yaml = r#"
entities:
  Book:
    attributes:
      title: { type: String }
  Magazine:
    attributes:
      name: { type: String }
interfaces:
  Publication:
    implementations: [Book, Magazine]
    attributes:
      title: { type: String }
"#;
    let error = GraphSchemaConfig::from_yaml_str(yaml)
        .and_then(|config| config.build())
        .unwrap_err();
    assert!(error.to_string().contains("Magazine"));
}

#[test]
fn test_malformed_yaml_is_a_parse_error() {
    let result = GraphSchemaConfig::from_yaml_str("entities: [not, a, map");
    assert!(matches!(result, Err(GraphSchemaError::ConfigParseError { .. })));
}
