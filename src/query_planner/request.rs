//! Request-side input: the already-parsed field selection tree, its
//! arguments and the authenticated principal.
//!
//! ```json
//! {
//!   "operation": "read",
//!   "entity": "Movie",
//!   "args": { "where": { "title_STARTS_WITH": "The" }, "limit": 10 },
//!   "selection": [
//!     { "name": "title" },
//!     { "name": "actors", "args": { "sort": [{ "name": "ASC" }] },
//!       "selection": [{ "name": "name" }] }
//!   ]
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Connection,
    Aggregate,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub operation: OperationKind,
    pub entity: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub selection: Vec<FieldSelection>,
    /// Per-type selections for composite entities
    #[serde(default, rename = "on")]
    pub on_types: IndexMap<String, Vec<FieldSelection>>,
}

impl QueryRequest {
    pub fn new(operation: OperationKind, entity: impl Into<String>) -> Self {
        QueryRequest {
            operation,
            entity: entity.into(),
            args: Map::new(),
            selection: Vec::new(),
            on_types: IndexMap::new(),
        }
    }

    pub fn read(entity: impl Into<String>) -> Self {
        Self::new(OperationKind::Read, entity)
    }

    pub fn connection(entity: impl Into<String>) -> Self {
        Self::new(OperationKind::Connection, entity)
    }

    pub fn aggregate(entity: impl Into<String>) -> Self {
        Self::new(OperationKind::Aggregate, entity)
    }

    pub fn arg(mut self, name: &str, value: Value) -> Self {
        self.args.insert(name.to_string(), value);
        self
    }

    pub fn select(mut self, fields: Vec<FieldSelection>) -> Self {
        self.selection.extend(fields);
        self
    }

    pub fn on(mut self, type_name: &str, fields: Vec<FieldSelection>) -> Self {
        self.on_types.insert(type_name.to_string(), fields);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub selection: Vec<FieldSelection>,
    #[serde(default, rename = "on")]
    pub on_types: IndexMap<String, Vec<FieldSelection>>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        FieldSelection {
            name: name.into(),
            alias: None,
            args: Map::new(),
            selection: Vec::new(),
            on_types: IndexMap::new(),
        }
    }

    /// A list of leaf selections
    pub fn leaves(names: &[&str]) -> Vec<FieldSelection> {
        names.iter().map(|name| FieldSelection::new(*name)).collect()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: &str, value: Value) -> Self {
        self.args.insert(name.to_string(), value);
        self
    }

    pub fn select(mut self, fields: Vec<FieldSelection>) -> Self {
        self.selection.extend(fields);
        self
    }

    pub fn on(mut self, type_name: &str, fields: Vec<FieldSelection>) -> Self {
        self.on_types.insert(type_name.to_string(), fields);
        self
    }

    /// Key of this field in the response map
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn child(&self, name: &str) -> Option<&FieldSelection> {
        self.selection.iter().find(|f| f.name == name)
    }
}

/// Authenticated principal of one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Principal::default()
    }

    pub fn authenticated(claims: Map<String, Value>) -> Self {
        Principal {
            authenticated: true,
            claims,
        }
    }

    /// Claim at a dotted path (`org.id`), if present and not null
    pub fn claim(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.claims.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: QueryRequest = serde_json::from_value(json!({
            "operation": "read",
            "entity": "Search",
            "selection": [{ "name": "__typename" }],
            "on": { "Movie": [{ "name": "title", "alias": "t" }] }
        }))
        .unwrap();
        assert_eq!(request.operation, OperationKind::Read);
        assert!(request.args.is_empty());
        assert_eq!(request.on_types["Movie"][0].response_key(), "t");
    }

    #[test]
    fn test_claim_paths() {
        let principal = Principal::authenticated(
            json!({ "sub": "u1", "org": { "id": 7 }, "gone": null })
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(principal.claim("sub"), Some(&json!("u1")));
        assert_eq!(principal.claim("org.id"), Some(&json!(7)));
        assert_eq!(principal.claim("org.name"), None);
        assert_eq!(principal.claim("gone"), None);
        assert_eq!(Principal::anonymous().claim("sub"), None);
    }
}
