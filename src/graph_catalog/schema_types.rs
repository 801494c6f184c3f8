//! Scalar type system for entity attributes
//!
//! Every attribute in the schema model carries a [`ScalarKind`]. The kind decides
//! which filter operators and aggregation functions are legal for the attribute,
//! and how literal parameters are wrapped when they reach the generated Cypher.
//!
//! # Supported Kinds
//!
//! - `String`, `ID` - text (ID values are compared as strings)
//! - `Int`, `BigInt`, `Float` - numbers
//! - `Boolean`
//! - `DateTime`, `LocalDateTime`, `Date`, `Time`, `LocalTime`, `Duration` - temporal family
//! - `Point`, `CartesianPoint` - spatial family
//! - any other name - an enum or a custom scalar, declared in the schema
//!
//! # Example
//!
//! ```yaml
//! attributes:
//!   released:
//!     type: DateTime
//!   location:
//!     type: Point
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Scalar kind of an entity attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Id,
    Int,
    BigInt,
    Float,
    Boolean,
    DateTime,
    LocalDateTime,
    Date,
    Time,
    LocalTime,
    Duration,
    Point,
    CartesianPoint,
    /// Enum declared in the schema definition (values compared as strings)
    Enum(String),
    /// Custom scalar, treated as opaque
    Custom(String),
}

impl ScalarKind {
    /// Parse a type name from the schema definition
    ///
    /// Names are case-sensitive for the built-in kinds (`String`, `Int`, ...).
    /// A few lowercase aliases are accepted for convenience. Names listed in
    /// `enums` become [`ScalarKind::Enum`]; anything else is [`ScalarKind::Custom`].
    ///
    /// ```ignore
    /// assert_eq!(ScalarKind::parse("Int", &[]), ScalarKind::Int);
    /// assert_eq!(ScalarKind::parse("Genre", &["Genre".into()]), ScalarKind::Enum("Genre".into()));
    /// ```
    pub fn parse(name: &str, enums: &[String]) -> Self {
        match name.trim() {
            "String" | "string" | "text" => ScalarKind::String,
            "ID" | "Id" | "id" => ScalarKind::Id,
            "Int" | "int" | "integer" => ScalarKind::Int,
            "BigInt" | "bigint" | "long" => ScalarKind::BigInt,
            "Float" | "float" | "double" => ScalarKind::Float,
            "Boolean" | "boolean" | "bool" => ScalarKind::Boolean,
            "DateTime" | "datetime" => ScalarKind::DateTime,
            "LocalDateTime" => ScalarKind::LocalDateTime,
            "Date" | "date" => ScalarKind::Date,
            "Time" => ScalarKind::Time,
            "LocalTime" => ScalarKind::LocalTime,
            "Duration" => ScalarKind::Duration,
            "Point" => ScalarKind::Point,
            "CartesianPoint" => ScalarKind::CartesianPoint,
            other if enums.iter().any(|e| e == other) => ScalarKind::Enum(other.to_string()),
            other => ScalarKind::Custom(other.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarKind::Int | ScalarKind::BigInt | ScalarKind::Float
        )
    }

    /// Kinds whose values are matched with string operators (CONTAINS, STARTS WITH, ...)
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ScalarKind::String | ScalarKind::Id | ScalarKind::Enum(_)
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ScalarKind::DateTime
                | ScalarKind::LocalDateTime
                | ScalarKind::Date
                | ScalarKind::Time
                | ScalarKind::LocalTime
                | ScalarKind::Duration
        )
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self, ScalarKind::Point | ScalarKind::CartesianPoint)
    }

    /// Kinds with a total order usable by `gt`/`lt` comparisons and `min`/`max`.
    pub fn is_ordered(&self) -> bool {
        self.is_numeric()
            || self.is_temporal()
            || matches!(self, ScalarKind::String | ScalarKind::Id)
    }

    /// Cypher constructor function that must wrap a parameter of this kind.
    ///
    /// Drivers send temporal and spatial values as strings or maps, so the
    /// generated query converts them back before comparing.
    pub fn cypher_constructor(&self) -> Option<&'static str> {
        match self {
            ScalarKind::DateTime => Some("datetime"),
            ScalarKind::LocalDateTime => Some("localdatetime"),
            ScalarKind::Date => Some("date"),
            ScalarKind::Time => Some("time"),
            ScalarKind::LocalTime => Some("localtime"),
            ScalarKind::Duration => Some("duration"),
            ScalarKind::Point | ScalarKind::CartesianPoint => Some("point"),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ScalarKind::String => "String",
            ScalarKind::Id => "ID",
            ScalarKind::Int => "Int",
            ScalarKind::BigInt => "BigInt",
            ScalarKind::Float => "Float",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::DateTime => "DateTime",
            ScalarKind::LocalDateTime => "LocalDateTime",
            ScalarKind::Date => "Date",
            ScalarKind::Time => "Time",
            ScalarKind::LocalTime => "LocalTime",
            ScalarKind::Duration => "Duration",
            ScalarKind::Point => "Point",
            ScalarKind::CartesianPoint => "CartesianPoint",
            ScalarKind::Enum(name) | ScalarKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ScalarKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Deserializes without enum knowledge; `GraphSchemaConfig::build` re-parses
/// custom names against the declared enums.
impl<'de> Deserialize<'de> for ScalarKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(ScalarKind::parse(&name, &[]))
    }
}
