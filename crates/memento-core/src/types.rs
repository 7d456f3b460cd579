//! Core domain types for the Memento property graph.
//!
//! The graph is made of entities (typed, named nodes), directed typed
//! relationships between them, and typed key/value properties owned by
//! exactly one entity or relationship. A flat category/key/value context
//! store sits alongside the graph structure.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MementoError;

// ── Entities ─────────────────────────────────────────────────────

/// A graph node with a free-form type and name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Lookup handle for a single entity: by id, or by (type, name).
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRef {
    Id(i64),
    TypeName { entity_type: String, name: String },
}

impl EntityRef {
    /// Validate the optional-argument form used at the tool boundary.
    ///
    /// Exactly one lookup mode must be satisfiable: an id, or both a type
    /// and a name. An id wins when both forms are supplied.
    pub fn from_parts(
        id: Option<i64>,
        entity_type: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, MementoError> {
        match (id, entity_type, name) {
            (Some(id), _, _) => Ok(Self::Id(id)),
            (None, Some(t), Some(n)) => Ok(Self::TypeName {
                entity_type: t.to_string(),
                name: n.to_string(),
            }),
            _ => Err(MementoError::Validation(
                "Must provide either entity_id or both type and name".into(),
            )),
        }
    }
}

// ── Relationships ────────────────────────────────────────────────

/// A directed typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Optional AND-combined filters for relationship listing.
///
/// An empty filter matches all relationships.
#[derive(Debug, Clone, Default)]
pub struct RelationshipFilter {
    pub id: Option<i64>,
    pub source_id: Option<i64>,
    pub target_id: Option<i64>,
    pub rel_type: Option<String>,
}

// ── Properties ───────────────────────────────────────────────────

/// The logical type of a property value.
///
/// Values are stored as text regardless; the type is a hint for round-trip
/// interpretation by callers, not enforced by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    DateTime,
    Json,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Boolean => "BOOLEAN",
            Self::DateTime => "DATETIME",
            Self::Json => "JSON",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = MementoError;

    /// Case-insensitive parse; an unknown name is a validation error,
    /// never silently defaulted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRING" => Ok(Self::String),
            "NUMBER" => Ok(Self::Number),
            "BOOLEAN" => Ok(Self::Boolean),
            "DATETIME" => Ok(Self::DateTime),
            "JSON" => Ok(Self::Json),
            _ => Err(MementoError::Validation(format!("Invalid value_type: {s}"))),
        }
    }
}

/// The single owner of a property: an entity or a relationship, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOwner {
    Entity(i64),
    Relationship(i64),
}

impl PropertyOwner {
    /// Validate the optional-ids form used at the tool boundary.
    pub fn from_ids(
        entity_id: Option<i64>,
        relationship_id: Option<i64>,
    ) -> Result<Self, MementoError> {
        match (entity_id, relationship_id) {
            (Some(id), None) => Ok(Self::Entity(id)),
            (None, Some(id)) => Ok(Self::Relationship(id)),
            (Some(_), Some(_)) => Err(MementoError::Validation(
                "Cannot provide both entity_id and relationship_id".into(),
            )),
            (None, None) => Err(MementoError::Validation(
                "Must provide either entity_id or relationship_id".into(),
            )),
        }
    }

    /// The foreign-key column holding this owner in the properties table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Entity(_) => "entity_id",
            Self::Relationship(_) => "relationship_id",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Entity(id) | Self::Relationship(id) => *id,
        }
    }
}

/// A typed key/value attribute attached to exactly one entity or
/// relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub value_type: ValueType,
    pub entity_id: Option<i64>,
    pub relationship_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

// ── Traversal results ────────────────────────────────────────────

/// A relationship together with both endpoint entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub relationship: Relationship,
    pub source: Entity,
    pub target: Entity,
}

/// Which side of a relationship the queried entity sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outgoing => f.write_str("outgoing"),
            Self::Incoming => f.write_str("incoming"),
        }
    }
}

/// A search result: an entity with its properties aggregated into one
/// JSON object (empty object when it has none).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHit {
    pub entity: Entity,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// A neighbor of an entity, annotated with how it is connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedEntity {
    pub entity: Entity,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub relationship_type: String,
    pub direction: Direction,
}

// ── Context store ────────────────────────────────────────────────

/// A flat, category-scoped key/value setting unrelated to the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub category: String,
    pub key: String,
    pub value: String,
}

// ── Schema introspection ─────────────────────────────────────────

/// A table with its approximate size, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub approx_rows: i64,
    pub total_bytes: i64,
}

/// Column metadata from the information schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub default: Option<String>,
    pub nullable: bool,
}

/// A table constraint; foreign keys carry the referenced table/column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub name: String,
    pub constraint_type: String,
    pub column: Option<String>,
    pub foreign_table: Option<String>,
    pub foreign_column: Option<String>,
}

/// Full schema description of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub constraints: Vec<ConstraintInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_round_trip() {
        for (s, vt) in [
            ("STRING", ValueType::String),
            ("NUMBER", ValueType::Number),
            ("BOOLEAN", ValueType::Boolean),
            ("DATETIME", ValueType::DateTime),
            ("JSON", ValueType::Json),
        ] {
            assert_eq!(s.parse::<ValueType>().unwrap(), vt);
            assert_eq!(vt.as_str(), s);
        }
    }

    #[test]
    fn test_value_type_case_insensitive() {
        assert_eq!("string".parse::<ValueType>().unwrap(), ValueType::String);
        assert_eq!("DateTime".parse::<ValueType>().unwrap(), ValueType::DateTime);
    }

    #[test]
    fn test_value_type_invalid() {
        let err = "FLOAT".parse::<ValueType>().unwrap_err();
        assert!(matches!(err, MementoError::Validation(_)));
    }

    #[test]
    fn test_property_owner_xor() {
        assert_eq!(
            PropertyOwner::from_ids(Some(1), None).unwrap(),
            PropertyOwner::Entity(1)
        );
        assert_eq!(
            PropertyOwner::from_ids(None, Some(2)).unwrap(),
            PropertyOwner::Relationship(2)
        );
        assert!(PropertyOwner::from_ids(Some(1), Some(2)).is_err());
        assert!(PropertyOwner::from_ids(None, None).is_err());
    }

    #[test]
    fn test_entity_ref_from_parts() {
        assert_eq!(
            EntityRef::from_parts(Some(7), None, None).unwrap(),
            EntityRef::Id(7)
        );
        assert!(matches!(
            EntityRef::from_parts(None, Some("person"), Some("Alice")).unwrap(),
            EntityRef::TypeName { .. }
        ));
        assert!(EntityRef::from_parts(None, Some("person"), None).is_err());
        assert!(EntityRef::from_parts(None, None, None).is_err());
    }

    #[test]
    fn test_value_type_serde_names() {
        let json = serde_json::to_string(&ValueType::DateTime).unwrap();
        assert_eq!(json, "\"DATETIME\"");
        let back: ValueType = serde_json::from_str("\"JSON\"").unwrap();
        assert_eq!(back, ValueType::Json);
    }
}
