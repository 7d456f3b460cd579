//! memento-core: Shared types and error handling for the Memento
//! knowledge graph.
//!
//! This crate provides the foundational types used across the store:
//! - Graph types (Entity, Relationship, Property) and their lookup handles
//! - Context store and schema introspection records
//! - The common error taxonomy

pub mod error;
pub mod types;

pub use error::{MementoError, Result};
pub use types::{
    ColumnInfo, ConnectedEntity, ConstraintInfo, ContextEntry, Direction, Entity, EntityHit,
    EntityRef, EntityRelationship, Property, PropertyOwner, Relationship, RelationshipFilter,
    TableInfo, TableSchema, ValueType,
};
