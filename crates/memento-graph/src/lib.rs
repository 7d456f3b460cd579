//! PostgreSQL-backed knowledge graph store.
//!
//! [`GraphStore`] owns a single connection and exposes the graph
//! repository: entities, relationships, typed properties, a categorized
//! context store, and schema bootstrap/introspection. Every operation runs
//! through one executor ([`GraphStore::execute`]) that wraps each
//! statement in its own transaction, enforces optional read-only mode,
//! applies a per-statement timeout, and transparently reconnects when the
//! backend drops the connection.

pub mod client;
mod context;
pub mod executor;
mod mutations;
mod queries;
mod records;
mod schema;
pub mod sql;

pub use client::{GraphStore, PgConfig};
pub use executor::{QueryOutcome, Record, SqlParams};

pub use memento_core::{
    ColumnInfo, ConnectedEntity, ConstraintInfo, ContextEntry, Direction, Entity, EntityHit,
    EntityRef, EntityRelationship, MementoError, Property, PropertyOwner, Relationship,
    RelationshipFilter, Result, TableInfo, TableSchema, ValueType,
};
