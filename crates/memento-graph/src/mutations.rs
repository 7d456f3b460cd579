//! Write operations for the knowledge graph.
//!
//! Each operation is one or more parameterized statements through the
//! executor and inherits its per-call transaction behavior. Cascading
//! deletes are carried by the schema's ON DELETE CASCADE foreign keys, so
//! every delete here is a single statement.

use anyhow::anyhow;
use serde_json::Value;

use memento_core::{
    Entity, MementoError, Property, PropertyOwner, Relationship, Result, ValueType,
};

use crate::client::GraphStore;
use crate::records::{
    entity_from_record, infer_value_type, property_from_record, relationship_from_record,
    stringify_value,
};
use crate::sql::FilterBuilder;

const PROPERTY_COLUMNS: &str =
    "id, entity_id, relationship_id, key, value, value_type, created_at, last_updated";

impl GraphStore {
    // ── Entities ─────────────────────────────────────────────────

    /// Add a new entity. Both type and name are required non-empty.
    pub async fn add_entity(&mut self, entity_type: &str, name: &str) -> Result<Entity> {
        if entity_type.trim().is_empty() {
            return Err(MementoError::Validation("Entity type cannot be empty".into()));
        }
        if name.trim().is_empty() {
            return Err(MementoError::Validation("Entity name cannot be empty".into()));
        }

        let rec = self
            .query_one(
                "INSERT INTO entities (type, name)
                 VALUES ($1, $2)
                 RETURNING id, type, name, created_at, last_updated",
                &[&entity_type, &name],
            )
            .await
            .map_err(|e| e.context("failed to add entity"))?
            .ok_or_else(|| MementoError::Unexpected(anyhow!("entity insert returned no row")))?;
        entity_from_record(&rec)
    }

    /// Update an entity's type and/or name, bumping `last_updated`.
    /// Returns `None` if the id does not resolve.
    pub async fn update_entity(
        &mut self,
        entity_id: i64,
        entity_type: Option<&str>,
        name: Option<&str>,
    ) -> Result<Option<Entity>> {
        if entity_type.is_none() && name.is_none() {
            return Err(MementoError::Validation(
                "At least one of type or name must be provided".into(),
            ));
        }

        let mut set = FilterBuilder::new();
        if let Some(t) = entity_type {
            if t.trim().is_empty() {
                return Err(MementoError::Validation("Entity type cannot be empty".into()));
            }
            set.eq("type", t.to_string());
        }
        if let Some(n) = name {
            if n.trim().is_empty() {
                return Err(MementoError::Validation("Entity name cannot be empty".into()));
            }
            set.eq("name", n.to_string());
        }
        set.clause("last_updated = CURRENT_TIMESTAMP");
        let id_param = set.bind(entity_id);

        let sql = format!(
            "UPDATE entities
             SET {}
             WHERE id = {id_param}
             RETURNING id, type, name, created_at, last_updated",
            set.set_clause()
        );
        let rec = self
            .query_one(&sql, &set.params())
            .await
            .map_err(|e| e.context("failed to update entity"))?;
        rec.map(|r| entity_from_record(&r)).transpose()
    }

    /// Delete an entity. The schema cascade removes its properties, its
    /// relationships in either direction, and those relationships'
    /// properties. Returns whether an entity was found and deleted.
    pub async fn delete_entity(&mut self, entity_id: i64) -> Result<bool> {
        let n = self
            .run("DELETE FROM entities WHERE id = $1", &[&entity_id])
            .await
            .map_err(|e| e.context("failed to delete entity"))?;
        Ok(n > 0)
    }

    // ── Properties ───────────────────────────────────────────────

    /// Attach a property to its owner. The value is stored as text
    /// verbatim; `value_type` is a round-trip hint for callers.
    pub async fn add_property(
        &mut self,
        key: &str,
        value: &str,
        value_type: ValueType,
        owner: PropertyOwner,
    ) -> Result<Property> {
        if key.trim().is_empty() {
            return Err(MementoError::Validation("Property key cannot be empty".into()));
        }

        let (entity_id, relationship_id) = owner_ids(owner);
        let vt = value_type.as_str();
        let sql = format!(
            "INSERT INTO properties (entity_id, relationship_id, key, value, value_type)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {PROPERTY_COLUMNS}"
        );
        let rec = self
            .query_one(&sql, &[&entity_id, &relationship_id, &key, &value, &vt])
            .await
            .map_err(|e| e.context("failed to add property"))?
            .ok_or_else(|| MementoError::Unexpected(anyhow!("property insert returned no row")))?;
        property_from_record(&rec)
    }

    /// Update a property's value and/or value type, bumping
    /// `last_updated`. Returns `None` if the id does not resolve.
    pub async fn update_property(
        &mut self,
        property_id: i64,
        value: Option<&str>,
        value_type: Option<ValueType>,
    ) -> Result<Option<Property>> {
        if value.is_none() && value_type.is_none() {
            return Err(MementoError::Validation(
                "Must provide either value or value_type".into(),
            ));
        }

        let mut set = FilterBuilder::new();
        if let Some(v) = value {
            set.eq("value", v.to_string());
        }
        if let Some(vt) = value_type {
            set.eq("value_type", vt.as_str().to_string());
        }
        set.clause("last_updated = CURRENT_TIMESTAMP");
        let id_param = set.bind(property_id);

        let sql = format!(
            "UPDATE properties
             SET {}
             WHERE id = {id_param}
             RETURNING {PROPERTY_COLUMNS}",
            set.set_clause()
        );
        let rec = self
            .query_one(&sql, &set.params())
            .await
            .map_err(|e| e.context("failed to update property"))?;
        rec.map(|r| property_from_record(&r)).transpose()
    }

    /// Upsert-by-key: for each entry, update the owner's property with
    /// that key if it exists, else insert it. Idempotent in effect:
    /// applying the same map twice yields one property per key.
    ///
    /// The owner must exist. Keys are applied in map order as independent
    /// executor calls; there is no whole-map atomicity (a mid-map failure
    /// leaves earlier keys applied, which re-running repairs).
    pub async fn update_properties(
        &mut self,
        owner: PropertyOwner,
        properties: &serde_json::Map<String, Value>,
    ) -> Result<Vec<Property>> {
        if properties.is_empty() {
            return Err(MementoError::Validation(
                "No properties provided for update".into(),
            ));
        }
        self.assert_owner_exists(owner).await?;

        let update_sql = format!(
            "UPDATE properties
             SET value = $1, value_type = $2, last_updated = CURRENT_TIMESTAMP
             WHERE {} = $3 AND key = $4
             RETURNING {PROPERTY_COLUMNS}",
            owner.column()
        );
        let insert_sql = format!(
            "INSERT INTO properties ({}, key, value, value_type)
             VALUES ($1, $2, $3, $4)
             RETURNING {PROPERTY_COLUMNS}",
            owner.column()
        );

        let mut updated = Vec::with_capacity(properties.len());
        for (key, value) in properties {
            let text = stringify_value(value);
            // The type hint tracks the incoming value on update as well,
            // so a reshaped value never keeps a stale hint.
            let vt = infer_value_type(value).as_str();
            let owner_id = owner.id();
            let rec = self
                .query_one(&update_sql, &[&text, &vt, &owner_id, key])
                .await
                .map_err(|e| e.context("failed to update properties"))?;
            match rec {
                Some(r) => updated.push(property_from_record(&r)?),
                None => {
                    let r = self
                        .query_one(&insert_sql, &[&owner_id, key, &text, &vt])
                        .await
                        .map_err(|e| e.context("failed to update properties"))?
                        .ok_or_else(|| {
                            MementoError::Unexpected(anyhow!("property insert returned no row"))
                        })?;
                    updated.push(property_from_record(&r)?);
                }
            }
        }
        Ok(updated)
    }

    /// Delete one property by id. Returns whether it was found.
    pub async fn delete_property(&mut self, property_id: i64) -> Result<bool> {
        let n = self
            .run("DELETE FROM properties WHERE id = $1", &[&property_id])
            .await
            .map_err(|e| e.context("failed to delete property"))?;
        Ok(n > 0)
    }

    /// Delete an owner's properties, optionally restricted to a key set.
    /// Returns the removed rows so callers can log what went away.
    pub async fn delete_properties(
        &mut self,
        owner: PropertyOwner,
        keys: Option<&[String]>,
    ) -> Result<Vec<Property>> {
        let mut f = FilterBuilder::new();
        f.eq(owner.column(), owner.id());
        if let Some(keys) = keys {
            let placeholder = f.bind(keys.to_vec());
            f.clause(format!("key = ANY({placeholder})"));
        }

        let sql = format!(
            "DELETE FROM properties
             WHERE {}
             RETURNING {PROPERTY_COLUMNS}",
            f.where_clause()
        );
        let rows = self
            .query_rows(&sql, &f.params())
            .await
            .map_err(|e| e.context("failed to delete properties"))?;
        rows.iter().map(property_from_record).collect()
    }

    async fn assert_owner_exists(&mut self, owner: PropertyOwner) -> Result<()> {
        let (table, what) = match owner {
            PropertyOwner::Entity(_) => ("entities", "Entity"),
            PropertyOwner::Relationship(_) => ("relationships", "Relationship"),
        };
        let owner_id = owner.id();
        let rec = self
            .query_one(
                &format!("SELECT id FROM {table} WHERE id = $1"),
                &[&owner_id],
            )
            .await?;
        if rec.is_none() {
            return Err(MementoError::Validation(format!("{what} not found: {owner_id}")));
        }
        Ok(())
    }

    // ── Relationships ────────────────────────────────────────────

    /// Add a directed relationship. Both endpoints must resolve to
    /// existing entities, verified with one membership query before the
    /// insert (a self-loop needs only one matching row).
    pub async fn add_relationship(
        &mut self,
        source_id: i64,
        target_id: i64,
        rel_type: &str,
    ) -> Result<Relationship> {
        if rel_type.trim().is_empty() {
            return Err(MementoError::Validation(
                "Relationship type cannot be empty".into(),
            ));
        }

        let expected = if source_id == target_id { 1 } else { 2 };
        let endpoints = self
            .query_rows(
                "SELECT id FROM entities WHERE id IN ($1, $2)",
                &[&source_id, &target_id],
            )
            .await
            .map_err(|e| e.context("failed to add relationship"))?;
        if endpoints.len() != expected {
            return Err(MementoError::Validation(
                "Both source and target entities must exist".into(),
            ));
        }

        let rec = self
            .query_one(
                "INSERT INTO relationships (source_id, target_id, type)
                 VALUES ($1, $2, $3)
                 RETURNING id, source_id, target_id, type, created_at, last_updated",
                &[&source_id, &target_id, &rel_type],
            )
            .await
            .map_err(|e| e.context("failed to add relationship"))?
            .ok_or_else(|| {
                MementoError::Unexpected(anyhow!("relationship insert returned no row"))
            })?;
        relationship_from_record(&rec)
    }

    /// Update a relationship's type, bumping `last_updated`. Returns
    /// `None` if the id does not resolve.
    pub async fn update_relationship(
        &mut self,
        relationship_id: i64,
        rel_type: &str,
    ) -> Result<Option<Relationship>> {
        if rel_type.trim().is_empty() {
            return Err(MementoError::Validation(
                "Relationship type cannot be empty".into(),
            ));
        }

        let rec = self
            .query_one(
                "UPDATE relationships
                 SET type = $1, last_updated = CURRENT_TIMESTAMP
                 WHERE id = $2
                 RETURNING id, source_id, target_id, type, created_at, last_updated",
                &[&rel_type, &relationship_id],
            )
            .await
            .map_err(|e| e.context("failed to update relationship"))?;
        rec.map(|r| relationship_from_record(&r)).transpose()
    }

    /// Delete a relationship; the schema cascade removes its properties.
    /// Returns whether a relationship was found and deleted.
    pub async fn delete_relationship(&mut self, relationship_id: i64) -> Result<bool> {
        let n = self
            .run(
                "DELETE FROM relationships WHERE id = $1",
                &[&relationship_id],
            )
            .await
            .map_err(|e| e.context("failed to delete relationship"))?;
        Ok(n > 0)
    }
}

fn owner_ids(owner: PropertyOwner) -> (Option<i64>, Option<i64>) {
    match owner {
        PropertyOwner::Entity(id) => (Some(id), None),
        PropertyOwner::Relationship(id) => (None, Some(id)),
    }
}
