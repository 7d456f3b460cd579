//! Read operations: lookups, filtered listings, search, and traversal.

use memento_core::{
    ConnectedEntity, Direction, Entity, EntityHit, EntityRef, EntityRelationship, MementoError,
    Property, PropertyOwner, Relationship, RelationshipFilter, Result,
};

use crate::client::GraphStore;
use crate::records::{
    entity_from_prefixed, entity_from_record, get_json_object, get_string, property_from_record,
    relationship_from_record,
};
use crate::sql::FilterBuilder;

const ENTITY_COLUMNS: &str = "id, type, name, created_at, last_updated";
const RELATIONSHIP_COLUMNS: &str = "id, source_id, target_id, type, created_at, last_updated";

/// Aggregate an entity's properties into one JSON object column. The
/// FILTER clause keeps `json_object_agg` from choking on the null key a
/// property-less entity produces through the LEFT JOIN.
const PROPERTY_AGG: &str =
    "COALESCE(json_object_agg(p.key, p.value) FILTER (WHERE p.key IS NOT NULL), '{}'::json)";

impl GraphStore {
    // ── Entities ─────────────────────────────────────────────────

    /// Look up an entity by id, or by the (type, name) pair.
    pub async fn get_entity(&mut self, entity: &EntityRef) -> Result<Option<Entity>> {
        let rec = match entity {
            EntityRef::Id(id) => {
                self.query_one(
                    &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = $1"),
                    &[id],
                )
                .await
            }
            EntityRef::TypeName { entity_type, name } => {
                self.query_one(
                    &format!(
                        "SELECT {ENTITY_COLUMNS} FROM entities WHERE type = $1 AND name = $2"
                    ),
                    &[entity_type, name],
                )
                .await
            }
        }
        .map_err(|e| e.context("failed to get entity"))?;
        rec.map(|r| entity_from_record(&r)).transpose()
    }

    // ── Properties ───────────────────────────────────────────────

    /// List an owner's properties, optionally restricted to one key.
    pub async fn get_properties(
        &mut self,
        owner: PropertyOwner,
        key: Option<&str>,
    ) -> Result<Vec<Property>> {
        let mut f = FilterBuilder::new();
        f.eq(owner.column(), owner.id());
        if let Some(key) = key {
            f.eq("key", key.to_string());
        }

        let sql = format!(
            "SELECT id, entity_id, relationship_id, key, value, value_type,
                    created_at, last_updated
             FROM properties
             WHERE {}
             ORDER BY key",
            f.where_clause()
        );
        let rows = self
            .query_rows(&sql, &f.params())
            .await
            .map_err(|e| e.context("failed to get properties"))?;
        rows.iter().map(property_from_record).collect()
    }

    // ── Relationships ────────────────────────────────────────────

    /// List relationships matching the filter; no filters lists all.
    pub async fn get_relationships(
        &mut self,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Relationship>> {
        let mut f = FilterBuilder::new();
        if let Some(id) = filter.id {
            f.eq("id", id);
        }
        if let Some(source_id) = filter.source_id {
            f.eq("source_id", source_id);
        }
        if let Some(target_id) = filter.target_id {
            f.eq("target_id", target_id);
        }
        if let Some(rel_type) = &filter.rel_type {
            f.eq("type", rel_type.clone());
        }

        let sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS}
             FROM relationships
             WHERE {}
             ORDER BY created_at",
            f.where_clause()
        );
        let rows = self
            .query_rows(&sql, &f.params())
            .await
            .map_err(|e| e.context("failed to get relationships"))?;
        rows.iter().map(relationship_from_record).collect()
    }

    /// List an entity's relationships together with both endpoint
    /// entities. At least one direction flag must be set.
    pub async fn get_entity_relationships(
        &mut self,
        entity_id: i64,
        include_incoming: bool,
        include_outgoing: bool,
        rel_type: Option<&str>,
    ) -> Result<Vec<EntityRelationship>> {
        if !include_incoming && !include_outgoing {
            return Err(MementoError::Validation(
                "Must include at least one relationship direction".into(),
            ));
        }

        let mut f = FilterBuilder::new();
        let mut direction = Vec::new();
        if include_outgoing {
            let p = f.bind(entity_id);
            direction.push(format!("r.source_id = {p}"));
        }
        if include_incoming {
            let p = f.bind(entity_id);
            direction.push(format!("r.target_id = {p}"));
        }
        f.clause(format!("({})", direction.join(" OR ")));
        if let Some(rel_type) = rel_type {
            f.eq("r.type", rel_type.to_string());
        }

        let sql = format!(
            "SELECT r.id, r.source_id, r.target_id, r.type, r.created_at, r.last_updated,
                    s.id AS s_id, s.type AS s_type, s.name AS s_name,
                    s.created_at AS s_created_at, s.last_updated AS s_last_updated,
                    t.id AS t_id, t.type AS t_type, t.name AS t_name,
                    t.created_at AS t_created_at, t.last_updated AS t_last_updated
             FROM relationships r
             JOIN entities s ON s.id = r.source_id
             JOIN entities t ON t.id = r.target_id
             WHERE {}
             ORDER BY r.created_at",
            f.where_clause()
        );
        let rows = self
            .query_rows(&sql, &f.params())
            .await
            .map_err(|e| e.context("failed to get entity relationships"))?;
        rows.iter()
            .map(|rec| {
                Ok(EntityRelationship {
                    relationship: relationship_from_record(rec)?,
                    source: entity_from_prefixed(rec, "s_")?,
                    target: entity_from_prefixed(rec, "t_")?,
                })
            })
            .collect()
    }

    // ── Search and traversal ─────────────────────────────────────

    /// Find entities by exact type and/or exact property key/value pairs,
    /// returning each hit with its aggregated properties.
    pub async fn search_entities(
        &mut self,
        entity_type: Option<&str>,
        properties: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Vec<EntityHit>> {
        let mut f = FilterBuilder::new();
        if let Some(t) = entity_type {
            f.eq("e.type", t.to_string());
        }
        if let Some(props) = properties {
            for (key, value) in props {
                let k = f.bind(key.clone());
                let v = f.bind(crate::records::stringify_value(value));
                f.clause(format!(
                    "EXISTS (SELECT 1 FROM properties sp
                             WHERE sp.entity_id = e.id AND sp.key = {k} AND sp.value = {v})"
                ));
            }
        }

        let sql = format!(
            "SELECT e.id, e.type, e.name, e.created_at, e.last_updated,
                    {PROPERTY_AGG} AS properties
             FROM entities e
             LEFT JOIN properties p ON p.entity_id = e.id
             WHERE {}
             GROUP BY e.id, e.type, e.name, e.created_at, e.last_updated
             ORDER BY e.created_at",
            f.where_clause()
        );
        let rows = self
            .query_rows(&sql, &f.params())
            .await
            .map_err(|e| e.context("failed to search entities"))?;
        rows.iter()
            .map(|rec| {
                Ok(EntityHit {
                    entity: entity_from_record(rec)?,
                    properties: get_json_object(rec, "properties"),
                })
            })
            .collect()
    }

    /// Neighbors reachable over one relationship hop in either direction,
    /// annotated with the relationship type and the traversal direction as
    /// seen from the given entity.
    pub async fn get_connected_entities(
        &mut self,
        entity_id: i64,
        relationship_type: Option<&str>,
    ) -> Result<Vec<ConnectedEntity>> {
        let mut f = FilterBuilder::new();
        let a = f.bind(entity_id);
        let b = f.bind(entity_id);
        f.clause(format!("(r.source_id = {a} OR r.target_id = {b})"));
        if let Some(t) = relationship_type {
            f.eq("r.type", t.to_string());
        }
        let d = f.bind(entity_id);

        let sql = format!(
            "SELECT e.id, e.type, e.name, e.created_at, e.last_updated,
                    r.type AS relationship_type,
                    CASE WHEN r.source_id = {d} THEN 'outgoing' ELSE 'incoming' END AS direction,
                    {PROPERTY_AGG} AS properties
             FROM relationships r
             JOIN entities e
               ON e.id = CASE WHEN r.source_id = {d} THEN r.target_id ELSE r.source_id END
             LEFT JOIN properties p ON p.entity_id = e.id
             WHERE {}
             GROUP BY e.id, e.type, e.name, e.created_at, e.last_updated,
                      r.type, r.source_id
             ORDER BY e.created_at",
            f.where_clause()
        );
        let rows = self
            .query_rows(&sql, &f.params())
            .await
            .map_err(|e| e.context("failed to get connected entities"))?;
        rows.iter()
            .map(|rec| {
                let direction = match get_string(rec, "direction")?.as_str() {
                    "outgoing" => Direction::Outgoing,
                    _ => Direction::Incoming,
                };
                Ok(ConnectedEntity {
                    entity: entity_from_record(rec)?,
                    properties: get_json_object(rec, "properties"),
                    relationship_type: get_string(rec, "relationship_type")?,
                    direction,
                })
            })
            .collect()
    }
}
