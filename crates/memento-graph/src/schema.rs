//! Schema bootstrap and introspection.

use memento_core::{
    ColumnInfo, ConstraintInfo, MementoError, Result, TableInfo, TableSchema,
};

use crate::client::GraphStore;
use crate::records::{get_bool, get_i64, get_opt_i64, get_opt_string, get_string};

/// Idempotent DDL for the knowledge graph tables. Order matters: tables
/// are created before the tables that reference them.
///
/// Deletes rely on the ON DELETE CASCADE foreign keys here, and the CHECK
/// constraint on properties enforces exactly one owner per row.
const SCHEMA_DDL: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS entities (
        id BIGSERIAL PRIMARY KEY,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        last_updated TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS relationships (
        id BIGSERIAL PRIMARY KEY,
        source_id BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        target_id BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        last_updated TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS properties (
        id BIGSERIAL PRIMARY KEY,
        entity_id BIGINT REFERENCES entities(id) ON DELETE CASCADE,
        relationship_id BIGINT REFERENCES relationships(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        value_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        last_updated TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        CHECK ((entity_id IS NULL) <> (relationship_id IS NULL))
    )",
    "CREATE TABLE IF NOT EXISTS context_categories (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS context_entries (
        id BIGSERIAL PRIMARY KEY,
        category_id BIGINT NOT NULL REFERENCES context_categories(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        last_updated TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (category_id, key)
    )",
    "CREATE INDEX IF NOT EXISTS idx_properties_entity ON properties (entity_id, key)",
];

impl GraphStore {
    /// Create the graph tables if they do not exist.
    pub async fn ensure_schema(&mut self) -> Result<()> {
        for ddl in SCHEMA_DDL {
            self.run(ddl, &[])
                .await
                .map_err(|e| e.context("failed to ensure schema"))?;
        }
        tracing::info!("schema ensured");
        Ok(())
    }

    /// List public-schema tables with approximate row counts and sizes.
    ///
    /// Row counts come from `pg_class.reltuples` and are only as fresh as
    /// the last ANALYZE; exact counts would need a scan per table.
    pub async fn list_tables(&mut self) -> Result<Vec<TableInfo>> {
        let rows = self
            .query_rows(
                "SELECT c.relname::text AS name,
                        GREATEST(c.reltuples, 0)::int8 AS approx_rows,
                        pg_total_relation_size(c.oid)::int8 AS total_bytes
                 FROM pg_class c
                 JOIN pg_namespace n ON n.oid = c.relnamespace
                 WHERE n.nspname = 'public' AND c.relkind = 'r'
                 ORDER BY c.relname",
                &[],
            )
            .await
            .map_err(|e| e.context("failed to list tables"))?;
        rows.iter()
            .map(|rec| {
                Ok(TableInfo {
                    name: get_string(rec, "name")?,
                    approx_rows: get_i64(rec, "approx_rows")?,
                    total_bytes: get_i64(rec, "total_bytes")?,
                })
            })
            .collect()
    }

    /// Describe one table's columns and constraints. The table must exist
    /// in the public schema.
    pub async fn describe_table(&mut self, table: &str) -> Result<TableSchema> {
        let exists = self
            .query_one(
                "SELECT 1 AS one FROM information_schema.tables
                 WHERE table_schema = 'public' AND table_name = $1",
                &[&table],
            )
            .await
            .map_err(|e| e.context("failed to describe table"))?;
        if exists.is_none() {
            return Err(MementoError::Validation(format!(
                "Table '{table}' does not exist"
            )));
        }

        // The ::text / ::int4 casts collapse information_schema domain
        // types into plainly decodable ones.
        let column_rows = self
            .query_rows(
                "SELECT column_name::text AS name,
                        data_type::text AS data_type,
                        character_maximum_length::int4 AS max_length,
                        column_default::text AS default_value,
                        (is_nullable = 'YES') AS nullable
                 FROM information_schema.columns
                 WHERE table_schema = 'public' AND table_name = $1
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(|e| e.context("failed to describe table"))?;
        let columns = column_rows
            .iter()
            .map(|rec| {
                Ok(ColumnInfo {
                    name: get_string(rec, "name")?,
                    data_type: get_string(rec, "data_type")?,
                    max_length: get_opt_i64(rec, "max_length").map(|n| n as i32),
                    default: get_opt_string(rec, "default_value"),
                    nullable: get_bool(rec, "nullable")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let constraint_rows = self
            .query_rows(
                "SELECT tc.constraint_name::text AS name,
                        tc.constraint_type::text AS constraint_type,
                        kcu.column_name::text AS column_name,
                        ccu.table_name::text AS foreign_table,
                        ccu.column_name::text AS foreign_column
                 FROM information_schema.table_constraints tc
                 LEFT JOIN information_schema.key_column_usage kcu
                   ON kcu.constraint_name = tc.constraint_name
                  AND kcu.table_schema = tc.table_schema
                 LEFT JOIN information_schema.constraint_column_usage ccu
                   ON ccu.constraint_name = tc.constraint_name
                  AND ccu.table_schema = tc.table_schema
                  AND tc.constraint_type = 'FOREIGN KEY'
                 WHERE tc.table_schema = 'public' AND tc.table_name = $1
                 ORDER BY tc.constraint_name",
                &[&table],
            )
            .await
            .map_err(|e| e.context("failed to describe table"))?;
        let constraints = constraint_rows
            .iter()
            .map(|rec| {
                Ok(ConstraintInfo {
                    name: get_string(rec, "name")?,
                    constraint_type: get_string(rec, "constraint_type")?,
                    column: get_opt_string(rec, "column_name"),
                    foreign_table: get_opt_string(rec, "foreign_table"),
                    foreign_column: get_opt_string(rec, "foreign_column"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            constraints,
        })
    }
}
