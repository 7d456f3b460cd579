//! Categorized key/value context store alongside the graph.

use anyhow::anyhow;

use memento_core::{ContextEntry, MementoError, Result};

use crate::client::GraphStore;
use crate::records::get_string;
use crate::sql::FilterBuilder;

impl GraphStore {
    /// Set a context value, creating the category on first use and
    /// overwriting any existing value under the same (category, key).
    pub async fn set_context(&mut self, category: &str, key: &str, value: &str) -> Result<ContextEntry> {
        if category.trim().is_empty() {
            return Err(MementoError::Validation("Category cannot be empty".into()));
        }
        if key.trim().is_empty() {
            return Err(MementoError::Validation("Context key cannot be empty".into()));
        }

        // DO NOTHING returns no row for a pre-existing category, hence the
        // fallback select.
        let category_id = match self
            .query_one(
                "INSERT INTO context_categories (name)
                 VALUES ($1)
                 ON CONFLICT (name) DO NOTHING
                 RETURNING id",
                &[&category],
            )
            .await
            .map_err(|e| e.context("failed to set context"))?
        {
            Some(rec) => rec,
            None => self
                .query_one(
                    "SELECT id FROM context_categories WHERE name = $1",
                    &[&category],
                )
                .await
                .map_err(|e| e.context("failed to set context"))?
                .ok_or_else(|| {
                    MementoError::Unexpected(anyhow!("context category vanished after insert"))
                })?,
        };
        let category_id = category_id
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| MementoError::Unexpected(anyhow!("missing category id")))?;

        let rec = self
            .query_one(
                "INSERT INTO context_entries (category_id, key, value)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (category_id, key)
                 DO UPDATE SET value = EXCLUDED.value, last_updated = CURRENT_TIMESTAMP
                 RETURNING key, value",
                &[&category_id, &key, &value],
            )
            .await
            .map_err(|e| e.context("failed to set context"))?
            .ok_or_else(|| MementoError::Unexpected(anyhow!("context upsert returned no row")))?;

        Ok(ContextEntry {
            category: category.to_string(),
            key: get_string(&rec, "key")?,
            value: get_string(&rec, "value")?,
        })
    }

    /// List context entries, optionally restricted to one category.
    pub async fn get_context(&mut self, category: Option<&str>) -> Result<Vec<ContextEntry>> {
        let mut f = FilterBuilder::new();
        if let Some(category) = category {
            f.eq("c.name", category.to_string());
        }

        let sql = format!(
            "SELECT c.name AS category, e.key, e.value
             FROM context_entries e
             JOIN context_categories c ON c.id = e.category_id
             WHERE {}
             ORDER BY c.name, e.key",
            f.where_clause()
        );
        let rows = self
            .query_rows(&sql, &f.params())
            .await
            .map_err(|e| e.context("failed to get context"))?;
        rows.iter()
            .map(|rec| {
                Ok(ContextEntry {
                    category: get_string(rec, "category")?,
                    key: get_string(rec, "key")?,
                    value: get_string(rec, "value")?,
                })
            })
            .collect()
    }
}
