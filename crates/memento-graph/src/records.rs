//! Decoding executor records into domain types.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde_json::Value;

use memento_core::{Entity, MementoError, Property, Relationship, Result};

use crate::executor::Record;

pub(crate) fn get_i64(rec: &Record, key: &str) -> Result<i64> {
    rec.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| missing(key))
}

pub(crate) fn get_opt_i64(rec: &Record, key: &str) -> Option<i64> {
    rec.get(key).and_then(Value::as_i64)
}

pub(crate) fn get_string(rec: &Record, key: &str) -> Result<String> {
    rec.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(key))
}

pub(crate) fn get_opt_string(rec: &Record, key: &str) -> Option<String> {
    rec.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn get_bool(rec: &Record, key: &str) -> Result<bool> {
    rec.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| missing(key))
}

pub(crate) fn get_timestamp(rec: &Record, key: &str) -> Result<DateTime<Utc>> {
    let raw = rec
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(key))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MementoError::Unexpected(anyhow!("bad timestamp in column {key}: {e}")))
}

/// Aggregated-properties column: a JSON object, or an empty map when the
/// column is null or absent.
pub(crate) fn get_json_object(rec: &Record, key: &str) -> serde_json::Map<String, Value> {
    match rec.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    }
}

fn missing(key: &str) -> MementoError {
    MementoError::Unexpected(anyhow!("missing or mistyped column: {key}"))
}

/// Render a JSON value as property text. Strings are stored verbatim,
/// everything else as its JSON rendering.
pub(crate) fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Infer a property value type from the shape of an incoming JSON value.
pub(crate) fn infer_value_type(value: &Value) -> memento_core::ValueType {
    use memento_core::ValueType;
    match value {
        Value::Number(_) => ValueType::Number,
        Value::Bool(_) => ValueType::Boolean,
        Value::Object(_) | Value::Array(_) => ValueType::Json,
        _ => ValueType::String,
    }
}

pub(crate) fn entity_from_record(rec: &Record) -> Result<Entity> {
    Ok(Entity {
        id: get_i64(rec, "id")?,
        entity_type: get_string(rec, "type")?,
        name: get_string(rec, "name")?,
        created_at: get_timestamp(rec, "created_at")?,
        last_updated: get_timestamp(rec, "last_updated")?,
    })
}

/// Build an entity from prefixed column aliases, as produced by join
/// queries selecting both endpoints (`s_id`, `s_type`, ...).
pub(crate) fn entity_from_prefixed(rec: &Record, prefix: &str) -> Result<Entity> {
    Ok(Entity {
        id: get_i64(rec, &format!("{prefix}id"))?,
        entity_type: get_string(rec, &format!("{prefix}type"))?,
        name: get_string(rec, &format!("{prefix}name"))?,
        created_at: get_timestamp(rec, &format!("{prefix}created_at"))?,
        last_updated: get_timestamp(rec, &format!("{prefix}last_updated"))?,
    })
}

pub(crate) fn relationship_from_record(rec: &Record) -> Result<Relationship> {
    Ok(Relationship {
        id: get_i64(rec, "id")?,
        source_id: get_i64(rec, "source_id")?,
        target_id: get_i64(rec, "target_id")?,
        rel_type: get_string(rec, "type")?,
        created_at: get_timestamp(rec, "created_at")?,
        last_updated: get_timestamp(rec, "last_updated")?,
    })
}

pub(crate) fn property_from_record(rec: &Record) -> Result<Property> {
    Ok(Property {
        id: get_i64(rec, "id")?,
        key: get_string(rec, "key")?,
        value: get_string(rec, "value")?,
        value_type: get_string(rec, "value_type")?.parse()?,
        entity_id: get_opt_i64(rec, "entity_id"),
        relationship_id: get_opt_i64(rec, "relationship_id"),
        created_at: get_timestamp(rec, "created_at")?,
        last_updated: get_timestamp(rec, "last_updated")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memento_core::ValueType;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_entity_from_record() {
        let rec = record(json!({
            "id": 1,
            "type": "person",
            "name": "Alice",
            "created_at": "2024-05-01T10:00:00+00:00",
            "last_updated": "2024-05-01T10:00:00+00:00",
        }));
        let entity = entity_from_record(&rec).unwrap();
        assert_eq!(entity.id, 1);
        assert_eq!(entity.entity_type, "person");
        assert_eq!(entity.name, "Alice");
        assert_eq!(entity.created_at, entity.last_updated);
    }

    #[test]
    fn test_entity_missing_column() {
        let rec = record(json!({ "id": 1, "type": "person" }));
        assert!(matches!(
            entity_from_record(&rec),
            Err(MementoError::Unexpected(_))
        ));
    }

    #[test]
    fn test_property_from_record() {
        let rec = record(json!({
            "id": 9,
            "key": "age",
            "value": "30",
            "value_type": "NUMBER",
            "entity_id": 1,
            "relationship_id": null,
            "created_at": "2024-05-01T10:00:00Z",
            "last_updated": "2024-05-01T10:00:01Z",
        }));
        let prop = property_from_record(&rec).unwrap();
        assert_eq!(prop.value_type, ValueType::Number);
        assert_eq!(prop.entity_id, Some(1));
        assert_eq!(prop.relationship_id, None);
    }

    #[test]
    fn test_entity_from_prefixed() {
        let rec = record(json!({
            "s_id": 2,
            "s_type": "person",
            "s_name": "Bob",
            "s_created_at": "2024-05-01T10:00:00Z",
            "s_last_updated": "2024-05-01T10:00:00Z",
        }));
        let entity = entity_from_prefixed(&rec, "s_").unwrap();
        assert_eq!(entity.id, 2);
        assert_eq!(entity.name, "Bob");
    }

    #[test]
    fn test_stringify_value() {
        assert_eq!(stringify_value(&json!("plain")), "plain");
        assert_eq!(stringify_value(&json!(42)), "42");
        assert_eq!(stringify_value(&json!(true)), "true");
        assert_eq!(stringify_value(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn test_infer_value_type() {
        assert_eq!(infer_value_type(&json!("x")), ValueType::String);
        assert_eq!(infer_value_type(&json!(1.5)), ValueType::Number);
        assert_eq!(infer_value_type(&json!(false)), ValueType::Boolean);
        assert_eq!(infer_value_type(&json!([1, 2])), ValueType::Json);
        assert_eq!(infer_value_type(&json!(null)), ValueType::String);
    }

    #[test]
    fn test_json_object_defaults_to_empty() {
        let rec = record(json!({ "properties": null }));
        assert!(get_json_object(&rec, "properties").is_empty());
        let rec = record(json!({ "properties": {"k": "v"} }));
        assert_eq!(get_json_object(&rec, "properties").len(), 1);
    }
}
