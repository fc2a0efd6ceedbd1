//! Row mapping and type conversion helpers
//!
//! ## Type Mapping
//!
//! | Domain Type                  | SQL Type | Strategy                                   |
//! |------------------------------|----------|--------------------------------------------|
//! | LocalEntityId, MirrorId, ... | INTEGER  | `.get()` / `::new()`                       |
//! | Option<ViewId>               | INTEGER  | `0` for the default view                   |
//! | RemoteId, Fingerprint        | TEXT     | `.as_str()` / serde validation             |
//! | MirrorStatus, RequestStatus  | TEXT     | `.as_str()` / `FromStr`                    |
//! | DateTime<Utc>                | TEXT     | RFC 3339, UTC, fixed microsecond precision |
//! | task_kwargs, attributes      | TEXT     | serde_json                                 |
//!
//! Timestamps are written with a fixed width so that SQL string comparison
//! orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use salesync_core::domain::{
    DomainError, LocalEntity, MirrorKey, MirrorRecord, MirrorStatus, RequestStatus, SyncRequest,
    SyncType,
};

use crate::CacheError;

/// Format a timestamp for storage
pub(crate) fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from its stored representation
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite CURRENT_TIMESTAMP format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn datetime_value(s: Option<String>) -> Result<Value, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => Ok(Value::String(parse_datetime(val)?.to_rfc3339())),
        _ => Ok(Value::Null),
    }
}

fn view_value(view_id: i64) -> Result<Value, CacheError> {
    MirrorKey::view_from_storage(view_id)
        .map(|view| json!(view.map(|v| v.get())))
        .map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn parse_json_column(column: &str, raw: &str) -> Result<Value, CacheError> {
    serde_json::from_str(raw)
        .map_err(|e| CacheError::SerializationError(format!("Invalid {} JSON: {}", column, e)))
}

/// Reconstruct a MirrorRecord from a `mirror_records` row
///
/// Goes through serde because the record's fields are private to the domain
/// crate; deserialization re-validates every newtype.
pub(crate) fn mirror_record_from_row(row: &SqliteRow) -> Result<MirrorRecord, CacheError> {
    let status_str: String = row.get("status");
    let status: MirrorStatus = status_str
        .parse()
        .map_err(|e: DomainError| CacheError::SerializationError(e.to_string()))?;

    let record_json = json!({
        "id": row.get::<i64, _>("id"),
        "key": {
            "local_entity_id": row.get::<i64, _>("local_entity_id"),
            "channel_id": row.get::<i64, _>("channel_id"),
            "view_id": view_value(row.get("view_id"))?,
        },
        "remote_id": row.get::<Option<String>, _>("remote_id"),
        "status": status.as_str(),
        "last_synced_hash": row.get::<Option<String>, _>("last_synced_hash"),
        "error_detail": row.get::<Option<String>, _>("error_detail"),
        "created_at": datetime_value(row.get("created_at"))?,
        "updated_at": datetime_value(row.get("updated_at"))?,
    });

    serde_json::from_value(record_json).map_err(|e| {
        CacheError::SerializationError(format!(
            "Failed to reconstruct MirrorRecord from row: {}",
            e
        ))
    })
}

/// Reconstruct a SyncRequest from a `sync_requests` row
pub(crate) fn sync_request_from_row(row: &SqliteRow) -> Result<SyncRequest, CacheError> {
    let sync_type_str: String = row.get("sync_type");
    let sync_type: SyncType = sync_type_str
        .parse()
        .map_err(|e: DomainError| CacheError::SerializationError(e.to_string()))?;
    let status_str: String = row.get("status");
    let status: RequestStatus = status_str
        .parse()
        .map_err(|e: DomainError| CacheError::SerializationError(e.to_string()))?;
    let kwargs_str: String = row.get("task_kwargs");
    let attempts: i64 = row.get("attempts");

    let request_json = json!({
        "id": row.get::<i64, _>("id"),
        "key": {
            "remote_product_id": row.get::<i64, _>("remote_product_id"),
            "sync_type": sync_type.as_str(),
            "view_id": view_value(row.get("view_id"))?,
        },
        "task_kwargs": parse_json_column("task_kwargs", &kwargs_str)?,
        "status": status.as_str(),
        "attempts": attempts.max(0),
        "error_detail": row.get::<Option<String>, _>("error_detail"),
        "next_attempt_at": datetime_value(row.get("next_attempt_at"))?,
        "created_at": datetime_value(row.get("created_at"))?,
        "updated_at": datetime_value(row.get("updated_at"))?,
    });

    serde_json::from_value(request_json).map_err(|e| {
        CacheError::SerializationError(format!(
            "Failed to reconstruct SyncRequest from row: {}",
            e
        ))
    })
}

/// Reconstruct a LocalEntity from a `local_entities` row
pub(crate) fn local_entity_from_row(row: &SqliteRow) -> Result<LocalEntity, CacheError> {
    let attributes_str: String = row.get("attributes");
    let deleted: i64 = row.get("deleted");

    let entity_json = json!({
        "id": row.get::<i64, _>("id"),
        "tenant_id": row.get::<i64, _>("tenant_id"),
        "kind": row.get::<String, _>("kind"),
        "sku": row.get::<Option<String>, _>("sku"),
        "attributes": parse_json_column("attributes", &attributes_str)?,
        "deleted": deleted != 0,
        "updated_at": datetime_value(row.get("updated_at"))?,
    });

    serde_json::from_value(entity_json).map_err(|e| {
        CacheError::SerializationError(format!(
            "Failed to reconstruct LocalEntity from row: {}",
            e
        ))
    })
}
