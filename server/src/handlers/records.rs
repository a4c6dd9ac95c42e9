//! Record handlers - the create, patch, delete and list semantics of the service.
//!
//! Bodies are validated against the table schema before the database is
//! touched. Local bookkeeping markers sent by clients are never stored.

use crate::db;
use crate::error::{AppError, Result};
use crate::AppState;
use cask_engine::Record;
use serde_json::Value;

/// List every record of a table.
pub async fn list_records(state: &AppState, table: &str) -> Result<Vec<Value>> {
    state.schema.validate_table(table)?;

    let rows = db::list_records(&state.pool, table).await?;
    Ok(rows.into_iter().map(|row| row.body).collect())
}

/// Store a new record. A missing id is assigned; an existing id is overwritten.
pub async fn insert_record(state: &AppState, table: &str, body: Value) -> Result<Value> {
    state.schema.validate_table(table)?;

    let record = parse_new_record(body)?;
    let id = record.id().to_string();
    let stored = db::upsert_record(&state.pool, table, &id, &record.into_value()).await?;
    let replaced = stored.updated_at > stored.created_at;

    tracing::debug!(table, id = %stored.record_id, replaced, "Stored record");
    Ok(stored.body)
}

/// Shallow-merge a patch into an existing record.
pub async fn update_record(state: &AppState, table: &str, id: &str, body: Value) -> Result<Value> {
    state.schema.validate_table(table)?;

    let patch = parse_patch(id, body)?;
    let stored = db::patch_record(&state.pool, table, id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("record {table}/{id}")))?;

    tracing::debug!(table, id, "Patched record");
    Ok(stored.body)
}

/// Remove a record. Removing an absent record succeeds.
pub async fn delete_record(state: &AppState, table: &str, id: &str) -> Result<()> {
    state.schema.validate_table(table)?;

    let removed = db::delete_record(&state.pool, table, id).await?;
    tracing::debug!(table, id, removed, "Deleted record");
    Ok(())
}

/// Validate an insert body, assigning a UUID when no id is present.
pub fn parse_new_record(body: Value) -> Result<Record> {
    let record = match body.get("id") {
        None | Some(Value::Null) => Record::new(uuid::Uuid::new_v4().to_string(), body)?,
        Some(_) => Record::from_value(body)?,
    };
    Ok(record.without_local_markers())
}

/// Validate a patch body against the id in the path.
pub fn parse_patch(id: &str, body: Value) -> Result<Value> {
    if !body.is_object() {
        return Err(AppError::BadRequest("patch body must be a JSON object".into()));
    }
    match body.get("id") {
        None | Some(Value::Null) => {}
        Some(Value::String(body_id)) if body_id == id => {}
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "body id {other} does not match path id '{id}'"
            )))
        }
    }
    Ok(Record::new(id, body)?.without_local_markers().into_value())
}
