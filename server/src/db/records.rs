//! Database operations for the records table.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub table_name: String,
    pub record_id: String,
    pub body: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            table_name: row.try_get("table_name")?,
            record_id: row.try_get("record_id")?,
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Insert a record, overwriting the body of an existing row with the same id.
pub async fn upsert_record(
    pool: &PgPool,
    table: &str,
    record_id: &str,
    body: &Value,
) -> Result<StoredRecord, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        INSERT INTO records (table_name, record_id, body)
        VALUES ($1, $2, $3)
        ON CONFLICT (table_name, record_id) DO UPDATE SET
            body = EXCLUDED.body,
            updated_at = now()
        RETURNING table_name, record_id, body, created_at, updated_at
        "#,
    )
    .bind(table)
    .bind(record_id)
    .bind(body)
    .fetch_one(pool)
    .await
}

/// Shallow-merge `patch` into an existing record. Returns `None` when absent.
pub async fn patch_record(
    pool: &PgPool,
    table: &str,
    record_id: &str,
    patch: &Value,
) -> Result<Option<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        UPDATE records
        SET body = body || $3, updated_at = now()
        WHERE table_name = $1 AND record_id = $2
        RETURNING table_name, record_id, body, created_at, updated_at
        "#,
    )
    .bind(table)
    .bind(record_id)
    .bind(patch)
    .fetch_optional(pool)
    .await
}

/// Delete a record. Returns whether a row was removed.
pub async fn delete_record(
    pool: &PgPool,
    table: &str,
    record_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM records WHERE table_name = $1 AND record_id = $2")
        .bind(table)
        .bind(record_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Get all records of a table, oldest first.
pub async fn list_records(pool: &PgPool, table: &str) -> Result<Vec<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT table_name, record_id, body, created_at, updated_at
        FROM records
        WHERE table_name = $1
        ORDER BY created_at, record_id
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
}
