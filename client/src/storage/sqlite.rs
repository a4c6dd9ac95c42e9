//! SQLite storage backend.
//!
//! Each schema table becomes an SQLite table with an `id` primary key and
//! the record as a JSON `body`. Secondary indexes are expression indexes on
//! `json_extract(body, '$.<field>')`. The mutation queue is the
//! `sync_queue` table; `AUTOINCREMENT` keeps entry ids from ever being
//! reused. The declared schema version is stored in `PRAGMA user_version`.

use super::{now_millis, LocalWrites, MutationQueue, RecordStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use cask_engine::{
    EntryId, Mutation, Operation, QueueEntry, Record, Schema, TableSchema, QUEUE_TABLE,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::types::Json;
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Records and queue persisted in a single SQLite database.
#[derive(Debug)]
pub struct SqliteStorage {
    pool: SqlitePool,
    schema: Schema,
    ready: OnceCell<()>,
}

impl SqliteStorage {
    /// Open (creating on first use) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        info!(path = %path.as_ref().display(), "Opening local store");
        Self::connect(options, schema).await
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory(schema: Schema) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options, schema).await
    }

    async fn connect(options: SqliteConnectOptions, schema: Schema) -> Result<Self> {
        // One long-lived connection: writes are serialized, and an in-memory
        // database lives exactly as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let storage = Self {
            pool,
            schema,
            ready: OnceCell::new(),
        };
        storage.ready().await?;
        Ok(storage)
    }

    /// Close the underlying connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ready(&self) -> Result<()> {
        self.ready.get_or_try_init(|| self.migrate()).await?;
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        let target = self.schema.version;
        let mut tx = self.pool.begin().await?;

        let current: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&mut *tx)
            .await?;

        if current > i64::from(target) {
            return Err(Error::SchemaTooNew {
                found: current,
                supported: target,
            });
        }

        if current < i64::from(target) {
            for table in self.schema.tables() {
                for statement in table_ddl(table) {
                    sqlx::query(&statement).execute(&mut *tx).await?;
                }
            }
            sqlx::query(&queue_ddl()).execute(&mut *tx).await?;
            // PRAGMA arguments cannot be bound.
            sqlx::query(&format!("PRAGMA user_version = {target}"))
                .execute(&mut *tx)
                .await?;
            info!(from = current, to = target, "Upgraded local store schema");
        }

        tx.commit().await?;
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&TableSchema> {
        Ok(self.schema.validate_table(name)?)
    }
}

#[async_trait]
impl RecordStore for SqliteStorage {
    async fn init(&self) -> Result<()> {
        self.ready().await
    }

    async fn save(&self, table: &str, mut record: Record) -> Result<Record> {
        self.ready().await?;
        let table = &self.table(table)?.name;
        let now = now_millis();
        record.stamp_local(now);

        let mut conn = self.pool.acquire().await?;
        upsert_record(&mut conn, table, &record, now).await?;
        Ok(record)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>> {
        self.ready().await?;
        let table = &self.table(table)?.name;

        let row = sqlx::query(&format!(r#"SELECT body FROM "{table}" WHERE id = ?1"#))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode_record(table, &row)).transpose()
    }

    async fn get_all(&self, table: &str) -> Result<Vec<Record>> {
        self.ready().await?;
        let table = &self.table(table)?.name;

        let rows = sqlx::query(&format!(r#"SELECT body FROM "{table}" ORDER BY id"#))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| decode_record(table, row)).collect()
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        self.ready().await?;
        let table = &self.table(table)?.name;

        let mut conn = self.pool.acquire().await?;
        delete_record(&mut conn, table, id).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.ready().await?;
        let mut tx = self.pool.begin().await?;
        for table in self.schema.tables() {
            sqlx::query(&format!(r#"DELETE FROM "{}""#, table.name))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(&format!("DELETE FROM {QUEUE_TABLE}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Cleared local store and mutation queue");
        Ok(())
    }
}

#[async_trait]
impl MutationQueue for SqliteStorage {
    async fn enqueue(&self, mutation: Mutation) -> Result<QueueEntry> {
        self.ready().await?;
        self.schema.validate_mutation(&mutation)?;
        let now = now_millis();

        let mut conn = self.pool.acquire().await?;
        let entry_id = insert_entry(&mut conn, &mutation, now).await?;

        let entry = QueueEntry::new(entry_id, mutation, now);
        log_enqueued(&entry);
        Ok(entry)
    }

    async fn list_pending(&self) -> Result<Vec<QueueEntry>> {
        self.ready().await?;
        let rows = sqlx::query(&format!(
            "SELECT entry_id, table_name, operation, payload, enqueued_at, retry_count
             FROM {QUEUE_TABLE} ORDER BY entry_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_entry).collect()
    }

    async fn remove(&self, entry_id: EntryId) -> Result<()> {
        self.ready().await?;
        sqlx::query(&format!("DELETE FROM {QUEUE_TABLE} WHERE entry_id = ?1"))
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, entry_id: EntryId) -> Result<()> {
        self.ready().await?;
        sqlx::query(&format!(
            "UPDATE {QUEUE_TABLE} SET retry_count = retry_count + 1 WHERE entry_id = ?1"
        ))
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        self.ready().await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {QUEUE_TABLE}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl LocalWrites for SqliteStorage {
    async fn apply_local(&self, mutation: Mutation) -> Result<QueueEntry> {
        self.ready().await?;
        self.schema.validate_mutation(&mutation)?;
        let now = now_millis();

        let mut tx = self.pool.begin().await?;
        match mutation.operation {
            Operation::Create | Operation::Update => {
                let mut record = mutation.payload.clone();
                record.stamp_local(now);
                upsert_record(&mut tx, &mutation.table, &record, now).await?;
            }
            Operation::Delete => {
                delete_record(&mut tx, &mutation.table, mutation.record_id()).await?;
            }
        }
        let entry_id = insert_entry(&mut tx, &mutation, now).await?;
        tx.commit().await?;

        let entry = QueueEntry::new(entry_id, mutation, now);
        log_enqueued(&entry);
        Ok(entry)
    }
}

async fn upsert_record(
    conn: &mut SqliteConnection,
    table: &str,
    record: &Record,
    now: i64,
) -> Result<()> {
    sqlx::query(&format!(
        r#"INSERT INTO "{table}" (id, body, saved_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(id) DO UPDATE SET body = excluded.body, saved_at = excluded.saved_at"#
    ))
    .bind(record.id())
    .bind(Json(record))
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn delete_record(conn: &mut SqliteConnection, table: &str, id: &str) -> Result<()> {
    sqlx::query(&format!(r#"DELETE FROM "{table}" WHERE id = ?1"#))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_entry(conn: &mut SqliteConnection, mutation: &Mutation, now: i64) -> Result<EntryId> {
    let result = sqlx::query(&format!(
        "INSERT INTO {QUEUE_TABLE} (table_name, operation, payload, enqueued_at, retry_count)
         VALUES (?1, ?2, ?3, ?4, 0)"
    ))
    .bind(&mutation.table)
    .bind(mutation.operation.as_str())
    .bind(Json(&mutation.payload))
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

fn log_enqueued(entry: &QueueEntry) {
    debug!(
        entry_id = entry.entry_id,
        table = %entry.table_name,
        operation = %entry.operation,
        record_id = %entry.record_id(),
        "Enqueued mutation"
    );
}

/// Statements declaring one record table and its indexes.
fn table_ddl(table: &TableSchema) -> Vec<String> {
    let name = &table.name;
    let mut statements = vec![format!(
        r#"CREATE TABLE IF NOT EXISTS "{name}" (
            id TEXT PRIMARY KEY NOT NULL,
            body TEXT NOT NULL,
            saved_at INTEGER NOT NULL
        )"#
    )];
    for index in &table.indexes {
        statements.push(format!(
            r#"CREATE INDEX IF NOT EXISTS "{name}_by_{}" ON "{name}" (json_extract(body, '$.{}'))"#,
            index.name, index.key_path
        ));
    }
    statements
}

fn queue_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {QUEUE_TABLE} (
            entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            operation TEXT NOT NULL,
            payload TEXT NOT NULL,
            enqueued_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0
        )"
    )
}

fn corrupt(table: &str, reason: impl ToString) -> Error {
    Error::CorruptRow {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_record(table: &str, body: &str) -> Result<Record> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| corrupt(table, e))?;
    Record::from_value(value).map_err(|e| corrupt(table, e))
}

fn decode_record(table: &str, row: &SqliteRow) -> Result<Record> {
    let body: String = row.try_get("body")?;
    parse_record(table, &body)
}

fn decode_entry(row: &SqliteRow) -> Result<QueueEntry> {
    let entry_id: i64 = row.try_get("entry_id")?;
    let table_name: String = row.try_get("table_name")?;
    let operation: String = row.try_get("operation")?;
    let payload: String = row.try_get("payload")?;
    let enqueued_at: i64 = row.try_get("enqueued_at")?;
    let retry_count: i64 = row.try_get("retry_count")?;

    let operation = Operation::from_str(&operation).map_err(|e| corrupt(QUEUE_TABLE, e))?;
    let payload = parse_record(QUEUE_TABLE, &payload)?;
    let mutation =
        Mutation::from_parts(table_name, operation, payload).map_err(|e| corrupt(QUEUE_TABLE, e))?;

    let mut entry = QueueEntry::new(entry_id, mutation, enqueued_at);
    entry.retry_count = u32::try_from(retry_count).unwrap_or(u32::MAX);
    Ok(entry)
}
