//! Local record store and mutation queue.
//!
//! Both traits are usually implemented by the same backend so that records
//! and queue entries share one storage engine, while staying logically
//! separate: the queue lives in its own table with its own id sequence.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::error::Result;
use async_trait::async_trait;
use cask_engine::{EntryId, Mutation, QueueEntry, Record};

/// Durable per-table storage of records keyed by id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open the storage engine and declare the schema's tables.
    ///
    /// Idempotent. Other methods call it lazily.
    async fn init(&self) -> Result<()>;

    /// Upsert a record, stamped with the local marker and save time.
    ///
    /// Returns the record as stored.
    async fn save(&self, table: &str, record: Record) -> Result<Record>;

    /// Get a record by id.
    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>>;

    /// All records of a table, ordered by id.
    async fn get_all(&self, table: &str) -> Result<Vec<Record>>;

    /// Remove a record. Absent records are not an error.
    async fn delete(&self, table: &str, id: &str) -> Result<()>;

    /// Wipe every table, including the mutation queue.
    async fn clear_all(&self) -> Result<()>;
}

/// Durable FIFO of intended remote writes.
#[async_trait]
pub trait MutationQueue: Send + Sync {
    /// Append a mutation, assigning a fresh entry id.
    async fn enqueue(&self, mutation: Mutation) -> Result<QueueEntry>;

    /// All pending entries in insertion order.
    async fn list_pending(&self) -> Result<Vec<QueueEntry>>;

    /// Remove an entry after its remote replay succeeded.
    async fn remove(&self, entry_id: EntryId) -> Result<()>;

    /// Count a failed replay against an entry.
    async fn record_failure(&self, entry_id: EntryId) -> Result<()>;

    /// Number of pending entries.
    async fn pending_count(&self) -> Result<usize>;
}

/// Local writes mirrored into the queue.
#[async_trait]
pub trait LocalWrites: RecordStore + MutationQueue {
    /// Apply a mutation to the record store and enqueue it atomically:
    /// either both land or neither does.
    ///
    /// Creates and updates upsert the payload, stamped as saved at the
    /// returned entry's `enqueued_at`; deletes remove the record.
    async fn apply_local(&self, mutation: Mutation) -> Result<QueueEntry>;
}

/// Current time in milliseconds since epoch.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
