//! In-memory storage backend.

use super::{now_millis, LocalWrites, MutationQueue, RecordStore};
use crate::error::Result;
use async_trait::async_trait;
use cask_engine::{EntryId, MemoryState, Mutation, QueueEntry, Record, Schema};
use tokio::sync::Mutex;

/// Records and queue kept in process memory. Nothing survives a restart.
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    /// Create an empty store for the given schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            state: Mutex::new(MemoryState::new(schema)),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn save(&self, table: &str, record: Record) -> Result<Record> {
        let mut state = self.state.lock().await;
        Ok(state.save(table, record, now_millis())?)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>> {
        Ok(self.state.lock().await.get(table, id)?)
    }

    async fn get_all(&self, table: &str) -> Result<Vec<Record>> {
        Ok(self.state.lock().await.all(table)?)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        Ok(self.state.lock().await.delete(table, id)?)
    }

    async fn clear_all(&self) -> Result<()> {
        self.state.lock().await.clear_all();
        Ok(())
    }
}

#[async_trait]
impl MutationQueue for MemoryStorage {
    async fn enqueue(&self, mutation: Mutation) -> Result<QueueEntry> {
        let mut state = self.state.lock().await;
        Ok(state.enqueue(mutation, now_millis())?)
    }

    async fn list_pending(&self) -> Result<Vec<QueueEntry>> {
        Ok(self.state.lock().await.pending().to_vec())
    }

    async fn remove(&self, entry_id: EntryId) -> Result<()> {
        self.state.lock().await.remove_entry(entry_id);
        Ok(())
    }

    async fn record_failure(&self, entry_id: EntryId) -> Result<()> {
        self.state.lock().await.record_failure(entry_id);
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.state.lock().await.pending_count())
    }
}

#[async_trait]
impl LocalWrites for MemoryStorage {
    async fn apply_local(&self, mutation: Mutation) -> Result<QueueEntry> {
        let mut state = self.state.lock().await;
        Ok(state.apply(mutation, now_millis())?)
    }
}
