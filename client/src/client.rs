//! `SyncClient`: the write and read paths the UI calls.
//!
//! Every write goes to the local store first, so the UI can render it at
//! once, and is mirrored as a mutation queue entry for later replay. The
//! record change and its queue entry are written atomically.
//! Storage errors on these paths propagate to the caller; remote errors
//! never do.

use std::sync::Arc;

use cask_engine::{Mutation, Record};
use serde_json::Value;
use tracing::debug;

use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::merge::MergeLayer;
use crate::orchestrator::{DrainOutcome, SyncHandle, SyncOrchestrator, SyncStats};
use crate::remote::RemoteService;
use crate::storage::{LocalWrites, MutationQueue, RecordStore};

/// Offline-first access to the collection.
pub struct SyncClient<S> {
    storage: Arc<S>,
    orchestrator: Arc<SyncOrchestrator>,
    merge: MergeLayer,
    connectivity: Arc<ConnectivityMonitor>,
}

impl<S> SyncClient<S>
where
    S: LocalWrites + 'static,
{
    /// Wire a storage backend, a remote service and a connectivity monitor.
    pub fn new(
        storage: Arc<S>,
        remote: Arc<dyn RemoteService>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let orchestrator = SyncOrchestrator::new(storage.clone(), remote, connectivity.clone());
        Self::with_orchestrator(storage, orchestrator, connectivity)
    }

    /// Wire a pre-configured orchestrator (custom timer period).
    ///
    /// The orchestrator must drain the same queue as `storage`.
    pub fn with_orchestrator(
        storage: Arc<S>,
        orchestrator: SyncOrchestrator,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let merge = MergeLayer::new(storage.clone());
        Self {
            storage,
            orchestrator: Arc::new(orchestrator),
            merge,
            connectivity,
        }
    }

    /// Create a record. A UUID `id` is assigned when the value has none.
    ///
    /// Returns the record as saved locally.
    pub async fn create(&self, table: &str, value: Value) -> Result<Record> {
        let mut record = with_generated_id(value)?;
        let entry = self
            .storage
            .apply_local(Mutation::create(table, record.clone()))
            .await?;
        record.stamp_local(entry.enqueued_at);
        debug!(table, id = %record.id(), "Created record locally");
        Ok(record)
    }

    /// Replace a record's fields. The value must carry its `id`.
    pub async fn update(&self, table: &str, value: Value) -> Result<Record> {
        let mut record = Record::from_value(value)?;
        let entry = self
            .storage
            .apply_local(Mutation::update(table, record.clone()))
            .await?;
        record.stamp_local(entry.enqueued_at);
        debug!(table, id = %record.id(), "Updated record locally");
        Ok(record)
    }

    /// Delete a record.
    pub async fn delete(&self, table: &str, id: &str) -> Result<()> {
        self.storage
            .apply_local(Mutation::delete(table, id)?)
            .await?;
        debug!(table, id, "Deleted record locally");
        Ok(())
    }

    /// Get a locally stored record.
    pub async fn get(&self, table: &str, id: &str) -> Result<Option<Record>> {
        self.storage.get(table, id).await
    }

    /// All locally stored records of a table.
    pub async fn list(&self, table: &str) -> Result<Vec<Record>> {
        self.storage.get_all(table).await
    }

    /// Blend a remote read with local records for display.
    pub async fn merged(&self, table: &str, remote: Vec<Record>) -> Result<Vec<Record>> {
        self.merge.merge(table, remote).await
    }

    /// Number of writes not yet confirmed by the remote service.
    pub async fn pending_count(&self) -> Result<usize> {
        self.storage.pending_count().await
    }

    /// Drain the queue now ("sync now").
    pub async fn sync_now(&self) -> DrainOutcome {
        self.orchestrator.drain().await
    }

    /// Start the connectivity and timer triggers.
    pub fn start(&self) -> SyncHandle {
        self.orchestrator.spawn()
    }

    /// Wipe all local state, including unsynced writes.
    pub async fn reset(&self) -> Result<()> {
        self.storage.clear_all().await
    }

    /// Whether the device is currently online.
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Orchestrator statistics.
    pub fn stats(&self) -> SyncStats {
        self.orchestrator.stats()
    }

    /// The storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

/// Parse a record, generating a UUID v4 id when none is present.
fn with_generated_id(value: Value) -> Result<Record> {
    match value.get("id") {
        None | Some(Value::Null) => {
            Ok(Record::new(uuid::Uuid::new_v4().to_string(), value)?)
        }
        Some(_) => Ok(Record::from_value(value)?),
    }
}
