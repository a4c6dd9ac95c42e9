//! Integration tests for the offline write path and queue replay.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cask_client::{
    ConnectivityMonitor, DrainOutcome, DrainReport, Error, ManualSignal, MemoryStorage,
    MutationQueue, RecordStore, RemoteError, RemoteService, SqliteStorage, SyncClient,
    SyncOrchestrator, SyncState,
};
use cask_engine::{Mutation, Operation, Record, Schema};
use serde_json::{json, Value};
use tokio::sync::Notify;

/// A remote call as seen by the test double.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    operation: Operation,
    table: String,
    id: String,
}

/// Records every call; rejects calls for ids listed in `reject`.
#[derive(Default)]
struct ScriptedRemote {
    calls: Mutex<Vec<Call>>,
    reject: Mutex<HashSet<String>>,
    unreachable: Mutex<bool>,
}

impl ScriptedRemote {
    fn rejecting(ids: &[&str]) -> Self {
        let remote = Self::default();
        remote
            .reject
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
        remote
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn accept_all(&self) {
        self.reject.lock().unwrap().clear();
        *self.unreachable.lock().unwrap() = false;
    }

    fn answer(&self, operation: Operation, table: &str, id: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(Call {
            operation,
            table: table.to_string(),
            id: id.to_string(),
        });
        if *self.unreachable.lock().unwrap() {
            return Err(RemoteError::Unreachable("connection refused".into()));
        }
        if self.reject.lock().unwrap().contains(id) {
            return Err(RemoteError::Rejected {
                status: 422,
                message: format!("cannot accept {id}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteService for ScriptedRemote {
    async fn insert(&self, table: &str, record: &Record) -> Result<Record, RemoteError> {
        self.answer(Operation::Create, table, record.id())?;
        Ok(record.clone())
    }

    async fn update(&self, table: &str, id: &str, patch: &Record) -> Result<Record, RemoteError> {
        self.answer(Operation::Update, table, id)?;
        Ok(patch.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        self.answer(Operation::Delete, table, id)
    }
}

/// Holds every insert until released, to keep a drain in flight.
struct GatedRemote {
    entered: Notify,
    release: Notify,
    inner: ScriptedRemote,
}

#[async_trait]
impl RemoteService for GatedRemote {
    async fn insert(&self, table: &str, record: &Record) -> Result<Record, RemoteError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.insert(table, record).await
    }

    async fn update(&self, table: &str, id: &str, patch: &Record) -> Result<Record, RemoteError> {
        self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        self.inner.delete(table, id).await
    }
}

fn rec(value: Value) -> Record {
    Record::from_value(value).unwrap()
}

fn memory() -> Arc<MemoryStorage> {
    Arc::new(MemoryStorage::new(Schema::whiskey_collection()))
}

async fn pending_ids(queue: &dyn MutationQueue) -> Vec<String> {
    queue
        .list_pending()
        .await
        .unwrap()
        .iter()
        .map(|e| e.record_id().to_string())
        .collect()
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cask.db");

    let store = SqliteStorage::open(&path, Schema::whiskey_collection())
        .await
        .unwrap();
    let record = rec(json!({"id": "p-1", "whiskey_id": "w-1", "price": 64.99}));
    store.save("purchases", record.clone()).await.unwrap();
    let entry = store
        .enqueue(Mutation::create("purchases", record))
        .await
        .unwrap();
    store.close().await;

    let reopened = SqliteStorage::open(&path, Schema::whiskey_collection())
        .await
        .unwrap();
    let pending = reopened.list_pending().await.unwrap();

    assert_eq!(pending, vec![entry]);
    let local = reopened.get("purchases", "p-1").await.unwrap().unwrap();
    assert_eq!(local.get("price"), Some(&json!(64.99)));
    assert!(local.is_local());
}

// ============================================================================
// Drain behavior
// ============================================================================

#[tokio::test]
async fn successful_drain_empties_queue_in_order() {
    let storage = memory();
    let remote = Arc::new(ScriptedRemote::default());
    let orchestrator =
        SyncOrchestrator::new(storage.clone(), remote.clone(), ConnectivityMonitor::new(true));

    storage
        .enqueue(Mutation::create("whiskeys", rec(json!({"id": "w-1", "name": "Talisker 10"}))))
        .await
        .unwrap();
    storage
        .enqueue(Mutation::update("whiskeys", rec(json!({"id": "w-1", "name": "Talisker 18"}))))
        .await
        .unwrap();
    storage
        .enqueue(Mutation::delete("whiskeys", "w-1").unwrap())
        .await
        .unwrap();

    let outcome = orchestrator.drain().await;

    assert_eq!(
        outcome,
        DrainOutcome::Completed(DrainReport {
            attempted: 3,
            synced: 3,
            failed: 0
        })
    );
    assert_eq!(storage.pending_count().await.unwrap(), 0);
    let operations: Vec<_> = remote.calls().iter().map(|c| c.operation).collect();
    assert_eq!(
        operations,
        vec![Operation::Create, Operation::Update, Operation::Delete]
    );
    assert!(remote.calls().iter().all(|c| c.table == "whiskeys" && c.id == "w-1"));
    assert!(orchestrator.last_synced_at().is_some());
}

#[tokio::test]
async fn failed_entry_stays_in_place() {
    let storage = memory();
    let remote = Arc::new(ScriptedRemote::rejecting(&["n-2"]));
    let orchestrator =
        SyncOrchestrator::new(storage.clone(), remote.clone(), ConnectivityMonitor::new(true));

    for id in ["n-1", "n-2", "n-3"] {
        storage
            .enqueue(Mutation::create("personal_notes", rec(json!({"id": id}))))
            .await
            .unwrap();
    }

    let outcome = orchestrator.drain().await;
    assert_eq!(
        outcome,
        DrainOutcome::Completed(DrainReport {
            attempted: 3,
            synced: 2,
            failed: 1
        })
    );

    // Each entry was sent exactly once, the failure was not retried in-pass.
    let sent: Vec<_> = remote.calls().into_iter().map(|c| c.id).collect();
    assert_eq!(sent, vec!["n-1", "n-2", "n-3"]);

    // The failed entry keeps its place ahead of newer entries.
    storage
        .enqueue(Mutation::create("personal_notes", rec(json!({"id": "n-4"}))))
        .await
        .unwrap();
    assert_eq!(pending_ids(&*storage).await, vec!["n-2", "n-4"]);
    assert_eq!(storage.list_pending().await.unwrap()[0].retry_count, 1);

    // Next pass replays the survivors in queue order.
    remote.accept_all();
    orchestrator.drain().await;
    let sent: Vec<_> = remote.calls().into_iter().map(|c| c.id).collect();
    assert_eq!(sent, vec!["n-1", "n-2", "n-3", "n-2", "n-4"]);
    assert_eq!(storage.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn unreachable_remote_leaves_queue_unchanged() {
    let storage = memory();
    let remote = Arc::new(ScriptedRemote::default());
    *remote.unreachable.lock().unwrap() = true;
    let orchestrator =
        SyncOrchestrator::new(storage.clone(), remote.clone(), ConnectivityMonitor::new(true));

    for id in ["c-1", "c-2"] {
        storage
            .enqueue(Mutation::create("collection_items", rec(json!({"id": id}))))
            .await
            .unwrap();
    }
    let before = storage.list_pending().await.unwrap();

    let outcome = orchestrator.drain().await;

    assert_eq!(
        outcome,
        DrainOutcome::Completed(DrainReport {
            attempted: 2,
            synced: 0,
            failed: 2
        })
    );
    let after = storage.list_pending().await.unwrap();
    let ids = |entries: &[cask_engine::QueueEntry]| -> Vec<i64> {
        entries.iter().map(|e| e.entry_id).collect()
    };
    assert_eq!(ids(&after), ids(&before));
    assert_eq!(orchestrator.state(), SyncState::Idle);
}

#[tokio::test]
async fn concurrent_drain_is_dropped() {
    let storage = memory();
    let remote = Arc::new(GatedRemote {
        entered: Notify::new(),
        release: Notify::new(),
        inner: ScriptedRemote::default(),
    });
    let orchestrator = Arc::new(SyncOrchestrator::new(
        storage.clone(),
        remote.clone(),
        ConnectivityMonitor::new(true),
    ));
    storage
        .enqueue(Mutation::create("whiskeys", rec(json!({"id": "w-1"}))))
        .await
        .unwrap();

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.drain().await }
    });
    remote.entered.notified().await;

    assert_eq!(orchestrator.state(), SyncState::Draining);
    assert_eq!(orchestrator.drain().await, DrainOutcome::AlreadyDraining);

    remote.release.notify_one();
    let outcome = first.await.unwrap();

    assert!(matches!(outcome, DrainOutcome::Completed(r) if r.synced == 1));
    assert_eq!(remote.inner.calls().len(), 1);
    assert_eq!(orchestrator.stats().passes, 1);
    assert_eq!(orchestrator.state(), SyncState::Idle);
}

// ============================================================================
// Triggers
// ============================================================================

#[tokio::test]
async fn reconnect_triggers_exactly_one_drain() {
    let signal = ManualSignal::new_shared(false);
    let connectivity = ConnectivityMonitor::watch(signal.clone());
    let storage = memory();
    let remote = Arc::new(ScriptedRemote::default());
    let client = SyncClient::new(storage.clone(), remote.clone(), connectivity);
    let triggers = client.start();

    client
        .create("tasting_notes", json!({"id": "t-1", "purchase_id": "p-1"}))
        .await
        .unwrap();
    client
        .create("tasting_notes", json!({"id": "t-2", "purchase_id": "p-1"}))
        .await
        .unwrap();
    assert_eq!(client.sync_now().await, DrainOutcome::Offline);

    signal.set_reachable(true);

    tokio::time::timeout(Duration::from_secs(5), async {
        while client.pending_count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue drained after reconnect");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(client.is_online());
    assert_eq!(client.stats().passes, 1);
    assert_eq!(remote.calls().len(), 2);

    triggers.shutdown().await;
}

#[tokio::test]
async fn going_offline_does_not_drain() {
    let signal = ManualSignal::new_shared(true);
    let connectivity = ConnectivityMonitor::watch(signal.clone());
    let storage = memory();
    let client = SyncClient::new(storage, Arc::new(ScriptedRemote::default()), connectivity);
    let triggers = client.start();

    client
        .create("whiskeys", json!({"id": "w-1"}))
        .await
        .unwrap();
    signal.set_reachable(false);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!client.is_online());
    assert_eq!(client.stats().passes, 0);
    assert_eq!(client.pending_count().await.unwrap(), 1);

    triggers.shutdown().await;
}

#[tokio::test]
async fn timer_drains_while_online() {
    let storage = memory();
    let remote = Arc::new(ScriptedRemote::default());
    let connectivity = ConnectivityMonitor::new(true);
    let orchestrator = SyncOrchestrator::new(storage.clone(), remote.clone(), connectivity.clone())
        .with_interval(Duration::from_millis(20));
    let client = SyncClient::with_orchestrator(storage, orchestrator, connectivity);
    let triggers = client.start();

    client
        .create("purchases", json!({"id": "p-9", "whiskey_id": "w-1"}))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while client.pending_count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue drained by timer");

    triggers.shutdown().await;
    assert!(client.stats().passes >= 1);
    assert_eq!(remote.calls()[0].id, "p-9");
}

// ============================================================================
// SyncClient write and read paths
// ============================================================================

#[tokio::test]
async fn offline_create_is_visible_immediately() {
    let storage = memory();
    let client = SyncClient::new(
        storage,
        Arc::new(ScriptedRemote::default()),
        ConnectivityMonitor::new(false),
    );

    let saved = client
        .create("whiskeys", json!({"name": "Glendronach 15", "distillery": "Glendronach"}))
        .await
        .unwrap();

    let all = client.list("whiskeys").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id(), saved.id());
    assert!(all[0].is_local());
    assert_eq!(client.pending_count().await.unwrap(), 1);

    // The queued payload carries the generated id but no local markers.
    let pending = client.storage().list_pending().await.unwrap();
    assert_eq!(pending[0].operation, Operation::Create);
    assert_eq!(pending[0].record_id(), saved.id());
    assert!(!pending[0].payload.is_local());
}

#[tokio::test]
async fn update_and_delete_paths() {
    let storage = memory();
    let remote = Arc::new(ScriptedRemote::default());
    let client = SyncClient::new(storage, remote.clone(), ConnectivityMonitor::new(true));

    let created = client
        .create("purchases", json!({"id": "p-1", "price": 70}))
        .await
        .unwrap();

    // Updating a record read back from the store keeps the markers local.
    let mut edited = client.get("purchases", "p-1").await.unwrap().unwrap();
    edited.set("price", json!(65)).unwrap();
    client.update("purchases", edited.into_value()).await.unwrap();
    assert_eq!(
        client.get("purchases", "p-1").await.unwrap().unwrap().get("price"),
        Some(&json!(65))
    );

    client.delete("purchases", created.id()).await.unwrap();
    assert_eq!(client.get("purchases", "p-1").await.unwrap(), None);

    let pending = client.storage().list_pending().await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(!pending[1].payload.is_local());
    assert_eq!(pending[1].payload.get("price"), Some(&json!(65)));
    assert_eq!(pending[2].payload.clone().into_value(), json!({"id": "p-1"}));

    assert!(matches!(
        client.sync_now().await,
        DrainOutcome::Completed(DrainReport { synced: 3, .. })
    ));
    assert_eq!(client.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn writes_to_unknown_tables_fail() {
    let client = SyncClient::new(
        memory(),
        Arc::new(ScriptedRemote::default()),
        ConnectivityMonitor::new(false),
    );

    assert!(client.create("bottles", json!({"id": "b-1"})).await.is_err());
    assert!(client.update("whiskeys", json!({"name": "no id"})).await.is_err());
    assert_eq!(client.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn merged_read_prefers_local_records() {
    let client = SyncClient::new(
        memory(),
        Arc::new(ScriptedRemote::default()),
        ConnectivityMonitor::new(false),
    );
    client
        .update("purchases", json!({"id": "a", "v": 2}))
        .await
        .unwrap();
    client
        .create("purchases", json!({"id": "b", "v": 1}))
        .await
        .unwrap();

    let merged = client
        .merged("purchases", vec![rec(json!({"id": "a", "v": 1}))])
        .await
        .unwrap();

    let shape: Vec<_> = merged
        .iter()
        .map(|r| (r.id().to_string(), r.get("v").cloned()))
        .collect();
    assert_eq!(
        shape,
        vec![
            ("a".to_string(), Some(json!(2))),
            ("b".to_string(), Some(json!(1)))
        ]
    );
}

#[tokio::test]
async fn sqlite_client_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(
        SqliteStorage::open(dir.path().join("cask.db"), Schema::whiskey_collection())
            .await
            .unwrap(),
    );
    let remote = Arc::new(ScriptedRemote::rejecting(&["w-2"]));
    let client = SyncClient::new(storage, remote.clone(), ConnectivityMonitor::new(true));

    client.create("whiskeys", json!({"id": "w-1"})).await.unwrap();
    client.create("whiskeys", json!({"id": "w-2"})).await.unwrap();

    client.sync_now().await;
    assert_eq!(pending_ids(&**client.storage()).await, vec!["w-2"]);

    client.reset().await.unwrap();
    assert_eq!(client.pending_count().await.unwrap(), 0);
    assert!(client.list("whiskeys").await.unwrap().is_empty());
}

#[tokio::test]
async fn closed_store_fails_writes_and_aborts_drains() {
    let storage = Arc::new(
        SqliteStorage::open_in_memory(Schema::whiskey_collection())
            .await
            .unwrap(),
    );
    let remote = Arc::new(ScriptedRemote::default());
    let client = SyncClient::new(storage.clone(), remote.clone(), ConnectivityMonitor::new(true));
    storage.close().await;

    let created = client.create("whiskeys", json!({"id": "w-1"})).await;
    assert!(matches!(created, Err(Error::StorageUnavailable(_))));
    assert!(matches!(
        client.delete("whiskeys", "w-1").await,
        Err(Error::StorageUnavailable(_))
    ));

    assert_eq!(client.sync_now().await, DrainOutcome::StorageUnavailable);
    assert_eq!(client.stats().state, SyncState::Idle);
    assert_eq!(client.stats().passes, 1);
    assert!(remote.calls().is_empty());
}
