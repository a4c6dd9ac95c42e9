//! Sync orchestrator: replays the mutation queue against the remote service.
//!
//! # Drain
//!
//! 1. Skip when offline or when a drain is already running
//! 2. Snapshot the pending entries (entries enqueued meanwhile wait for the
//!    next pass)
//! 3. Replay entries one at a time, in queue order; remove each entry only
//!    after its remote call succeeded, leave failed entries in place
//! 4. Return to idle and record the completion time
//!
//! Drains are started by a false→true connectivity edge, by a periodic timer
//! while online, and by explicit requests. All paths share one `draining`
//! flag; a trigger that finds it set is dropped, not queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cask_engine::{Operation, QueueEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_SYNC_INTERVAL;
use crate::connectivity::ConnectivityMonitor;
use crate::remote::{RemoteError, RemoteService};
use crate::storage::MutationQueue;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Draining,
}

/// What started a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    /// Connectivity went from offline to online
    Reconnected,
    /// Periodic timer
    Timer,
    /// Explicit caller request
    Manual,
}

/// Counts from one completed drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Entries in the snapshot
    pub attempted: usize,
    /// Entries replayed and removed
    pub synced: usize,
    /// Entries left in place, because the replay failed or the replayed
    /// entry could not be removed
    pub failed: usize,
}

/// Result of asking for a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Not attempted: the device is offline
    Offline,
    /// Not attempted: another drain is in flight
    AlreadyDraining,
    /// The queue could not be read; nothing was replayed
    StorageUnavailable,
    /// The pass ran over its snapshot
    Completed(DrainReport),
}

/// Observable orchestrator statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub state: SyncState,
    /// Drain passes started since construction
    pub passes: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Clears the draining flag on every exit path.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the mutation queue against the remote service.
pub struct SyncOrchestrator {
    queue: Arc<dyn MutationQueue>,
    remote: Arc<dyn RemoteService>,
    connectivity: Arc<ConnectivityMonitor>,
    interval: Duration,
    draining: AtomicBool,
    passes: AtomicU64,
    last_synced_at: Mutex<Option<DateTime<Utc>>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator with the default 5 minute timer.
    pub fn new(
        queue: Arc<dyn MutationQueue>,
        remote: Arc<dyn RemoteService>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            queue,
            remote,
            connectivity,
            interval: DEFAULT_SYNC_INTERVAL,
            draining: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            last_synced_at: Mutex::new(None),
        }
    }

    /// Builder-style method to change the timer period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        if self.draining.load(Ordering::Acquire) {
            SyncState::Draining
        } else {
            SyncState::Idle
        }
    }

    /// When the last drain pass completed.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at.lock().ok().and_then(|guard| *guard)
    }

    /// Get current stats.
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            state: self.state(),
            passes: self.passes.load(Ordering::Relaxed),
            last_synced_at: self.last_synced_at(),
        }
    }

    /// Drain the queue now, on behalf of a caller.
    pub async fn drain(&self) -> DrainOutcome {
        self.drain_for(DrainTrigger::Manual).await
    }

    /// Drain the queue, tagging logs with what triggered the pass.
    pub async fn drain_for(&self, trigger: DrainTrigger) -> DrainOutcome {
        if !self.connectivity.is_online() {
            debug!(?trigger, "Skipping drain: offline");
            return DrainOutcome::Offline;
        }
        if self.draining.swap(true, Ordering::AcqRel) {
            debug!(?trigger, "Skipping drain: already draining");
            return DrainOutcome::AlreadyDraining;
        }
        let _guard = DrainGuard(&self.draining);
        self.passes.fetch_add(1, Ordering::Relaxed);

        let entries = match self.queue.list_pending().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?trigger, error = %e, "Drain aborted: cannot read mutation queue");
                return DrainOutcome::StorageUnavailable;
            }
        };

        let mut report = DrainReport {
            attempted: entries.len(),
            ..DrainReport::default()
        };
        if !entries.is_empty() {
            info!(?trigger, pending = entries.len(), "Starting drain");
        }

        for entry in &entries {
            match self.replay(entry).await {
                Ok(()) => match self.queue.remove(entry.entry_id).await {
                    Ok(()) => {
                        report.synced += 1;
                        debug!(
                            entry_id = entry.entry_id,
                            table = %entry.table_name,
                            operation = %entry.operation,
                            "Replayed queue entry"
                        );
                    }
                    Err(e) => {
                        // Still queued: it will be replayed again on the next pass.
                        report.failed += 1;
                        warn!(entry_id = entry.entry_id, error = %e, "Replayed entry could not be removed");
                    }
                },
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        entry_id = entry.entry_id,
                        table = %entry.table_name,
                        operation = %entry.operation,
                        retry_count = entry.retry_count.saturating_add(1),
                        error = %e,
                        "Replay failed, entry stays queued"
                    );
                    if let Err(e) = self.queue.record_failure(entry.entry_id).await {
                        warn!(entry_id = entry.entry_id, error = %e, "Could not record replay failure");
                    }
                }
            }
        }

        if let Ok(mut last) = self.last_synced_at.lock() {
            *last = Some(Utc::now());
        }
        if report.attempted > 0 {
            info!(
                synced = report.synced,
                failed = report.failed,
                "Drain complete"
            );
        }
        DrainOutcome::Completed(report)
    }

    async fn replay(&self, entry: &QueueEntry) -> Result<(), RemoteError> {
        let table = &entry.table_name;
        match entry.operation {
            Operation::Create => self.remote.insert(table, &entry.payload).await.map(drop),
            Operation::Update => self
                .remote
                .update(table, entry.record_id(), &entry.payload)
                .await
                .map(drop),
            Operation::Delete => self.remote.delete(table, entry.record_id()).await,
        }
    }

    /// Start a drain in its own task, so triggers never wait on each other.
    fn trigger(self: &Arc<Self>, trigger: DrainTrigger) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.drain_for(trigger).await;
        });
    }

    /// Run the connectivity and timer triggers in the background.
    ///
    /// Must be called within a Tokio runtime. Dropping the handle stops the
    /// triggers; a drain already in flight runs to completion.
    pub fn spawn(self: &Arc<Self>) -> SyncHandle {
        let (subscription, mut changes) = self.connectivity.subscribe();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let orchestrator = Arc::clone(self);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    change = changes.recv() => match change {
                        Some(change) if change.online => orchestrator.trigger(DrainTrigger::Reconnected),
                        Some(_) => {}
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if orchestrator.connectivity.is_online() {
                            orchestrator.trigger(DrainTrigger::Timer);
                        }
                    }
                }
            }

            orchestrator.connectivity.unsubscribe(&subscription);
            debug!("Sync triggers stopped");
        });

        info!(interval_secs = period.as_secs(), "Sync triggers started");
        SyncHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to the background trigger loop.
#[derive(Debug)]
pub struct SyncHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the triggers and wait for the loop to exit.
    pub async fn shutdown(self) {
        let SyncHandle { shutdown, task } = self;
        let _ = shutdown.send(());
        let _ = task.await;
    }
}
