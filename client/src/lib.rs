//! # Cask Client
//!
//! The offline-first half of Cask: a durable local record store, a durable
//! mutation queue, connectivity tracking, and the orchestrator that replays
//! queued writes against the remote record service.
//!
//! ## Flow
//!
//! 1. A UI write ([`SyncClient::create`], [`SyncClient::update`],
//!    [`SyncClient::delete`]) lands in the [`RecordStore`] and is mirrored as
//!    a [`MutationQueue`] entry
//! 2. The [`SyncOrchestrator`] drains the queue when connectivity returns,
//!    every few minutes while online, and on request
//! 3. Reads blend remote results with local records through the
//!    [`MergeLayer`]; local copies win
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cask_client::{
//!     ConnectivityMonitor, HttpRemote, ManualSignal, SqliteStorage, SyncClient, SyncConfig,
//!     SyncOrchestrator,
//! };
//! use cask_engine::Schema;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::load()?;
//! let storage = Arc::new(SqliteStorage::open(&config.database_path, Schema::whiskey_collection()).await?);
//! let remote = Arc::new(HttpRemote::new(&config.remote_url, config.request_timeout)?);
//! let signal = ManualSignal::new_shared(true);
//! let connectivity = ConnectivityMonitor::watch(signal.clone());
//!
//! let orchestrator = SyncOrchestrator::new(storage.clone(), remote, connectivity.clone())
//!     .with_interval(config.sync_interval);
//! let client = SyncClient::with_orchestrator(storage, orchestrator, connectivity);
//! let _triggers = client.start();
//!
//! client.create("whiskeys", json!({"name": "Ardbeg 10", "distillery": "Ardbeg"})).await?;
//! println!("{} writes waiting for sync", client.pending_count().await?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod remote;
pub mod storage;

pub use client::SyncClient;
pub use config::{ConfigError, SyncConfig};
pub use connectivity::{
    ConnectivityChange, ConnectivityMonitor, ManualSignal, NetworkEvent, NetworkSignal,
    SubscriptionId,
};
pub use error::{Error, Result};
pub use merge::MergeLayer;
pub use orchestrator::{
    DrainOutcome, DrainReport, DrainTrigger, SyncHandle, SyncOrchestrator, SyncState, SyncStats,
};
pub use remote::{HttpRemote, RemoteError, RemoteService};
pub use storage::{LocalWrites, MemoryStorage, MutationQueue, RecordStore, SqliteStorage};
