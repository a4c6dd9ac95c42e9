//! # Cask Engine
//!
//! Domain types and pure logic for the Cask offline-first sync engine.
//!
//! The engine knows what a record, a pending mutation and a table schema
//! are, and how a remote result set is blended with local edits. It never
//! touches disk or network: storage backends, connectivity and replay live
//! in `cask-client`.
//!
//! ## Design Principles
//!
//! - **No IO**: timestamps are passed in, nothing is read from the platform
//! - **Deterministic**: same inputs, same outputs
//! - **Shared**: the client and the reference server use the same types
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a JSON object with a mandatory string `id`. Records saved
//! locally carry a local-origin marker and a save timestamp, see
//! [`Record::stamp_local`].
//!
//! ### Mutations and queue entries
//!
//! Every write the UI makes is described by a [`Mutation`]
//! (create, update or delete against a table). Once persisted in the
//! mutation queue it becomes a [`QueueEntry`] with an auto-incrementing id.
//!
//! ### Schema
//!
//! A [`Schema`] declares the logical tables and their secondary indexes.
//! [`Schema::whiskey_collection`] is the built-in schema of the tracker.
//!
//! ### Merge
//!
//! [`merge`] combines a remote read with local records, local copy wins.
//!
//! ## Quick Start
//!
//! ```rust
//! use cask_engine::{merge, MemoryState, Mutation, Record, Schema};
//! use serde_json::json;
//!
//! let mut state = MemoryState::new(Schema::whiskey_collection());
//!
//! // Save locally and queue the remote write
//! let record = Record::from_value(json!({"id": "p1", "price": 89.0})).unwrap();
//! state.save("purchases", record.clone(), 1_706_745_600_000).unwrap();
//! state
//!     .enqueue(Mutation::create("purchases", record), 1_706_745_600_000)
//!     .unwrap();
//! assert_eq!(state.pending_count(), 1);
//!
//! // Blend a remote read with local state
//! let remote = vec![Record::from_value(json!({"id": "p0", "price": 40.0})).unwrap()];
//! let merged = merge(remote, state.all("purchases").unwrap());
//! assert_eq!(merged.records.len(), 2);
//! ```

pub mod error;
pub mod memory;
pub mod merge;
pub mod operation;
pub mod record;
pub mod schema;

// Re-export main types at crate root
pub use error::Error;
pub use memory::{MemoryState, Table};
pub use merge::{merge, MergeResult};
pub use operation::{Mutation, Operation, QueueEntry};
pub use record::{Record, LOCAL_MARKER, LOCAL_SAVED_AT};
pub use schema::{IndexDef, Schema, TableSchema, QUEUE_TABLE};

/// Type aliases for clarity
pub type RecordId = String;
pub type TableName = String;
pub type EntryId = i64;
/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
pub type SchemaVersion = u32;
