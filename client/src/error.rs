//! Error types for the local side of sync.

use cask_engine::SchemaVersion;

/// Errors surfaced by the local record store and mutation queue.
///
/// Remote failures never show up here: the orchestrator contains them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("local store has schema version {found}, this build only knows up to {supported}")]
    SchemaTooNew {
        found: i64,
        supported: SchemaVersion,
    },

    #[error("corrupt row in '{table}': {reason}")]
    CorruptRow { table: String, reason: String },

    #[error(transparent)]
    Engine(#[from] cask_engine::Error),
}

/// Result type alias for local store operations.
pub type Result<T> = std::result::Result<T, Error>;
