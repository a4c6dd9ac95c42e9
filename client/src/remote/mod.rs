//! Boundary with the remote system of record.

mod http;

pub use http::HttpRemote;

use async_trait::async_trait;
use cask_engine::Record;

/// Why a remote call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The service could not be reached (connection refused, timeout, DNS).
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The service answered with an error status.
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The service answered with something that is not a record.
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),

    #[error("invalid remote url: {0}")]
    InvalidUrl(String),
}

/// Record-oriented remote service, generic over table name.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Insert a record. Returns the record as stored remotely.
    async fn insert(&self, table: &str, record: &Record) -> Result<Record, RemoteError>;

    /// Apply `patch` to the record with `id`. Returns the updated record.
    async fn update(&self, table: &str, id: &str, patch: &Record) -> Result<Record, RemoteError>;

    /// Delete the record with `id`.
    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError>;
}
