//! Error types for the Cask engine.

use crate::TableName;
use thiserror::Error;

/// All possible errors from the Cask engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Schema errors
    #[error("unknown table: {0}")]
    UnknownTable(TableName),

    #[error("table name is reserved: {0}")]
    ReservedTable(TableName),

    #[error("table declared twice: {0}")]
    DuplicateTable(TableName),

    #[error("invalid identifier '{0}': expected lowercase letters, digits and underscores")]
    InvalidName(String),

    // Record errors
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("record is missing a string 'id' field")]
    MissingId,

    // Queue errors
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("unknown operation kind: {0}")]
    UnknownOperation(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
