//! Mutation and queue entry types.
//!
//! Local writes are described as mutations, not applied remotely in place.
//! A mutation persisted in the queue becomes a [`QueueEntry`] that the sync
//! orchestrator replays once the remote service is reachable.

use crate::{error::Result, EntryId, Error, Record, TableName, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

/// Kind of remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Stable lowercase name, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(Error::UnknownOperation(other.to_string())),
        }
    }
}

/// An intended remote write, before it is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Target table
    pub table: TableName,
    /// What to do
    pub operation: Operation,
    /// Full record for create/update, `{id}` for delete
    pub payload: Record,
}

impl Mutation {
    /// Create a record remotely. Local bookkeeping fields are dropped.
    pub fn create(table: impl Into<TableName>, record: Record) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Create,
            payload: record.without_local_markers(),
        }
    }

    /// Replace a record's fields remotely. Local bookkeeping fields are dropped.
    pub fn update(table: impl Into<TableName>, record: Record) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Update,
            payload: record.without_local_markers(),
        }
    }

    /// Delete a record remotely. The payload is the minimal `{id}` shape.
    pub fn delete(table: impl Into<TableName>, id: impl Into<String>) -> Result<Self> {
        let payload = Record::from_value(json!({ "id": id.into() }))?;
        Ok(Self {
            table: table.into(),
            operation: Operation::Delete,
            payload,
        })
    }

    /// Rebuild a mutation from persisted parts, enforcing payload shape.
    pub fn from_parts(
        table: impl Into<TableName>,
        operation: Operation,
        payload: Record,
    ) -> Result<Self> {
        let mutation = Self {
            table: table.into(),
            operation,
            payload,
        };
        mutation.validate_payload()?;
        Ok(mutation)
    }

    /// The id of the record this mutation targets.
    pub fn record_id(&self) -> &str {
        self.payload.id()
    }

    /// Check the payload shape matches the operation.
    pub fn validate_payload(&self) -> Result<()> {
        if self.operation == Operation::Delete && self.payload.fields().len() != 1 {
            return Err(Error::InvalidOperation(format!(
                "delete payload for '{}' must only carry the id",
                self.record_id()
            )));
        }
        Ok(())
    }
}

/// A persisted mutation waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Auto-incrementing queue id
    pub entry_id: EntryId,
    /// Target table
    pub table_name: TableName,
    /// What to do
    pub operation: Operation,
    /// Full record for create/update, `{id}` for delete
    pub payload: Record,
    /// When the entry was enqueued (milliseconds since epoch)
    pub enqueued_at: Timestamp,
    /// Failed replay attempts so far
    pub retry_count: u32,
}

impl QueueEntry {
    /// Build a fresh entry from a mutation.
    pub fn new(entry_id: EntryId, mutation: Mutation, enqueued_at: Timestamp) -> Self {
        Self {
            entry_id,
            table_name: mutation.table,
            operation: mutation.operation,
            payload: mutation.payload,
            enqueued_at,
            retry_count: 0,
        }
    }

    /// The id of the record this entry targets.
    pub fn record_id(&self) -> &str {
        self.payload.id()
    }
}
