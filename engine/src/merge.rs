//! Merging remote reads with local state.
//!
//! # Algorithm
//!
//! 1. Start from the remote records, keeping their order
//! 2. For each local record, replace the remote record with the same id
//!    in place, or append it when the remote side has no such id
//! 3. Return the combined list
//!
//! The local copy always wins. Records written while offline are not yet
//! known to the remote service, so they must supersede a stale or missing
//! remote copy until the replay is confirmed. There is no version or
//! timestamp comparison: a record edited both locally and remotely before
//! sync silently shows the local copy.

use crate::{Record, RecordId};
use serde::Serialize;
use std::collections::HashMap;

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// Display list: remote order, local copies in place, local-only appended
    pub records: Vec<Record>,
    /// Remote records that were superseded by a local copy
    pub replaced: usize,
    /// Local records with no remote counterpart
    pub appended: usize,
}

impl MergeResult {
    /// Take the merged records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Merge a remote result set with the local records of the same table.
pub fn merge(remote: Vec<Record>, local: impl IntoIterator<Item = Record>) -> MergeResult {
    let mut records = remote;

    // Position of each id in the output. With duplicate remote ids the
    // first occurrence is the one replaced.
    let mut positions: HashMap<RecordId, usize> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        positions.entry(record.id().to_string()).or_insert(i);
    }

    let mut replaced = 0;
    let mut appended = 0;
    for record in local {
        match positions.get(record.id()) {
            Some(&i) => {
                records[i] = record;
                replaced += 1;
            }
            None => {
                positions.insert(record.id().to_string(), records.len());
                records.push(record);
                appended += 1;
            }
        }
    }

    MergeResult {
        records,
        replaced,
        appended,
    }
}
