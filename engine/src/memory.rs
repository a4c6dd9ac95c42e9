//! In-memory tables and mutation queue.
//!
//! `MemoryState` holds one [`Table`] per schema table plus the pending
//! queue. It is the state container behind the client's in-memory storage
//! backend and applies the same rules as the durable one: unknown tables
//! are rejected, saves are stamped, entry ids only grow.

use crate::{
    error::Result, EntryId, Error, Mutation, Operation, QueueEntry, Record, RecordId, Schema,
    TableName, Timestamp,
};
use std::collections::{BTreeMap, HashMap};

/// A table of records keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Table {
    records: BTreeMap<RecordId, Record>,
}

impl Table {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.id().to_string(), record);
    }

    /// Remove a record, returning it if it existed.
    pub fn remove(&mut self, id: &str) -> Option<Record> {
        self.records.remove(id)
    }

    /// All records ordered by id.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the table has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Tables and queue held in memory.
#[derive(Debug, Clone)]
pub struct MemoryState {
    /// Schema for validation
    schema: Schema,
    /// Tables by name
    tables: HashMap<TableName, Table>,
    /// Queue entries in insertion order
    queue: Vec<QueueEntry>,
    /// Last entry id handed out
    last_entry_id: EntryId,
}

impl MemoryState {
    /// Create empty state for every table in the schema.
    pub fn new(schema: Schema) -> Self {
        let tables = schema
            .tables()
            .map(|t| (t.name.clone(), Table::new()))
            .collect();

        Self {
            schema,
            tables,
            queue: Vec::new(),
            last_entry_id: 0,
        }
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Upsert a record, stamping it as saved locally at `now`.
    pub fn save(&mut self, table: &str, mut record: Record, now: Timestamp) -> Result<Record> {
        record.stamp_local(now);
        self.table_mut(table)?.insert(record.clone());
        Ok(record)
    }

    /// Get a record by table and ID.
    pub fn get(&self, table: &str, id: &str) -> Result<Option<Record>> {
        Ok(self.table(table)?.get(id).cloned())
    }

    /// All records of a table ordered by id.
    pub fn all(&self, table: &str) -> Result<Vec<Record>> {
        Ok(self.table(table)?.records().cloned().collect())
    }

    /// Remove a record. Absent records are not an error.
    pub fn delete(&mut self, table: &str, id: &str) -> Result<()> {
        self.table_mut(table)?.remove(id);
        Ok(())
    }

    /// Wipe every table and the queue. Entry ids keep growing afterwards.
    pub fn clear_all(&mut self) {
        for table in self.tables.values_mut() {
            table.clear();
        }
        self.queue.clear();
    }

    /// Append a mutation to the queue.
    pub fn enqueue(&mut self, mutation: Mutation, now: Timestamp) -> Result<QueueEntry> {
        self.schema.validate_mutation(&mutation)?;
        self.last_entry_id += 1;
        let entry = QueueEntry::new(self.last_entry_id, mutation, now);
        self.queue.push(entry.clone());
        Ok(entry)
    }

    /// Apply a mutation to its table and enqueue it, as one step.
    ///
    /// Creates and updates upsert the payload, stamped as saved at `now`;
    /// deletes remove the record. A rejected mutation changes nothing.
    pub fn apply(&mut self, mutation: Mutation, now: Timestamp) -> Result<QueueEntry> {
        self.schema.validate_mutation(&mutation)?;
        let table = self.table_mut(&mutation.table)?;
        match mutation.operation {
            Operation::Create | Operation::Update => {
                let mut record = mutation.payload.clone();
                record.stamp_local(now);
                table.insert(record);
            }
            Operation::Delete => {
                table.remove(mutation.record_id());
            }
        }
        self.enqueue(mutation, now)
    }

    /// Pending entries in insertion order.
    pub fn pending(&self) -> &[QueueEntry] {
        &self.queue
    }

    /// Get count of pending entries.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Remove an entry. Returns whether it was present.
    pub fn remove_entry(&mut self, entry_id: EntryId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|e| e.entry_id != entry_id);
        self.queue.len() != before
    }

    /// Count a failed replay of an entry.
    pub fn record_failure(&mut self, entry_id: EntryId) {
        if let Some(entry) = self.queue.iter_mut().find(|e| e.entry_id == entry_id) {
            entry.retry_count = entry.retry_count.saturating_add(1);
        }
    }
}
