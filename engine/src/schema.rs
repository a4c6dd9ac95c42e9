//! Schema definition and validation.
//!
//! A schema declares the logical tables of the local store and the
//! secondary indexes each one carries. Every table is keyed by `id`.
//! The version drives storage upgrades: bump it whenever a table or index
//! is added.

use crate::{error::Result, Error, Mutation, SchemaVersion, TableName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the mutation queue table. Not available for record tables.
pub const QUEUE_TABLE: &str = "sync_queue";

/// A secondary index on a top-level record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDef {
    /// Index name, unique within its table
    pub name: String,
    /// Record field the index is built on
    pub key_path: String,
}

impl IndexDef {
    /// Index a field under its own name.
    pub fn on(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            name: field.clone(),
            key_path: field,
        }
    }
}

/// Schema for one logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Table name
    pub name: TableName,
    /// Secondary indexes
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    /// Create a table schema.
    pub fn new(name: impl Into<TableName>, indexes: Vec<IndexDef>) -> Self {
        Self {
            name: name.into(),
            indexes,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        if self.name == QUEUE_TABLE {
            return Err(Error::ReservedTable(self.name.clone()));
        }
        for index in &self.indexes {
            validate_identifier(&index.name)?;
            validate_identifier(&index.key_path)?;
        }
        Ok(())
    }
}

/// Schema for the entire local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Schema version for upgrades
    pub version: SchemaVersion,
    /// Table schemas by name
    tables: BTreeMap<TableName, TableSchema>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            tables: BTreeMap::new(),
        }
    }

    /// The tables of the whiskey tracker.
    pub fn whiskey_collection() -> Self {
        let tables = [
            TableSchema::new(
                "whiskeys",
                vec![IndexDef::on("name"), IndexDef::on("distillery")],
            ),
            TableSchema::new(
                "purchases",
                vec![IndexDef::on("whiskey_id"), IndexDef::on("purchase_date")],
            ),
            TableSchema::new(
                "tasting_notes",
                vec![IndexDef::on("purchase_id"), IndexDef::on("tasted_at")],
            ),
            TableSchema::new("personal_notes", vec![IndexDef::on("whiskey_id")]),
            TableSchema::new("collection_items", vec![IndexDef::on("whiskey_id")]),
        ];

        let mut schema = Self::new(1);
        for table in tables {
            schema.tables.insert(table.name.clone(), table);
        }
        schema
    }

    /// Add a table to the schema.
    pub fn add_table(&mut self, table: TableSchema) -> Result<&mut Self> {
        table.validate()?;
        if self.tables.contains_key(&table.name) {
            return Err(Error::DuplicateTable(table.name));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(self)
    }

    /// Builder-style method to add a table.
    pub fn with_table(mut self, table: TableSchema) -> Result<Self> {
        self.add_table(table)?;
        Ok(self)
    }

    /// Get a table schema by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// All tables, ordered by name.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Resolve a table name, failing for tables the schema does not declare.
    pub fn validate_table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Validate a mutation before it is queued.
    pub fn validate_mutation(&self, mutation: &Mutation) -> Result<()> {
        self.validate_table(&mutation.table)?;
        mutation.validate_payload()
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}
