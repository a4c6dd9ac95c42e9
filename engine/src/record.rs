//! Record type for storing data.

use crate::{error::Result, Error, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field set to `true` on every record written by the local store.
pub const LOCAL_MARKER: &str = "_local";

/// Field holding the local save time (milliseconds since epoch).
pub const LOCAL_SAVED_AT: &str = "_localSavedAt";

/// A data record: a JSON object with a mandatory string `id`.
///
/// Everything apart from `id` is opaque to the sync engine. References
/// between tables (a tasting note pointing at a purchase) are plain fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create a record from an id and a JSON object of fields.
    ///
    /// An `id` already present in `fields` is overwritten.
    pub fn new(id: impl Into<String>, fields: Value) -> Result<Self> {
        let mut fields = match fields {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::InvalidRecord(format!(
                    "expected an object, got {}",
                    json_type_name(&other)
                )))
            }
        };
        let id = id.into();
        if id.is_empty() {
            return Err(Error::MissingId);
        }
        fields.insert("id".to_string(), Value::String(id));
        Ok(Self { fields })
    }

    /// Parse a JSON value, requiring an object with a non-empty string `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(Error::InvalidRecord(format!(
                "expected an object, got {}",
                json_type_name(&value)
            )));
        };
        match fields.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(Self { fields }),
            _ => Err(Error::MissingId),
        }
    }

    /// The record id.
    pub fn id(&self) -> &str {
        // Constructors guarantee a string id.
        self.fields.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    /// Get a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// All fields including `id`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Set a field. Setting `id` is rejected.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Result<()> {
        let field = field.into();
        if field == "id" {
            return Err(Error::InvalidRecord("the id of a record cannot change".into()));
        }
        self.fields.insert(field, value);
        Ok(())
    }

    /// Mark the record as saved locally at `now`.
    pub fn stamp_local(&mut self, now: Timestamp) {
        self.fields.insert(LOCAL_MARKER.to_string(), Value::Bool(true));
        self.fields
            .insert(LOCAL_SAVED_AT.to_string(), Value::Number(now.into()));
    }

    /// Whether the record carries the local-origin marker.
    pub fn is_local(&self) -> bool {
        matches!(self.fields.get(LOCAL_MARKER), Some(Value::Bool(true)))
    }

    /// When the record was last saved locally, if it was.
    pub fn local_saved_at(&self) -> Option<Timestamp> {
        self.fields.get(LOCAL_SAVED_AT).and_then(Value::as_i64)
    }

    /// Copy of the record without local bookkeeping fields.
    pub fn without_local_markers(&self) -> Self {
        let mut fields = self.fields.clone();
        fields.remove(LOCAL_MARKER);
        fields.remove(LOCAL_SAVED_AT);
        Self { fields }
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
