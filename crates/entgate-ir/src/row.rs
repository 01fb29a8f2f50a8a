//! Row representation for read results and write payloads.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// An ordered set of named field values.
///
/// Rows are what persistence backends return from reads and accept as write
/// payloads. Field order is preserved; lookups are by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a field value, builder style. Replaces any existing value for the
    /// same field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field value, replacing any existing value for the same field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The entity id field, if present and integral.
    pub fn id(&self) -> Option<i64> {
        self.get("id").and_then(Value::as_i64)
    }

    /// Number of fields in the row.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over (name, value) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl From<Vec<(String, Value)>> for Row {
    fn from(fields: Vec<(String, Value)>) -> Self {
        let mut row = Row::new();
        for (name, value) in fields {
            row.set(name, value);
        }
        row
    }
}
