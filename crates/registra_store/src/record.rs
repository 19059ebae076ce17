//! Dynamic record model and entity keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A stored record: field name to JSON value.
///
/// Records are schemaless at this layer; the service layer above decides
/// which fields exist, which are derived, and which are forbidden.
pub type Record = Map<String, Value>;

/// An entity key.
///
/// Keys are either integers (numeric and large-integer id strategies) or
/// opaque strings (server-generated ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// Opaque string key.
    Text(String),
}

impl Key {
    /// Converts a JSON value into a key, if it has a key-compatible shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Key::Int),
            Value::String(s) => Some(Key::Text(s.clone())),
            _ => None,
        }
    }

    /// Returns the key as a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::Number((*n).into()),
            Key::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

/// Reads the key stored under `field`, if present and key-shaped.
pub fn record_key(record: &Record, field: &str) -> Option<Key> {
    record.get(field).and_then(Key::from_value)
}

/// Returns `record` with `patch` merged over it.
///
/// Fields present in `patch` win; fields absent from `patch` keep the value
/// from `record`. An explicit `null` in `patch` overwrites (clears) the field.
pub fn merge_over(record: &Record, patch: &Record) -> Record {
    let mut merged = record.clone();
    for (field, value) in patch {
        merged.insert(field.clone(), value.clone());
    }
    merged
}

/// Returns the field's value, treating a missing field as JSON `null`.
pub fn field_or_null<'a>(record: &'a Record, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&Value::Null)
}
