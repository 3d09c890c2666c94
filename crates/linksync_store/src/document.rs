//! Documents and primary keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Primary key of a document.
///
/// Keys are either business keys taken from a document field (an email, a
/// licence number) or generated UUIDs. Both are carried as strings, which is
/// also how references to a document are stored on other documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Creates a key from any string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a new random key (UUID v4, hyphenated).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key as it is stored inside a reference field.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }

    /// Reads a key out of a stored reference value.
    ///
    /// Only JSON strings are keys; anything else yields `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(Self::new)
    }

    /// Returns true if the key is a well-formed UUID.
    #[must_use]
    pub fn is_uuid(&self) -> bool {
        uuid::Uuid::parse_str(&self.0).is_ok()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A stored document: a primary key plus a flat map of top-level fields.
///
/// Reference fields are stored inline like any other field, either as a single
/// key string or as an array of key strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    key: Key,
    fields: Map<String, Value>,
}

impl Document {
    /// Creates a document.
    pub fn new(key: Key, fields: Map<String, Value>) -> Self {
        Self { key, fields }
    }

    /// Returns the primary key.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns all stored fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns mutable access to the stored fields.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Returns a single field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Consumes the document, returning key and fields.
    #[must_use]
    pub fn into_parts(self) -> (Key, Map<String, Value>) {
        (self.key, self.fields)
    }
}
