//! Schema and data set files.
//!
//! A data set is a JSON object mapping entity type names to arrays of
//! documents. Each document carries its key under `id`, or under the type's
//! business key field.

use linksync_core::{LinkError, Schema};
use linksync_store::{Document, Key, MemoryStore};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading or writing CLI files.
#[derive(Debug, Error)]
pub enum DataError {
    /// A file could not be read or written.
    #[error("cannot access {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file is not valid JSON.
    #[error("cannot parse {path}: {source}")]
    Json {
        /// Offending path.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The file is JSON but not in the expected shape.
    #[error("invalid data set: {0}")]
    Invalid(String),

    /// Schema or engine error.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Reads a JSON file.
pub fn read_json(path: &Path) -> Result<Value, DataError> {
    let text = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| DataError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Writes pretty JSON to `path`, or to stdout if `path` is `None`.
pub fn write_json(path: Option<&Path>, value: &Value) -> Result<(), DataError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| DataError::Json {
        path: path.map_or_else(|| "<stdout>".to_string(), |p| p.display().to_string()),
        source,
    })?;
    match path {
        Some(path) => fs::write(path, text + "\n").map_err(|source| DataError::Io {
            path: path.display().to_string(),
            source,
        }),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

/// Reads and validates a schema file.
pub fn load_schema(path: &Path) -> Result<Schema, DataError> {
    let text = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Schema::from_json(&text)?)
}

/// Loads a data set into `store` as-is, without propagating anything.
///
/// Returns the number of documents loaded.
pub fn load_data(schema: &Schema, data: &Value, store: &MemoryStore) -> Result<usize, DataError> {
    let collections = data
        .as_object()
        .ok_or_else(|| DataError::Invalid("expected an object of entity types".into()))?;

    let mut loaded = 0;
    for (entity_name, documents) in collections {
        let entity = schema.entity(entity_name)?;
        let documents = documents
            .as_array()
            .ok_or_else(|| DataError::Invalid(format!("{entity_name} must be an array")))?;

        let mut parsed = Vec::with_capacity(documents.len());
        for (index, document) in documents.iter().enumerate() {
            let mut fields = document.as_object().cloned().ok_or_else(|| {
                DataError::Invalid(format!("{entity_name}[{index}] must be an object"))
            })?;
            let key = fields
                .remove("id")
                .as_ref()
                .and_then(Key::from_value)
                .or_else(|| {
                    entity
                        .key_field()
                        .and_then(|field| fields.get(field))
                        .and_then(Key::from_value)
                })
                .ok_or_else(|| {
                    DataError::Invalid(format!("{entity_name}[{index}] has no key"))
                })?;
            parsed.push(Document::new(key, fields));
        }
        loaded += parsed.len();
        store.load(entity_name, parsed);
    }
    Ok(loaded)
}

/// Dumps every collection named by the schema, keys under `id`.
pub fn dump_data(schema: &Schema, store: &MemoryStore) -> Value {
    let mut collections = Map::new();
    for entity in schema.entities() {
        let documents = store
            .snapshot(entity.name())
            .into_iter()
            .map(|document| {
                let (key, fields) = document.into_parts();
                let mut object = Map::with_capacity(fields.len() + 1);
                object.insert("id".to_string(), key.to_value());
                object.extend(fields);
                Value::Object(object)
            })
            .collect();
        collections.insert(entity.name().to_string(), Value::Array(documents));
    }
    Value::Object(collections)
}
