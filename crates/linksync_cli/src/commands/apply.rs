//! Apply command implementation.
//!
//! Runs create, update, and delete steps through the engine in order, so every
//! step propagates to inverse fields exactly as an application call would.

use super::data::{dump_data, load_data, load_schema, read_json, write_json, DataError};
use linksync_core::{Config, LinkEngine};
use linksync_store::{Key, MemoryStore};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One step of a mutations file.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    /// Create a document.
    Create {
        /// Entity type.
        #[serde(rename = "type")]
        entity: String,
        /// Attributes and references.
        document: Map<String, Value>,
    },
    /// Apply a MongoDB-style update document.
    Update {
        /// Entity type.
        #[serde(rename = "type")]
        entity: String,
        /// Document key.
        id: Key,
        /// Update document, e.g. `{"$push": {"houses": "..."}}`.
        update: Value,
    },
    /// Delete a document.
    Delete {
        /// Entity type.
        #[serde(rename = "type")]
        entity: String,
        /// Document key.
        id: Key,
    },
}

/// Parses a mutations file.
pub fn parse_steps(value: Value) -> Result<Vec<Step>, DataError> {
    serde_json::from_value(value).map_err(|source| DataError::Json {
        path: "mutations".to_string(),
        source,
    })
}

/// Runs every step against `engine`, stopping at the first failure.
pub async fn execute(
    engine: &LinkEngine<MemoryStore>,
    steps: &[Step],
) -> Result<(), Box<dyn std::error::Error>> {
    for (index, step) in steps.iter().enumerate() {
        let result = match step {
            Step::Create { entity, document } => engine.create(entity, document.clone()).await,
            Step::Update { entity, id, update } => engine.update_json(entity, id, update).await,
            Step::Delete { entity, id } => engine.delete(entity, id).await,
        };
        let document = result.map_err(|err| format!("step {index}: {err}"))?;
        info!(step = index, id = %document.id, "step applied");
    }
    Ok(())
}

/// Runs the apply command.
pub async fn run(
    schema_path: &Path,
    data_path: Option<&Path>,
    mutations_path: &Path,
    output: Option<&Path>,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = Arc::new(load_schema(schema_path)?);
    let store = Arc::new(MemoryStore::new());
    if let Some(data_path) = data_path {
        load_data(&schema, &read_json(data_path)?, &store)?;
    }
    let steps = parse_steps(read_json(mutations_path)?)?;

    let engine = LinkEngine::with_config(Arc::clone(&schema), Arc::clone(&store), config);
    execute(&engine, &steps).await?;

    let stats = engine.stats();
    info!(
        steps = steps.len(),
        inverse_writes = stats.inverse_writes_applied,
        skipped = stats.inverse_writes_skipped,
        "mutations applied"
    );
    write_json(output, &dump_data(&schema, &store))?;
    Ok(())
}
