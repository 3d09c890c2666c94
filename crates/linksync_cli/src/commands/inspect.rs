//! Inspect command implementation.

use super::data::load_schema;
use linksync_core::{Cardinality, EntityDef, KeyType, Schema};
use serde::Serialize;
use std::path::Path;

/// Schema inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Entity types, ordered by name.
    pub types: Vec<TypeSummary>,
    /// Number of reference fields with an inverse.
    pub synchronized_fields: usize,
    /// Number of external reference fields.
    pub external_fields: usize,
}

/// Summary of one entity type.
#[derive(Debug, Serialize)]
pub struct TypeSummary {
    /// Type name.
    pub name: String,
    /// Business key field, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
    /// Key type.
    pub key_type: KeyType,
    /// Plain attributes.
    pub attributes: Vec<String>,
    /// Reference fields.
    pub references: Vec<ReferenceSummary>,
}

/// Summary of one reference field.
#[derive(Debug, Serialize)]
pub struct ReferenceSummary {
    /// Field name.
    pub name: String,
    /// Single or multi-valued.
    pub cardinality: Cardinality,
    /// Target type.
    pub target: String,
    /// Inverse field on the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    /// Target is not managed here.
    pub external: bool,
}

impl InspectResult {
    /// Summarizes a validated schema.
    pub fn from_schema(schema: &Schema) -> Self {
        let types: Vec<TypeSummary> = schema.entities().map(summarize).collect();
        let references = || types.iter().flat_map(|t| t.references.iter());
        Self {
            synchronized_fields: references().filter(|r| r.inverse.is_some()).count(),
            external_fields: references().filter(|r| r.external).count(),
            types,
        }
    }
}

fn summarize(entity: &EntityDef) -> TypeSummary {
    TypeSummary {
        name: entity.name().to_string(),
        key_field: entity.key_field().map(str::to_string),
        key_type: entity.key_type(),
        attributes: entity.attributes().to_vec(),
        references: entity
            .references()
            .iter()
            .map(|field| ReferenceSummary {
                name: field.name.clone(),
                cardinality: field.cardinality,
                target: field.target.clone(),
                inverse: field.inverse.as_ref().map(|inverse| inverse.field.clone()),
                external: field.external,
            })
            .collect(),
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let schema = load_schema(path)?;
    let result = InspectResult::from_schema(&schema);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Schema: {} entity types", result.types.len());
    println!("  Synchronized fields: {}", result.synchronized_fields);
    println!("  External fields:     {}", result.external_fields);

    for entity in &result.types {
        println!();
        let key_type = match entity.key_type {
            KeyType::String => "string",
            KeyType::Uuid => "uuid",
        };
        match &entity.key_field {
            Some(field) => println!("{} (key: {field}, {key_type})", entity.name),
            None => println!("{} (key: generated {key_type})", entity.name),
        }
        if !entity.attributes.is_empty() {
            println!("  attributes: {}", entity.attributes.join(", "));
        }
        for reference in &entity.references {
            let cardinality = match reference.cardinality {
                Cardinality::One => "one",
                Cardinality::Many => "many",
            };
            let target = match (&reference.inverse, reference.external) {
                (_, true) => format!("{} (external)", reference.target),
                (Some(inverse), false) => format!("{}.{inverse}", reference.target),
                (None, false) => format!("{} (no inverse)", reference.target),
            };
            println!("  {:<20} {cardinality:<4} -> {target}", reference.name);
        }
    }
}
