//! Check command implementation.

use super::data::{dump_data, load_data, load_schema, read_json, write_json};
use linksync_core::{check_consistency, repair, ConsistencyReport};
use linksync_store::MemoryStore;
use std::path::Path;

/// Runs the check command.
///
/// Returns whether the data set is consistent once the command is done, that
/// is after repair when `repair` is set.
pub async fn run(
    schema_path: &Path,
    data_path: &Path,
    repair_links: bool,
    output: Option<&Path>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let schema = load_schema(schema_path)?;
    let store = MemoryStore::new();
    let loaded = load_data(&schema, &read_json(data_path)?, &store)?;
    println!("Checking {loaded} documents from {}", data_path.display());

    let report = check_consistency(&schema, &store).await?;
    print_report(&report);

    let mut consistent = report.is_consistent();
    if repair_links && !consistent {
        let repaired = repair(&schema, &store, &report).await?;
        println!();
        println!("Repaired {repaired} of {} links", report.one_sided.len());
        let after = check_consistency(&schema, &store).await?;
        consistent = after.is_consistent();
        if !consistent {
            println!("Left unresolved:");
            for link in &after.one_sided {
                println!("  {link}");
            }
        }
    }

    if let Some(output) = output {
        write_json(Some(output), &dump_data(&schema, &store))?;
        println!("Wrote data set to {}", output.display());
    }

    Ok(consistent)
}

fn print_report(report: &ConsistencyReport) {
    println!("  Documents checked: {}", report.documents_checked);
    println!("  Links checked:     {}", report.links_checked);
    if report.is_consistent() {
        println!("  ✓ Every link has its inverse");
    } else {
        println!("  ✗ {} one-sided links", report.one_sided.len());
        for link in &report.one_sided {
            println!("    {link}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::data::tests::{schema_json, write};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn repairs_and_writes_output() {
        let dir = TempDir::new().unwrap();
        let schema = write(&dir, "schema.json", &schema_json());
        let data = write(
            &dir,
            "data.json",
            &json!({
                "person": [{ "email": "a@x.com", "houses": ["1 Main St", "2 Main St"] }],
                "house": [{ "address": "1 Main St" }]
            }),
        );
        let output = dir.path().join("repaired.json");

        assert!(!run(&schema, &data, false, None).await.unwrap());
        assert!(run(&schema, &data, true, Some(&output)).await.unwrap());

        let repaired = read_json(&output).unwrap();
        assert_eq!(repaired["person"][0]["houses"], json!(["1 Main St"]));
        assert_eq!(repaired["house"][0]["owners"], json!(["a@x.com"]));
    }
}
