//! Ledger command - migrate browser localStorage claims to/from a SQLite ledger

use crate::style::*;
use anyhow::{Context, Result};
use island_rewards::RewardLedger;
use std::collections::BTreeMap;
use std::path::Path;

/// Import a localStorage dump (`JSON.stringify(localStorage)`) into the ledger at `db`.
pub fn import(db: &str, file: &Path) -> Result<()> {
    print_header("Import Claims");

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let entries = parse_dump(&content)?;

    let ledger = RewardLedger::new(db).with_context(|| format!("Failed to open ledger {}", db))?;
    let imported = ledger.import_local_storage(&entries)?;

    print_success(&format!(
        "Imported {} values from {} into {}",
        imported,
        file.display(),
        style_cyan(db)
    ));
    println!("Claims recorded: {}", ledger.total_claims()?);
    Ok(())
}

/// Print (or write) the ledger in localStorage layout.
pub fn export(db: &str, out: Option<&Path>) -> Result<()> {
    let ledger = RewardLedger::new(db).with_context(|| format!("Failed to open ledger {}", db))?;
    let entries = ledger.export_local_storage()?;
    let json = serde_json::to_string_pretty(&entries)?;

    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!("Exported {} keys to {}", entries.len(), path.display()));
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Values in a localStorage dump are strings; raw JSON arrays are accepted too.
fn parse_dump(content: &str) -> Result<BTreeMap<String, String>> {
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(content).context("Dump must be a JSON object")?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect())
}
