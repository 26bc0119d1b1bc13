//! Dead-letter inspection

use anyhow::{Context, Result};
use prizeflow::DeadLetterLog;
use std::path::PathBuf;

pub fn execute(data_dir: PathBuf, reconcile_only: bool) -> Result<()> {
    let path = data_dir.join(DeadLetterLog::FILE_NAME);
    let entries = DeadLetterLog::read_path(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let entries: Vec<_> = entries
        .into_iter()
        .filter(|e| !reconcile_only || e.requires_reconciliation)
        .collect();

    if entries.is_empty() {
        println!("No dead letters");
        return Ok(());
    }

    println!("\nDead Letters:");
    println!("{:<20} {:<10} {:<8} Natural Key / Error", "Source", "Delivery", "Attempts");
    println!("{}", "=".repeat(80));

    for entry in &entries {
        let delivery = entry
            .delivery_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<10} {:<8} {}",
            entry.source.as_str(),
            delivery,
            entry.attempts,
            entry.natural_key.as_deref().unwrap_or("-")
        );
        println!("{:<40} {} ({})", "", entry.error, entry.timestamp);
        if entry.requires_reconciliation {
            println!("{:<40} ⚠️  requires reconciliation", "");
        }
    }

    println!("\nTotal: {} dead letter(s)", entries.len());
    Ok(())
}
