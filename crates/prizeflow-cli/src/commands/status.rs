//! Status and purge command implementations

use anyhow::{Context, Result};
use prizeflow::prelude::*;
use std::path::PathBuf;

pub fn execute(
    data_dir: PathBuf,
    config: PrizeflowConfig,
    participant: Option<String>,
    json: bool,
) -> Result<()> {
    tracing::info!("Checking status: {}", data_dir.display());

    let db = PrizeflowDb::open_with_config(&data_dir, config).context("Failed to open database")?;
    let status = db.status().context("Failed to read status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("\nPrizeflow Status");
    println!("{}", "=".repeat(60));
    println!("Path: {}", data_dir.display());
    let schema_version = db
        .records()
        .schema_version()
        .context("Failed to get schema version")?;
    println!("Schema Version: {}", schema_version);

    println!("\nTiers:");
    println!("  {:<16} {:>10} {:>10} {:>10}", "Tier", "Issued", "Capacity", "Remaining");
    for tier in &status.tiers {
        println!(
            "  {:<16} {:>10} {:>10} {:>10}",
            tier.tier,
            tier.issued,
            tier.global_capacity,
            tier.remaining()
        );
    }

    println!("\nPipeline:");
    println!("  Queue Depth: {}", status.queue_depth);
    println!("  Grants Recorded: {}", status.grants);
    println!("  Registrations Recorded: {}", status.registrations);
    println!("  Dead Letters: {}", status.dead_letters);

    if status.dead_letters > 0 {
        println!("\n⚠️  Dead letters present");
        println!("Run 'prizeflow dead-letters' to inspect them");
    }

    if let Some(participant) = participant {
        let participant = ParticipantId::new(participant).context("Invalid participant")?;
        let rows = db
            .records()
            .grants_for(&participant)
            .context("Failed to read grants")?;

        println!("\nGrants for {}:", participant);
        if rows.is_empty() {
            println!("  (none)");
        }
        for row in rows {
            println!(
                "  {}  {:<12} granted at {}",
                row.day,
                row.prize.key_segment(),
                row.granted_at.to_rfc3339()
            );
        }
    }

    Ok(())
}

pub fn purge(data_dir: PathBuf, config: PrizeflowConfig) -> Result<()> {
    let db = PrizeflowDb::open_with_config(&data_dir, config).context("Failed to open database")?;
    let purged = db.purge_expired().context("Purge failed")?;
    println!("✓ Purged {} expired marker(s)", purged);
    Ok(())
}
