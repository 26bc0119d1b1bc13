//! Draw and register command implementations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use prizeflow::prelude::*;
use std::path::PathBuf;

pub fn execute(
    data_dir: PathBuf,
    config: PrizeflowConfig,
    participant: String,
    at: Option<String>,
) -> Result<()> {
    let participant = ParticipantId::new(participant).context("Invalid participant")?;
    let timestamp = match at {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("Invalid timestamp '{}'", raw))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let db = PrizeflowDb::open_with_config(&data_dir, config).context("Failed to open database")?;
    let lottery = db.lottery().context("Failed to build lottery")?;

    match lottery.draw(&participant, timestamp) {
        DrawOutcome::TierGranted(tier) => println!("✓ {} won tier '{}'", participant, tier),
        DrawOutcome::NoPrize => println!("{}: no prize", participant),
        DrawOutcome::Rejected(RejectReason::AlreadyParticipatedToday) => {
            println!("{}: already participated today", participant)
        }
        DrawOutcome::Rejected(RejectReason::SystemUnavailable) => {
            anyhow::bail!("System unavailable, try again later")
        }
    }

    Ok(())
}

pub fn register(
    data_dir: PathBuf,
    config: PrizeflowConfig,
    participant: String,
    content: String,
) -> Result<()> {
    let participant = ParticipantId::new(participant).context("Invalid participant")?;
    let db = PrizeflowDb::open_with_config(&data_dir, config).context("Failed to open database")?;

    let id = db
        .lottery()
        .context("Failed to build lottery")?
        .register(&participant, content)
        .context("Failed to enqueue registration")?;

    println!("✓ Registration queued (delivery {})", id);
    Ok(())
}
