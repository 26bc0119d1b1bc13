pub mod dead_letters;
pub mod draw;
pub mod record;
pub mod status;

use anyhow::{Context, Result};
use prizeflow::PrizeflowConfig;
use std::path::Path;

/// Read a JSON config file, or fall back to defaults
pub fn load_config(path: Option<&Path>) -> Result<PrizeflowConfig> {
    let Some(path) = path else {
        return Ok(PrizeflowConfig::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    PrizeflowConfig::from_json(&json).context("Invalid configuration")
}
