//! Prizeflow CLI - Command-line interface for prizeflow data directories

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "prizeflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one lottery attempt for a participant
    Draw {
        participant: String,

        /// Request time as RFC 3339 (default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Queue a registration record
    Register {
        participant: String,

        content: String,
    },

    /// Drain the grant queue into the record store
    Record {
        /// Drain what is queued and exit instead of polling
        #[arg(long)]
        once: bool,
    },

    /// Counters, queue depth and record totals
    Status {
        /// Also list the recorded grants of this participant
        #[arg(short, long)]
        participant: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List dead-lettered messages
    DeadLetters {
        /// Only entries that still need manual reconciliation
        #[arg(long)]
        reconcile_only: bool,
    },

    /// Drop expired participation and dedup markers
    Purge,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Draw { participant, at } => {
            commands::draw::execute(cli.data_dir, config, participant, at)?;
        }
        Commands::Register {
            participant,
            content,
        } => {
            commands::draw::register(cli.data_dir, config, participant, content)?;
        }
        Commands::Record { once } => {
            commands::record::execute(cli.data_dir, config, once)?;
        }
        Commands::Status { participant, json } => {
            commands::status::execute(cli.data_dir, config, participant, json)?;
        }
        Commands::DeadLetters { reconcile_only } => {
            commands::dead_letters::execute(cli.data_dir, reconcile_only)?;
        }
        Commands::Purge => {
            commands::status::purge(cli.data_dir, config)?;
        }
    }

    Ok(())
}
