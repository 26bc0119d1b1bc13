//! SQLite-backed record sink
//!
//! Stores the durable facts produced by the recorder: one row per
//! `(participant, prize, day)` grant and one row per registered participant.
//!
//! Key features:
//! - Unique natural keys enforced by the schema; a repeated insert reports
//!   `InsertOutcome::AlreadyExists` instead of writing a second row
//! - Schema version tracking in `record_meta`
//! - WAL mode and busy timeout for a concurrent reader (the CLI status command)

pub mod schema;
pub mod store;

pub use store::{GrantRow, SqliteRecordStore};
