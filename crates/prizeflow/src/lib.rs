//! Prizeflow: bounded prize allocation with idempotent recording
//!
//! Prizeflow hands out a strictly limited inventory of prizes to a
//! high-concurrency stream of lottery requests and records every decision
//! exactly once:
//! - **Participation gate**: one attempt per participant per day
//! - **Classifier**: pluggable policy choosing the tier a participant asks for
//! - **Allocator**: one atomic script checks and increments every bound
//! - **Grant queue**: durable at-least-once channel to the recorder
//! - **Recorder**: dedups by natural key and persists through unique constraints
//!
//! # Quick Start
//!
//! ```no_run
//! use prizeflow::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let db = PrizeflowDb::open("./data")?;
//! let lottery = db.lottery()?;
//!
//! let participant = ParticipantId::new("13888300000")?;
//! match lottery.draw(&participant, chrono::Utc::now()) {
//!     DrawOutcome::TierGranted(tier) => println!("won {}", tier),
//!     DrawOutcome::NoPrize => println!("no prize"),
//!     DrawOutcome::Rejected(reason) => println!("rejected: {:?}", reason),
//! }
//!
//! // Persist queued grants
//! db.recorder().drain_batch()?;
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod classifier;
pub mod db;
pub mod dead_letter;
pub mod gate;
pub mod keys;
pub mod lottery;
pub mod memory;
pub mod prelude;
pub mod recorder;

// Re-export core types
pub use prizeflow_core::{
    config::{
        ClassifierConfig, CounterStoreConfig, LotteryConfig, QueueConfig, RecordStoreConfig,
        RecorderConfig, SubstringRule, SyncMode, SynchronousMode, TierConfig, WeightedTier,
    },
    error::{PrizeError, Result},
    traits::{CounterStore, CounterTxn, GrantQueue, RecordSink},
    types::{
        Allocation, Day, Delivery, DeliveryId, DrawOutcome, GrantEvent, InsertOutcome,
        ParticipantId, Prize, QueueMessage, RecordOutcome, Registration, RejectReason,
    },
};

// Re-export implementations
pub use prizeflow_lmdb::{LmdbCounterStore, LmdbGrantQueue};
pub use prizeflow_sqlite::SqliteRecordStore;

// Re-export main types from this crate
pub use allocator::{PrizeAllocator, TierUsage};
pub use classifier::{
    AllowListClassifier, NoPrizeClassifier, OutcomeClassifier, SubstringClassifier,
    WeightedClassifier,
};
pub use db::{PrizeflowConfig, PrizeflowDb, Status};
pub use dead_letter::{DeadLetter, DeadLetterLog, DeadLetterSource};
pub use gate::ParticipationGate;
pub use lottery::Lottery;
pub use memory::{MemoryCounterStore, MemoryGrantQueue, MemoryRecordSink};
pub use recorder::{DeliveryResult, Recorder, RecorderStatsSnapshot, ShutdownHandle};
