//! Prizeflow Prelude
//!
//! ```
//! use prizeflow::prelude::*;
//! ```

// Core types
pub use crate::{
    Allocation, Day, DrawOutcome, GrantEvent, ParticipantId, Prize, PrizeError, QueueMessage,
    Registration, RejectReason, Result,
};

// Configs
pub use crate::{LotteryConfig, PrizeflowConfig, RecorderConfig, TierConfig};

// Traits
pub use crate::{CounterStore, GrantQueue, OutcomeClassifier, RecordSink};

// Pipeline
pub use crate::{
    DeadLetterLog, Lottery, ParticipationGate, PrizeAllocator, PrizeflowDb, Recorder,
    ShutdownHandle,
};

// Re-export common external deps
pub use std::sync::Arc;
pub use tracing;
