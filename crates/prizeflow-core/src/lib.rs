//! Prizeflow Core: traits and types for bounded prize allocation
//!
//! This crate defines the abstractions shared by the allocation engine, the
//! storage backends and the recording pipeline:
//! - Counter store: atomic KV with conditional set, expiring markers and
//!   single-transaction counter scripts
//! - Grant queue: durable, at-least-once delivery of grant notifications
//! - Record sink: durable storage with unique natural keys
//!
//! Key features:
//! - Fail-closed error taxonomy (`StoreUnavailable` never grants)
//! - Stripe locking for per-key serialization of in-process stores
//! - Serde-driven configuration with sensible defaults

pub mod config;
pub mod error;
pub mod lock_manager;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::{
    ClassifierConfig, CounterStoreConfig, EnvTuning, LotteryConfig, QueueConfig,
    RecordStoreConfig, RecorderConfig, SubstringRule, SyncMode, SynchronousMode, TierConfig,
    WeightedTier,
};
pub use error::{PrizeError, Result};
pub use lock_manager::LockManager;
pub use traits::{CounterStore, CounterTxn, GrantQueue, RecordSink};
pub use types::{
    Allocation, Day, Delivery, DeliveryId, DrawOutcome, GrantEvent, InsertOutcome, ParticipantId,
    Prize, QueueMessage, RecordOutcome, Registration, RejectReason,
};
