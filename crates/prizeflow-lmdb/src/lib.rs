//! LMDB-backed counter store and grant queue
//!
//! Key features:
//! - Every allocation script runs inside one LMDB write transaction, so the
//!   check-then-increment sequence is indivisible across threads and processes
//! - Expiring markers (participation gate, recorder dedup) without a sweeper
//!   on the hot path: expired entries read as absent and are overwritten
//! - Durable queue with visibility timeouts for at-least-once delivery
//! - Big-endian message IDs for FIFO-ish cursor order

pub mod env;
pub mod keys;
pub mod queue;
pub mod store;
pub mod txn;

pub use queue::LmdbGrantQueue;
pub use store::LmdbCounterStore;
pub use txn::LmdbCounterTxn;
