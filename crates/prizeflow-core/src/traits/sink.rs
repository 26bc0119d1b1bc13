use crate::error::Result;
use crate::types::{GrantEvent, InsertOutcome, Registration};

/// Durable storage for recorded facts
///
/// Each insert is keyed by the record's natural key and must be idempotent:
/// a second insert of the same key reports `InsertOutcome::AlreadyExists`
/// instead of failing or writing a second row.
pub trait RecordSink: Send + Sync {
    fn insert_grant(&self, event: &GrantEvent) -> Result<InsertOutcome>;

    fn insert_registration(&self, registration: &Registration) -> Result<InsertOutcome>;

    fn grant_count(&self) -> Result<u64>;

    fn registration_count(&self) -> Result<u64>;
}
