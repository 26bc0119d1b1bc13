use crate::error::{PrizeError, Result};
use std::time::Duration;

/// Read/write view of counters inside one atomic script
///
/// Everything written through a `CounterTxn` becomes visible to other callers
/// at once when the script returns `Ok`, and not at all when it returns `Err`.
pub trait CounterTxn {
    /// Current value of a counter, `None` if the key does not exist
    fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Overwrite a counter
    fn put(&mut self, key: &str, value: u64) -> Result<()>;

    /// Increment a counter (missing keys count as 0) and return the new value
    fn incr(&mut self, key: &str) -> Result<u64> {
        let next = self
            .get(key)?
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| PrizeError::InvalidState(format!("counter '{}' overflowed", key)))?;
        self.put(key, next)?;
        Ok(next)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Atomic key-value store backing the participation gate, the allocation
/// counters and the recorder's dedup markers
///
/// Provides:
/// - Conditional set-if-absent with expiry (gate markers)
/// - Unconditional markers with expiry (dedup markers)
/// - Scripted transactions over a declared key set (allocation)
///
/// Backend failures surface as `PrizeError::StoreUnavailable` (or
/// `LockTimeout`) so callers can fail closed.
pub trait CounterStore: Send + Sync {
    /// Create `key` with the given expiry if it is absent or expired
    ///
    /// Returns `true` only for the call that created it.
    fn set_if_absent(&self, key: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Create or refresh `key` with the given expiry
    fn set_marker(&self, key: &str, ttl: Option<Duration>) -> Result<()>;

    /// Whether `key` exists and has not expired
    fn exists(&self, key: &str) -> Result<bool>;

    /// Read a counter outside of any script (inspection only)
    fn read_counter(&self, key: &str) -> Result<Option<u64>>;

    /// Drop expired markers, returning how many were removed
    ///
    /// Expired entries already read as absent; this only reclaims space.
    fn purge_expired(&self) -> Result<usize>;

    /// Run `script` as one indivisible operation over `keys`
    ///
    /// `keys` must list every key the script touches. No intermediate state
    /// of the script is observable by other callers.
    fn transact<T, F>(&self, keys: &[&str], script: F) -> Result<T>
    where
        F: FnOnce(&mut dyn CounterTxn) -> Result<T>;
}
