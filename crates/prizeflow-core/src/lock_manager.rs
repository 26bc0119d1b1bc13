//! Striped key locks for in-process counter stores
//!
//! Counter keys hash onto a fixed set of stripes. A script locks the stripes
//! of all its keys in ascending stripe order, so scripts declaring
//! `[global, participant]` and `[participant, global]` cannot deadlock.

use crate::config::CounterStoreConfig;
use crate::error::{PrizeError, Result};
use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;
use xxhash_rust::xxh3::xxh3_64;

pub const DEFAULT_STRIPES: usize = 256;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Per-key mutual exclusion over a fixed stripe table
///
/// A caller holding the stripes of every key it touches sees and writes
/// those keys as one step; keys that share a stripe are merely serialized
/// together.
///
/// ```ignore
/// let locks = LockManager::new(256, Duration::from_secs(5));
/// let _held = locks.acquire_keys(&["tier:card:issued", "tier:card:participant:p1:issued"])?;
/// // read, check and increment both counters
/// ```
pub struct LockManager {
    stripes: Box<[Mutex<()>]>,
    timeout: Duration,
}

/// Stripes held by one caller, released on drop
pub struct KeyLocks<'a> {
    _held: Vec<MutexGuard<'a, ()>>,
}

impl LockManager {
    /// `stripes` is clamped to at least one
    pub fn new(stripes: usize, timeout: Duration) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
            timeout,
        }
    }

    pub fn from_config(cfg: &CounterStoreConfig) -> Self {
        Self::new(cfg.stripe_count, cfg.lock_timeout())
    }

    fn stripe_of(&self, key: &[u8]) -> usize {
        (xxh3_64(key) % self.stripes.len() as u64) as usize
    }

    fn take(&self, stripe: usize) -> Result<MutexGuard<'_, ()>> {
        self.stripes[stripe]
            .try_lock_for(self.timeout)
            .ok_or(PrizeError::LockTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })
    }

    /// Lock the stripes of every key, in ascending stripe order
    ///
    /// Duplicate keys and keys sharing a stripe lock it once. On
    /// `LockTimeout` the stripes already taken are released.
    pub fn acquire_keys<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<KeyLocks<'_>> {
        let mut stripes: Vec<usize> = keys.iter().map(|k| self.stripe_of(k.as_ref())).collect();
        stripes.sort_unstable();
        stripes.dedup();

        let mut held = Vec::with_capacity(stripes.len());
        for stripe in stripes {
            held.push(self.take(stripe)?);
        }
        Ok(KeyLocks { _held: held })
    }

    /// Lock a single key's stripe
    pub fn lock(&self, key: &[u8]) -> Result<MutexGuard<'_, ()>> {
        self.take(self.stripe_of(key))
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(
            DEFAULT_STRIPES,
            Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        )
    }
}
