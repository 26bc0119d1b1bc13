//! In-process implementations of the storage traits
//!
//! Used by tests and benchmarks, and by embedders that run the whole
//! pipeline inside one process. They honor the same contracts as the LMDB
//! and SQLite backends.

use dashmap::DashMap;
use parking_lot::Mutex;
use prizeflow_core::{
    traits::{CounterStore, CounterTxn, GrantQueue, RecordSink},
    CounterStoreConfig, Delivery, DeliveryId, GrantEvent, InsertOutcome, LockManager, Registration,
    Result,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct MemEntry {
    value: u64,
    expires_at: Option<Instant>,
}

impl MemEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// `now + d`, or `None` when the instant is not representable
///
/// A TTL that far out is as good as no expiry at all.
fn deadline(now: Instant, d: Duration) -> Option<Instant> {
    now.checked_add(d)
}

/// Counter store backed by a `DashMap` and stripe locks
///
/// Every operation holds the stripes of the keys it touches. A script takes
/// all of its declared stripes up front, buffers its writes and applies them
/// before releasing, so no other caller observes a partial script.
pub struct MemoryCounterStore {
    entries: DashMap<String, MemEntry>,
    locks: LockManager,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_locks(LockManager::default())
    }

    pub fn from_config(cfg: &CounterStoreConfig) -> Self {
        Self::with_locks(LockManager::from_config(cfg))
    }

    fn with_locks(locks: LockManager) -> Self {
        Self {
            entries: DashMap::new(),
            locks,
        }
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<u64> {
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryTxn<'a> {
    store: &'a MemoryCounterStore,
    now: Instant,
    writes: HashMap<String, u64>,
}

impl CounterTxn for MemoryTxn<'_> {
    fn get(&self, key: &str) -> Result<Option<u64>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(*value));
        }
        Ok(self.store.live_value(key, self.now))
    }

    fn put(&mut self, key: &str, value: u64) -> Result<()> {
        self.writes.insert(key.to_string(), value);
        Ok(())
    }
}

impl CounterStore for MemoryCounterStore {
    fn set_if_absent(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
        let _guard = self.locks.lock(key.as_bytes())?;
        let now = Instant::now();
        if self.live_value(key, now).is_some() {
            return Ok(false);
        }
        self.entries.insert(
            key.to_string(),
            MemEntry {
                value: 1,
                expires_at: ttl.and_then(|t| deadline(now, t)),
            },
        );
        Ok(true)
    }

    fn set_marker(&self, key: &str, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.locks.lock(key.as_bytes())?;
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            MemEntry {
                value: 1,
                expires_at: ttl.and_then(|t| deadline(now, t)),
            },
        );
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live_value(key, Instant::now()).is_some())
    }

    fn read_counter(&self, key: &str) -> Result<Option<u64>> {
        let _guard = self.locks.lock(key.as_bytes())?;
        Ok(self.live_value(key, Instant::now()))
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn transact<T, F>(&self, keys: &[&str], script: F) -> Result<T>
    where
        F: FnOnce(&mut dyn CounterTxn) -> Result<T>,
    {
        let _guard = self.locks.acquire_keys(keys)?;

        let mut txn = MemoryTxn {
            store: self,
            now: Instant::now(),
            writes: HashMap::new(),
        };
        let value = script(&mut txn)?;

        for (key, written) in txn.writes {
            debug_assert!(
                keys.contains(&key.as_str()),
                "script wrote undeclared key {}",
                key
            );
            self.entries.insert(
                key,
                MemEntry {
                    value: written,
                    expires_at: None,
                },
            );
        }
        Ok(value)
    }
}

/// Longest a queued message is hidden; larger delays are clamped to it
const MAX_HIDDEN: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn hidden_until(now: Instant, d: Duration) -> Instant {
    deadline(now, d.min(MAX_HIDDEN)).unwrap_or(now)
}

struct QueuedEntry {
    payload: Vec<u8>,
    attempts: u32,
    visible_at: Option<Instant>,
}

/// In-process grant queue with the same visibility-timeout semantics as the
/// LMDB queue
pub struct MemoryGrantQueue {
    inner: Mutex<MemoryQueueInner>,
    visibility_timeout: Duration,
}

struct MemoryQueueInner {
    next_id: DeliveryId,
    messages: BTreeMap<DeliveryId, QueuedEntry>,
}

impl MemoryGrantQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(MemoryQueueInner {
                next_id: 1,
                messages: BTreeMap::new(),
            }),
            visibility_timeout,
        }
    }
}

impl Default for MemoryGrantQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl GrantQueue for MemoryGrantQueue {
    fn push(&self, payload: &[u8]) -> Result<DeliveryId> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.messages.insert(
            id,
            QueuedEntry {
                payload: payload.to_vec(),
                attempts: 0,
                visible_at: None,
            },
        );
        Ok(id)
    }

    fn pop(&self) -> Result<Option<Delivery>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let visible = inner
            .messages
            .iter_mut()
            .find(|(_, m)| m.visible_at.map_or(true, |at| at <= now));

        Ok(visible.map(|(id, message)| {
            message.attempts += 1;
            message.visible_at = Some(hidden_until(now, self.visibility_timeout));
            Delivery {
                id: *id,
                attempts: message.attempts,
                payload: message.payload.clone(),
            }
        }))
    }

    fn ack(&self, id: DeliveryId) -> Result<()> {
        self.inner.lock().messages.remove(&id);
        Ok(())
    }

    fn nack(&self, id: DeliveryId, delay: Duration) -> Result<()> {
        if let Some(message) = self.inner.lock().messages.get_mut(&id) {
            message.visible_at = Some(hidden_until(Instant::now(), delay));
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.lock().messages.len())
    }
}

/// In-process record sink enforcing unique natural keys
#[derive(Default)]
pub struct MemoryRecordSink {
    grants: Mutex<Vec<GrantEvent>>,
    keys: Mutex<HashSet<String>>,
    registrations: Mutex<Vec<Registration>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grants(&self) -> Vec<GrantEvent> {
        self.grants.lock().clone()
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().clone()
    }

    fn claim(&self, natural_key: String) -> InsertOutcome {
        if self.keys.lock().insert(natural_key) {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyExists
        }
    }
}

impl RecordSink for MemoryRecordSink {
    fn insert_grant(&self, event: &GrantEvent) -> Result<InsertOutcome> {
        let outcome = self.claim(event.natural_key());
        if outcome == InsertOutcome::Inserted {
            self.grants.lock().push(event.clone());
        }
        Ok(outcome)
    }

    fn insert_registration(&self, registration: &Registration) -> Result<InsertOutcome> {
        let outcome = self.claim(registration.natural_key());
        if outcome == InsertOutcome::Inserted {
            self.registrations.lock().push(registration.clone());
        }
        Ok(outcome)
    }

    fn grant_count(&self) -> Result<u64> {
        Ok(self.grants.lock().len() as u64)
    }

    fn registration_count(&self) -> Result<u64> {
        Ok(self.registrations.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_discards_writes() {
        let store = MemoryCounterStore::new();
        let result: Result<()> = store.transact(&["a"], |txn| {
            txn.put("a", 9)?;
            Err(prizeflow_core::PrizeError::InvalidState("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.read_counter("a").unwrap(), None);
    }

    #[test]
    fn test_script_sees_its_own_writes() {
        let store = MemoryCounterStore::new();
        let value = store
            .transact(&["a"], |txn| {
                txn.incr("a")?;
                txn.incr("a")
            })
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(store.read_counter("a").unwrap(), Some(2));
    }

    #[test]
    fn test_marker_expiry_and_purge() {
        let store = MemoryCounterStore::new();
        assert!(store
            .set_if_absent("m", Some(Duration::from_millis(10)))
            .unwrap());
        assert!(!store.set_if_absent("m", None).unwrap());
        std::thread::sleep(Duration::from_millis(25));

        assert!(!store.exists("m").unwrap());
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_queue_visibility_and_nack() {
        let queue = MemoryGrantQueue::new(Duration::from_secs(60));
        let id = queue.push(b"x").unwrap();

        assert_eq!(queue.pop().unwrap().unwrap().attempts, 1);
        assert!(queue.pop().unwrap().is_none());

        queue.nack(id, Duration::ZERO).unwrap();
        assert_eq!(queue.pop().unwrap().unwrap().attempts, 2);

        queue.nack(id, Duration::from_millis(40)).unwrap();
        assert!(queue.pop().unwrap().is_none());
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(queue.pop().unwrap().unwrap().attempts, 3);

        queue.ack(id).unwrap();
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_unbounded_durations_do_not_panic() {
        let store = MemoryCounterStore::new();
        assert!(store.set_if_absent("far", Some(Duration::MAX)).unwrap());
        store.set_marker("far-marker", Some(Duration::MAX)).unwrap();
        assert!(store.exists("far").unwrap());
        assert!(store.exists("far-marker").unwrap());
        assert_eq!(store.purge_expired().unwrap(), 0);

        let queue = MemoryGrantQueue::new(Duration::MAX);
        let id = queue.push(b"x").unwrap();
        queue.pop().unwrap().unwrap();
        assert!(queue.pop().unwrap().is_none());
        queue.nack(id, Duration::MAX).unwrap();
        assert!(queue.pop().unwrap().is_none());
        assert_eq!(queue.len().unwrap(), 1);
    }
}
