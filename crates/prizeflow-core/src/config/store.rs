use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How an LMDB environment is sized and synced
///
/// Shared by the counter store and the grant queue; flattened into both
/// configs, so JSON keeps the fields at the top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvTuning {
    /// Upper bound of the memory map in bytes (default 1 GiB)
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Concurrent read transactions (default 126)
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,
}

impl Default for EnvTuning {
    fn default() -> Self {
        Self {
            map_size: default_map_size(),
            sync_mode: SyncMode::default(),
            max_readers: default_max_readers(),
        }
    }
}

/// Durability of LMDB commits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// fsync on every commit.
    ///
    /// Grants and participation markers survive power loss. Highest latency.
    Full,

    /// Skip syncing the LMDB meta-page on each commit (default).
    ///
    /// Data pages are still synced; an OS crash may lose the last commit but
    /// the store stays consistent.
    #[default]
    NoMetaSync,

    /// No fsync at all. Only for tests and throwaway environments.
    NoSync,
}

/// Counter store location and tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterStoreConfig {
    pub path: PathBuf,

    #[serde(flatten)]
    pub env: EnvTuning,

    /// Stripes of the in-process store's key locks (default 256)
    #[serde(default = "default_stripe_count")]
    pub stripe_count: usize,

    /// How long a script waits for its key locks, in ms (default 5000)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// Grant queue location and redelivery timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub path: PathBuf,

    #[serde(flatten)]
    pub env: EnvTuning,

    /// How long a popped message stays invisible before it is redelivered
    /// (milliseconds, default: 30000)
    ///
    /// A consumer that crashes between `pop` and `ack` loses nothing: the
    /// message becomes visible again once this elapses.
    #[serde(default = "default_visibility_timeout_ms")]
    pub visibility_timeout_ms: u64,
}

fn default_map_size() -> usize {
    1 << 30
}

fn default_max_readers() -> u32 {
    126
}

fn default_stripe_count() -> usize {
    crate::lock_manager::DEFAULT_STRIPES
}

fn default_lock_timeout_ms() -> u64 {
    crate::lock_manager::DEFAULT_LOCK_TIMEOUT_MS
}

fn default_visibility_timeout_ms() -> u64 {
    30_000
}

impl CounterStoreConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            env: EnvTuning::default(),
            stripe_count: default_stripe_count(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.env.map_size = map_size;
        self
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.env.sync_mode = sync_mode;
        self
    }
}

impl QueueConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            env: EnvTuning::default(),
            visibility_timeout_ms: default_visibility_timeout_ms(),
        }
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.env.sync_mode = sync_mode;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout_ms: u64) -> Self {
        self.visibility_timeout_ms = timeout_ms;
        self
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }
}
