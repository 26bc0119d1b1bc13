//! Unified prizeflow database
//!
//! Bundles the counter store, the grant queue, the record store and the
//! dead-letter log under one data directory:
//!
//! ```text
//! {path}/counters/            LMDB counter store
//! {path}/queue/               LMDB grant queue
//! {path}/records.db           SQLite record store
//! {path}/dead_letters.jsonl   dead-letter log
//! ```

use prizeflow_core::{
    traits::{CounterStore, GrantQueue, RecordSink},
    CounterStoreConfig, LotteryConfig, QueueConfig, RecordStoreConfig, RecorderConfig, Result,
    SyncMode,
};
use prizeflow_lmdb::{LmdbCounterStore, LmdbGrantQueue};
use prizeflow_sqlite::SqliteRecordStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::allocator::{PrizeAllocator, TierUsage};
use crate::dead_letter::DeadLetterLog;
use crate::lottery::Lottery;
use crate::recorder::Recorder;

/// Everything needed to open a [`PrizeflowDb`], loadable from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrizeflowConfig {
    #[serde(default)]
    pub lottery: LotteryConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Durability of both LMDB environments
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Redelivery delay for unacked queue messages (milliseconds)
    #[serde(default)]
    pub visibility_timeout_ms: Option<u64>,
}

impl PrizeflowConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.lottery.validate()?;
        self.recorder.validate()
    }
}

/// Snapshot returned by [`PrizeflowDb::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub tiers: Vec<TierUsage>,
    /// Queue messages not yet acked, in flight or not
    pub queue_depth: usize,
    pub grants: u64,
    pub registrations: u64,
    pub dead_letters: usize,
}

pub type DbLottery = Lottery<LmdbCounterStore, LmdbGrantQueue>;
pub type DbRecorder = Recorder<LmdbCounterStore, LmdbGrantQueue, SqliteRecordStore>;

pub struct PrizeflowDb {
    counters: Arc<LmdbCounterStore>,
    queue: Arc<LmdbGrantQueue>,
    records: Arc<SqliteRecordStore>,
    dead_letters: Arc<DeadLetterLog>,
    config: PrizeflowConfig,
    base_path: PathBuf,
}

impl PrizeflowDb {
    /// Open with default configuration
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PrizeflowConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PrizeflowConfig) -> Result<Self> {
        config.validate()?;
        let base_path = path.as_ref().to_path_buf();

        let counters_cfg =
            CounterStoreConfig::new(base_path.join("counters")).with_sync_mode(config.sync_mode);

        let mut queue_cfg =
            QueueConfig::new(base_path.join("queue")).with_sync_mode(config.sync_mode);
        if let Some(ms) = config.visibility_timeout_ms {
            queue_cfg = queue_cfg.with_visibility_timeout(ms);
        }

        let records_cfg = RecordStoreConfig::new(base_path.join("records.db"));

        let counters = Arc::new(LmdbCounterStore::open(counters_cfg)?);
        let queue = Arc::new(LmdbGrantQueue::open(queue_cfg)?);
        let records = Arc::new(SqliteRecordStore::open(records_cfg)?);
        let dead_letters = DeadLetterLog::open(&base_path)?;

        tracing::info!(path = %base_path.display(), "Prizeflow database opened");

        Ok(Self {
            counters,
            queue,
            records,
            dead_letters,
            config,
            base_path,
        })
    }

    pub fn counters(&self) -> &Arc<LmdbCounterStore> {
        &self.counters
    }

    pub fn queue(&self) -> &Arc<LmdbGrantQueue> {
        &self.queue
    }

    pub fn records(&self) -> &Arc<SqliteRecordStore> {
        &self.records
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterLog> {
        &self.dead_letters
    }

    pub fn config(&self) -> &PrizeflowConfig {
        &self.config
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Request path wired to this database's stores
    pub fn lottery(&self) -> Result<DbLottery> {
        Ok(Lottery::new(
            self.counters.clone(),
            self.queue.clone(),
            self.config.lottery.clone(),
        )?
        .with_dead_letter_log(self.dead_letters.clone()))
    }

    /// Recorder draining this database's queue into its record store
    pub fn recorder(&self) -> DbRecorder {
        Recorder::new(
            self.counters.clone(),
            self.queue.clone(),
            self.records.clone(),
            self.config.recorder.clone(),
        )
        .with_dead_letter_log(self.dead_letters.clone())
    }

    /// Read-only overview of counters, queue and records
    pub fn status(&self) -> Result<Status> {
        let allocator =
            PrizeAllocator::new(self.counters.clone(), self.config.lottery.tiers.clone());
        Ok(Status {
            tiers: allocator.usage()?,
            queue_depth: self.queue.len()?,
            grants: self.records.grant_count()?,
            registrations: self.records.registration_count()?,
            dead_letters: self.dead_letters.entry_count()?,
        })
    }

    /// Drop expired participation and dedup markers
    pub fn purge_expired(&self) -> Result<usize> {
        let purged = self.counters.purge_expired()?;
        tracing::info!(purged, "Expired markers purged");
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_partial_json() {
        let config = PrizeflowConfig::from_json(
            r#"{
                "lottery": {
                    "tiers": [{"name": "card", "global_capacity": 3}],
                    "classifier": {"policy": "allow_list", "entries": {"vip": "card"}}
                },
                "sync_mode": "NoSync"
            }"#,
        )
        .unwrap();

        assert_eq!(config.lottery.tiers.len(), 1);
        assert_eq!(config.lottery.participation_ttl_secs, 86_400);
        assert_eq!(config.recorder.dedup_ttl_secs, 1800);
        assert_eq!(config.sync_mode, SyncMode::NoSync);
    }

    #[test]
    fn test_config_rejects_unknown_tier_reference() {
        let result = PrizeflowConfig::from_json(
            r#"{"lottery": {
                "tiers": [],
                "classifier": {"policy": "allow_list", "entries": {"vip": "card"}}
            }}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_unbounded_ttls() {
        let json = format!(r#"{{"recorder": {{"dedup_ttl_secs": {}}}}}"#, u64::MAX);
        assert!(PrizeflowConfig::from_json(&json).is_err());

        let mut config = PrizeflowConfig::default();
        config.lottery.participation_ttl_secs = u64::MAX;
        let dir = tempfile::tempdir().unwrap();
        assert!(PrizeflowDb::open_with_config(dir.path(), config).is_err());
    }

    #[test]
    fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let db = PrizeflowDb::open(dir.path()).unwrap();

        assert!(dir.path().join("counters").is_dir());
        assert!(dir.path().join("queue").is_dir());
        assert!(dir.path().join("records.db").exists());
        assert!(db.dead_letters().path().exists());

        let status = db.status().unwrap();
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.grants, 0);
        assert_eq!(status.tiers.len(), 2);
    }
}
