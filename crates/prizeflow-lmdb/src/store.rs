use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use prizeflow_core::{
    traits::{CounterStore, CounterTxn},
    CounterStoreConfig, PrizeError, Result,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::env::{now_ms, open_env};
use crate::keys::Entry;
use crate::txn::LmdbCounterTxn;

fn unavailable(e: lmdb::Error) -> PrizeError {
    PrizeError::StoreUnavailable(e.to_string())
}

/// LMDB-backed counter store
///
/// LMDB admits one write transaction at a time per environment (across
/// threads and processes), which is what makes `transact` scripts
/// linearizable: the read-check-increment sequence of one script cannot
/// interleave with another's.
pub struct LmdbCounterStore {
    env: Arc<Environment>,
    db: Database,
    path: PathBuf,
}

impl LmdbCounterStore {
    pub fn open(cfg: CounterStoreConfig) -> Result<Self> {
        let env = open_env(&cfg.path, &cfg.env, 1)?;
        let db = env
            .create_db(Some("counters"), DatabaseFlags::empty())
            .map_err(unavailable)?;

        tracing::info!(path = %cfg.path.display(), "Counter store opened");

        Ok(Self {
            env: Arc::new(env),
            db,
            path: cfg.path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entry(&self, key: &str) -> Result<Option<Entry>> {
        let txn = self.env.begin_ro_txn().map_err(unavailable)?;
        match txn.get(self.db, &key) {
            Ok(bytes) => Ok(Some(Entry::decode(bytes)?)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(unavailable(e)),
        }
    }
}

impl CounterStore for LmdbCounterStore {
    fn set_if_absent(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
        let now = now_ms();
        let mut txn = self.env.begin_rw_txn().map_err(unavailable)?;

        let live = match txn.get(self.db, &key) {
            Ok(bytes) => Entry::decode(bytes)?.is_live(now),
            Err(lmdb::Error::NotFound) => false,
            Err(e) => return Err(unavailable(e)),
        };
        if live {
            txn.abort();
            return Ok(false);
        }

        txn.put(
            self.db,
            &key,
            &Entry::expiring(1, now, ttl).encode(),
            WriteFlags::empty(),
        )
        .map_err(unavailable)?;
        txn.commit().map_err(unavailable)?;
        Ok(true)
    }

    fn set_marker(&self, key: &str, ttl: Option<Duration>) -> Result<()> {
        let mut txn = self.env.begin_rw_txn().map_err(unavailable)?;
        txn.put(
            self.db,
            &key,
            &Entry::expiring(1, now_ms(), ttl).encode(),
            WriteFlags::empty(),
        )
        .map_err(unavailable)?;
        txn.commit().map_err(unavailable)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .read_entry(key)?
            .map(|e| e.is_live(now_ms()))
            .unwrap_or(false))
    }

    fn read_counter(&self, key: &str) -> Result<Option<u64>> {
        let now = now_ms();
        Ok(self
            .read_entry(key)?
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = now_ms();
        let mut txn = self.env.begin_rw_txn().map_err(unavailable)?;

        let expired: Vec<Vec<u8>> = {
            let mut cursor = txn.open_ro_cursor(self.db).map_err(unavailable)?;
            let mut keys = Vec::new();
            for (key, value) in cursor.iter() {
                if let Ok(entry) = Entry::decode(value) {
                    if !entry.is_live(now) {
                        keys.push(key.to_vec());
                    }
                }
            }
            keys
        };

        for key in &expired {
            match txn.del(self.db, key, None) {
                Ok(()) | Err(lmdb::Error::NotFound) => {}
                Err(e) => return Err(unavailable(e)),
            }
        }
        txn.commit().map_err(unavailable)?;

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Purged expired markers");
        }
        Ok(expired.len())
    }

    fn transact<T, F>(&self, _keys: &[&str], script: F) -> Result<T>
    where
        F: FnOnce(&mut dyn CounterTxn) -> Result<T>,
    {
        // A single write transaction covers every key, declared or not
        let mut txn = self.env.begin_rw_txn().map_err(unavailable)?;

        let outcome = {
            let mut ctx = LmdbCounterTxn::new(&mut txn, self.db, now_ms());
            script(&mut ctx)
        };

        match outcome {
            Ok(value) => {
                txn.commit().map_err(unavailable)?;
                Ok(value)
            }
            Err(e) => {
                txn.abort();
                Err(e)
            }
        }
    }
}
