use lmdb::{Database, RwTransaction, Transaction, WriteFlags};
use prizeflow_core::{traits::CounterTxn, PrizeError, Result};

use crate::keys::Entry;

/// Counter view over an open LMDB write transaction
///
/// Created by `LmdbCounterStore::transact`; the surrounding store commits or
/// aborts the transaction depending on the script's result.
pub struct LmdbCounterTxn<'t, 'env> {
    txn: &'t mut RwTransaction<'env>,
    db: Database,
    now_ms: u64,
}

impl<'t, 'env> LmdbCounterTxn<'t, 'env> {
    pub(crate) fn new(txn: &'t mut RwTransaction<'env>, db: Database, now_ms: u64) -> Self {
        Self { txn, db, now_ms }
    }
}

impl<'t, 'env> CounterTxn for LmdbCounterTxn<'t, 'env> {
    fn get(&self, key: &str) -> Result<Option<u64>> {
        match self.txn.get(self.db, &key) {
            Ok(bytes) => {
                let entry = Entry::decode(bytes)?;
                if entry.is_live(self.now_ms) {
                    Ok(Some(entry.value))
                } else {
                    Ok(None)
                }
            }
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(PrizeError::StoreUnavailable(e.to_string())),
        }
    }

    fn put(&mut self, key: &str, value: u64) -> Result<()> {
        self.txn
            .put(
                self.db,
                &key,
                &Entry::permanent(value).encode(),
                WriteFlags::empty(),
            )
            .map_err(|e| PrizeError::StoreUnavailable(e.to_string()))
    }
}
