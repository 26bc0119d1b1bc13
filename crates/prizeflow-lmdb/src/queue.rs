use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use prizeflow_core::{
    traits::GrantQueue, Delivery, DeliveryId, PrizeError, QueueConfig, Result,
};
use std::sync::Arc;
use std::time::Duration;

use crate::env::{now_ms, open_env};
use crate::keys::{delivery_id_to_key, duration_ms, key_to_delivery_id, meta_keys, QueuedMessage};

fn transport(e: lmdb::Error) -> PrizeError {
    PrizeError::TransportFailure(e.to_string())
}

/// Durable at-least-once queue on LMDB
///
/// Messages are keyed by a monotonically increasing big-endian ID. `pop`
/// does not remove a message; it hides it for the visibility timeout and
/// bumps its attempt counter. A consumer that dies before `ack` sees the
/// message again once the timeout elapses.
pub struct LmdbGrantQueue {
    env: Arc<Environment>,
    messages: Database,
    meta: Database,
    visibility_timeout: Duration,
}

impl LmdbGrantQueue {
    pub fn open(cfg: QueueConfig) -> Result<Self> {
        let env = open_env(&cfg.path, &cfg.env, 2)?;
        let messages = env
            .create_db(Some("messages"), DatabaseFlags::empty())
            .map_err(transport)?;
        let meta = env
            .create_db(Some("meta"), DatabaseFlags::empty())
            .map_err(transport)?;

        // Stamp creation time on first open
        {
            let mut txn = env.begin_rw_txn().map_err(transport)?;
            match txn.get(meta, &meta_keys::CREATED_AT) {
                Ok(_) => txn.abort(),
                Err(lmdb::Error::NotFound) => {
                    let now = chrono::Utc::now().to_rfc3339();
                    txn.put(meta, &meta_keys::CREATED_AT, &now, WriteFlags::empty())
                        .map_err(transport)?;
                    txn.commit().map_err(transport)?;
                }
                Err(e) => return Err(transport(e)),
            }
        }

        tracing::info!(
            path = %cfg.path.display(),
            visibility_timeout_ms = cfg.visibility_timeout_ms,
            "Grant queue opened"
        );

        Ok(Self {
            env: Arc::new(env),
            messages,
            meta,
            visibility_timeout: cfg.visibility_timeout(),
        })
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    fn next_id<T: Transaction>(&self, txn: &T) -> Result<DeliveryId> {
        match txn.get(self.meta, &meta_keys::NEXT_DELIVERY_ID) {
            Ok(bytes) => key_to_delivery_id(bytes).ok_or_else(|| {
                PrizeError::TransportFailure("corrupt next_delivery_id".into())
            }),
            Err(lmdb::Error::NotFound) => Ok(1),
            Err(e) => Err(transport(e)),
        }
    }
}

impl GrantQueue for LmdbGrantQueue {
    fn push(&self, payload: &[u8]) -> Result<DeliveryId> {
        let mut txn = self.env.begin_rw_txn().map_err(transport)?;
        let id = self.next_id(&txn)?;

        let message = QueuedMessage::new(payload.to_vec());
        txn.put(
            self.messages,
            &delivery_id_to_key(id),
            &message.encode(),
            WriteFlags::empty(),
        )
        .map_err(transport)?;
        txn.put(
            self.meta,
            &meta_keys::NEXT_DELIVERY_ID,
            &delivery_id_to_key(id + 1),
            WriteFlags::empty(),
        )
        .map_err(transport)?;
        txn.commit().map_err(transport)?;

        tracing::trace!(id, bytes = payload.len(), "Message enqueued");
        Ok(id)
    }

    fn pop(&self) -> Result<Option<Delivery>> {
        let now = now_ms();
        let mut txn = self.env.begin_rw_txn().map_err(transport)?;

        let found = {
            let mut cursor = txn.open_ro_cursor(self.messages).map_err(transport)?;
            let mut found = None;
            for (key, value) in cursor.iter() {
                let message = match QueuedMessage::decode(value) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unreadable queue entry");
                        continue;
                    }
                };
                if message.visible_at_ms <= now {
                    if let Some(id) = key_to_delivery_id(key) {
                        found = Some((id, message));
                        break;
                    }
                }
            }
            found
        };

        let Some((id, mut message)) = found else {
            txn.abort();
            return Ok(None);
        };

        message.attempts = message.attempts.saturating_add(1);
        message.visible_at_ms = now.saturating_add(duration_ms(self.visibility_timeout));
        txn.put(
            self.messages,
            &delivery_id_to_key(id),
            &message.encode(),
            WriteFlags::empty(),
        )
        .map_err(transport)?;
        txn.commit().map_err(transport)?;

        Ok(Some(Delivery {
            id,
            attempts: message.attempts,
            payload: message.payload,
        }))
    }

    fn ack(&self, id: DeliveryId) -> Result<()> {
        let mut txn = self.env.begin_rw_txn().map_err(transport)?;
        match txn.del(self.messages, &delivery_id_to_key(id), None) {
            Ok(()) => txn.commit().map_err(transport),
            Err(lmdb::Error::NotFound) => {
                // Already acked by an earlier delivery of the same message
                txn.abort();
                Ok(())
            }
            Err(e) => Err(transport(e)),
        }
    }

    fn nack(&self, id: DeliveryId, delay: Duration) -> Result<()> {
        let visible_at_ms = now_ms().saturating_add(duration_ms(delay));
        let mut txn = self.env.begin_rw_txn().map_err(transport)?;
        let key = delivery_id_to_key(id);

        let mut message = match txn.get(self.messages, &key) {
            Ok(bytes) => QueuedMessage::decode(bytes)?,
            Err(lmdb::Error::NotFound) => {
                txn.abort();
                return Ok(());
            }
            Err(e) => return Err(transport(e)),
        };
        message.visible_at_ms = visible_at_ms;

        txn.put(self.messages, &key, &message.encode(), WriteFlags::empty())
            .map_err(transport)?;
        txn.commit().map_err(transport)
    }

    fn len(&self) -> Result<usize> {
        let txn = self.env.begin_ro_txn().map_err(transport)?;
        let mut cursor = txn.open_ro_cursor(self.messages).map_err(transport)?;
        Ok(cursor.iter().count())
    }
}
