//! Idempotent recorder
//!
//! Drains the grant queue and persists each logical fact exactly once:
//!
//! 1. derive the natural key of the message
//! 2. check the short-lived dedup marker; a hit is logged as a duplicate
//!    but the write is still attempted
//! 3. refresh the marker
//! 4. insert into the record sink, where a uniqueness conflict is a
//!    successful no-op
//! 5. ack the delivery
//!
//! The sink's unique constraint is what guarantees one row per natural key;
//! the marker only saves work on quick redeliveries. A failing message is
//! nacked with a delay that doubles per attempt and retried until
//! `max_delivery_attempts`, then moved to the dead-letter log. A retry ends
//! the current batch, so an outage of the sink is waited out rather than
//! burning every attempt in one pass. No single message can stop the loop.

use prizeflow_core::{
    observe,
    traits::{CounterStore, GrantQueue, RecordSink},
    Delivery, InsertOutcome, QueueMessage, RecordOutcome, RecorderConfig, Result,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::dead_letter::{DeadLetter, DeadLetterLog, DeadLetterSource};
use crate::keys;

/// Exponential sleep used while the queue is empty
#[derive(Debug, Clone)]
pub struct IdleBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl IdleBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Delay to sleep now; the following call returns twice as much, up to `max`
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Counters describing what the recorder has done so far
#[derive(Debug, Default)]
pub struct RecorderStats {
    recorded: AtomicU64,
    duplicates: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Point-in-time copy of [`RecorderStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecorderStatsSnapshot {
    pub recorded: u64,
    pub duplicates: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

impl RecorderStats {
    pub fn snapshot(&self) -> RecorderStatsSnapshot {
        RecorderStatsSnapshot {
            recorded: self.recorded.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// What happened to one popped delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Recorded(RecordOutcome),
    /// Recording failed; the message goes back to the queue
    Retried,
    DeadLettered,
}

pub struct Recorder<S, Q, R>
where
    S: CounterStore,
    Q: GrantQueue,
    R: RecordSink,
{
    store: Arc<S>,
    queue: Arc<Q>,
    sink: Arc<R>,
    dead_letters: Option<Arc<DeadLetterLog>>,
    config: RecorderConfig,
    shutdown: Arc<AtomicBool>,
    stats: Arc<RecorderStats>,
}

impl<S, Q, R> Recorder<S, Q, R>
where
    S: CounterStore,
    Q: GrantQueue,
    R: RecordSink,
{
    pub fn new(store: Arc<S>, queue: Arc<Q>, sink: Arc<R>, config: RecorderConfig) -> Self {
        Self {
            store,
            queue,
            sink,
            dead_letters: None,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RecorderStats::default()),
        }
    }

    pub fn with_dead_letter_log(mut self, log: Arc<DeadLetterLog>) -> Self {
        self.dead_letters = Some(log);
        self
    }

    /// Run until shutdown is signaled
    ///
    /// Sleeps with exponential backoff while the queue is empty; the sleep
    /// resets as soon as a message is found.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Recorder started");
        let mut backoff = self.backoff();

        while !self.shutdown.load(Ordering::SeqCst) {
            if self.poll_batch() == 0 {
                tokio::time::sleep(backoff.next_delay()).await;
            } else {
                backoff.reset();
            }
        }

        tracing::info!(stats = ?self.stats.snapshot(), "Recorder shutdown");
        Ok(())
    }

    /// Run on the current thread until shutdown is signaled
    pub fn run_blocking(&self) -> Result<()> {
        tracing::info!("Recorder started (blocking mode)");
        let mut backoff = self.backoff();

        while !self.shutdown.load(Ordering::SeqCst) {
            if self.poll_batch() == 0 {
                std::thread::sleep(backoff.next_delay());
            } else {
                backoff.reset();
            }
        }

        tracing::info!(stats = ?self.stats.snapshot(), "Recorder shutdown");
        Ok(())
    }

    fn backoff(&self) -> IdleBackoff {
        IdleBackoff::new(
            self.config.idle_backoff_initial(),
            self.config.idle_backoff_max(),
        )
    }

    /// `drain_batch` for the loop: a queue failure counts as an idle poll
    fn poll_batch(&self) -> usize {
        match self.drain_batch() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Grant queue unavailable, backing off");
                0
            }
        }
    }

    /// Handle up to `batch_size` deliveries
    ///
    /// Returns how many deliveries were handled. Stops early when the queue
    /// is empty, a delivery had to be retried or shutdown is signaled.
    pub fn drain_batch(&self) -> Result<usize> {
        let mut handled = 0;
        while handled < self.config.batch_size && !self.shutdown.load(Ordering::SeqCst) {
            match self.process_one()? {
                None => break,
                Some(DeliveryResult::Retried) => {
                    handled += 1;
                    break;
                }
                Some(_) => handled += 1,
            }
        }
        if handled > 0 {
            tracing::debug!("Handled {} deliveries", handled);
        }
        Ok(handled)
    }

    /// Pop and handle one delivery, `None` when nothing was deliverable
    ///
    /// Only queue failures are returned as errors; everything that goes
    /// wrong with an individual message is settled here.
    pub fn process_one(&self) -> Result<Option<DeliveryResult>> {
        let Some(delivery) = self.queue.pop()? else {
            return Ok(None);
        };

        let message = match QueueMessage::decode(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(id = delivery.id, error = %e, "Undecodable queue payload");
                let entry =
                    DeadLetter::new(DeadLetterSource::Undecodable, &delivery.payload, e.to_string())
                        .with_delivery(delivery.id, delivery.attempts);
                return Ok(Some(self.dead_letter(&delivery, entry)));
            }
        };

        match self.record(&message) {
            Ok(outcome) => {
                if let Err(e) = self.queue.ack(delivery.id) {
                    // Redelivery is harmless: the next insert reports AlreadyExists
                    tracing::warn!(id = delivery.id, error = %e, "Ack failed after recording");
                }
                self.stats.recorded.fetch_add(1, Ordering::Relaxed);
                if outcome.is_duplicate() {
                    self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                    observe::record_message("duplicate");
                } else {
                    observe::record_message("recorded");
                }
                Ok(Some(DeliveryResult::Recorded(outcome)))
            }
            Err(e) if delivery.attempts >= self.config.max_delivery_attempts => {
                tracing::error!(
                    id = delivery.id,
                    attempts = delivery.attempts,
                    natural_key = %message.natural_key(),
                    error = %e,
                    "Giving up on message"
                );
                let entry = DeadLetter::new(
                    DeadLetterSource::AttemptsExhausted,
                    &delivery.payload,
                    e.to_string(),
                )
                .with_delivery(delivery.id, delivery.attempts)
                .with_natural_key(message.natural_key());
                Ok(Some(self.dead_letter(&delivery, entry)))
            }
            Err(e) => {
                tracing::warn!(
                    id = delivery.id,
                    attempts = delivery.attempts,
                    natural_key = %message.natural_key(),
                    error = %e,
                    "Recording failed, will retry"
                );
                self.retry(&delivery);
                Ok(Some(DeliveryResult::Retried))
            }
        }
    }

    /// Persist one message idempotently
    pub fn record(&self, message: &QueueMessage) -> Result<RecordOutcome> {
        let natural_key = message.natural_key();
        let marker = keys::dedup(&natural_key);

        let marker_hit = match self.store.exists(&marker) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(natural_key = %natural_key, error = %e, "Dedup marker check failed");
                false
            }
        };
        if marker_hit {
            tracing::warn!(natural_key = %natural_key, "Duplicate message");
        }

        if let Err(e) = self.store.set_marker(&marker, Some(self.config.dedup_ttl())) {
            tracing::warn!(natural_key = %natural_key, error = %e, "Failed to set dedup marker");
        }

        let insert = match message {
            QueueMessage::Grant(event) => self.sink.insert_grant(event)?,
            QueueMessage::Registration(registration) => {
                self.sink.insert_registration(registration)?
            }
        };

        match insert {
            InsertOutcome::Inserted => {
                tracing::info!(natural_key = %natural_key, "Message recorded")
            }
            InsertOutcome::AlreadyExists => {
                tracing::info!(natural_key = %natural_key, "Already recorded, nothing written")
            }
        }

        Ok(RecordOutcome { marker_hit, insert })
    }

    fn retry(&self, delivery: &Delivery) {
        self.stats.retried.fetch_add(1, Ordering::Relaxed);
        observe::record_message("retried");
        let delay = self.config.retry_delay(delivery.attempts);
        tracing::debug!(id = delivery.id, delay = ?delay, "Redelivery delayed");
        if let Err(e) = self.queue.nack(delivery.id, delay) {
            // The visibility timeout brings it back anyway
            tracing::warn!(id = delivery.id, error = %e, "Nack failed");
        }
    }

    fn dead_letter(&self, delivery: &Delivery, entry: DeadLetter) -> DeliveryResult {
        let Some(log) = &self.dead_letters else {
            tracing::error!(
                id = delivery.id,
                "No dead-letter log configured, dropping message"
            );
            self.settle_dead(delivery);
            return DeliveryResult::DeadLettered;
        };

        match log.append(&entry) {
            Ok(()) => {
                self.settle_dead(delivery);
                DeliveryResult::DeadLettered
            }
            Err(e) => {
                tracing::error!(
                    id = delivery.id,
                    error = %e,
                    "Dead-letter write failed, keeping message"
                );
                self.retry(delivery);
                DeliveryResult::Retried
            }
        }
    }

    fn settle_dead(&self, delivery: &Delivery) {
        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
        observe::record_message("dead_lettered");
        if let Err(e) = self.queue.ack(delivery.id) {
            tracing::warn!(id = delivery.id, error = %e, "Ack of dead-lettered message failed");
        }
    }

    /// Signal graceful shutdown; the loop exits after the in-flight delivery
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn stats(&self) -> RecorderStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Cloneable handle that stops a running recorder
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
