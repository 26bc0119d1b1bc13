//! Recorder behavior under redelivery and failing sinks

use chrono::{TimeZone, Utc};
use prizeflow::{
    CounterStore, DeadLetterLog, DeadLetterSource, DeliveryResult, GrantEvent, GrantQueue,
    InsertOutcome, MemoryCounterStore, MemoryGrantQueue, ParticipantId, Prize, PrizeError,
    QueueMessage, RecordSink, Recorder, RecorderConfig, RecordStoreConfig, Registration, Result,
    SqliteRecordStore,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn grant(participant: &str, tier: &str) -> QueueMessage {
    let day = "20261019".parse().unwrap();
    QueueMessage::from(GrantEvent::new(
        ParticipantId::new(participant).unwrap(),
        Prize::Tier(tier.into()),
        day,
    ))
}

fn sqlite(dir: &tempfile::TempDir) -> Arc<SqliteRecordStore> {
    let cfg = RecordStoreConfig::new(dir.path().join("records.db"));
    Arc::new(SqliteRecordStore::open(cfg).unwrap())
}

#[test]
fn test_replayed_event_yields_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let records = sqlite(&dir);
    let queue = Arc::new(MemoryGrantQueue::default());
    let recorder = Recorder::new(
        Arc::new(MemoryCounterStore::new()),
        queue.clone(),
        records.clone(),
        RecorderConfig::default(),
    );

    let payload = grant("13888300000", "card").encode().unwrap();
    for _ in 0..5 {
        queue.push(&payload).unwrap();
    }

    assert_eq!(recorder.drain_batch().unwrap(), 5);
    assert_eq!(records.grant_count().unwrap(), 1);
    assert!(queue.is_empty().unwrap());

    let stats = recorder.stats();
    assert_eq!(stats.recorded, 5);
    assert_eq!(stats.duplicates, 4);
}

#[test]
fn test_replay_after_marker_expiry_still_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let records = sqlite(&dir);
    let store = Arc::new(MemoryCounterStore::new());
    let queue = Arc::new(MemoryGrantQueue::default());
    let recorder = Recorder::new(
        store.clone(),
        queue.clone(),
        records.clone(),
        RecorderConfig::default().with_dedup_ttl_secs(0),
    );

    let message = grant("13888300000", "card");
    let first = recorder.record(&message).unwrap();
    let second = recorder.record(&message).unwrap();

    assert_eq!(first.insert, InsertOutcome::Inserted);
    assert!(!second.marker_hit);
    assert_eq!(second.insert, InsertOutcome::AlreadyExists);
    assert_eq!(records.grant_count().unwrap(), 1);
}

/// Sink that fails the first `failures` inserts, then delegates
struct FailingSink {
    inner: prizeflow::MemoryRecordSink,
    failures: AtomicU32,
}

impl FailingSink {
    fn new(failures: u32) -> Self {
        Self {
            inner: prizeflow::MemoryRecordSink::new(),
            failures: AtomicU32::new(failures),
        }
    }

    fn trip(&self) -> Result<()> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(PrizeError::Persistence("database is locked".into()));
        }
        Ok(())
    }
}

impl RecordSink for FailingSink {
    fn insert_grant(&self, event: &GrantEvent) -> Result<InsertOutcome> {
        self.trip()?;
        self.inner.insert_grant(event)
    }

    fn insert_registration(&self, registration: &Registration) -> Result<InsertOutcome> {
        self.trip()?;
        self.inner.insert_registration(registration)
    }

    fn grant_count(&self) -> Result<u64> {
        self.inner.grant_count()
    }

    fn registration_count(&self) -> Result<u64> {
        self.inner.registration_count()
    }
}

#[test]
fn test_transient_sink_failure_is_retried() {
    let queue = Arc::new(MemoryGrantQueue::default());
    let sink = Arc::new(FailingSink::new(2));
    let recorder = Recorder::new(
        Arc::new(MemoryCounterStore::new()),
        queue.clone(),
        sink.clone(),
        RecorderConfig::default().with_retry_backoff(0, 0),
    );

    queue.push(&grant("13888300000", "card").encode().unwrap()).unwrap();

    assert_eq!(recorder.process_one().unwrap(), Some(DeliveryResult::Retried));
    assert_eq!(recorder.process_one().unwrap(), Some(DeliveryResult::Retried));
    assert!(matches!(
        recorder.process_one().unwrap(),
        Some(DeliveryResult::Recorded(_))
    ));

    assert_eq!(sink.grant_count().unwrap(), 1);
    assert_eq!(recorder.stats().retried, 2);
    assert!(queue.is_empty().unwrap());
}

#[test]
fn test_poison_message_does_not_block_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let log = DeadLetterLog::open(dir.path()).unwrap();
    let queue = Arc::new(MemoryGrantQueue::default());
    let sink = Arc::new(FailingSink::new(3));
    let recorder = Recorder::new(
        Arc::new(MemoryCounterStore::new()),
        queue.clone(),
        sink.clone(),
        RecorderConfig::default()
            .with_max_delivery_attempts(3)
            .with_retry_backoff(0, 0),
    )
    .with_dead_letter_log(log.clone());

    queue.push(&grant("13888300000", "card").encode().unwrap()).unwrap();
    queue.push(b"not json").unwrap();

    // Enough rounds for the failing grant to exhaust its attempts
    for _ in 0..10 {
        if recorder.process_one().unwrap().is_none() {
            break;
        }
    }

    assert!(queue.is_empty().unwrap());
    assert_eq!(sink.grant_count().unwrap(), 0);

    let entries = log.read_all().unwrap();
    assert_eq!(entries.len(), 2);
    let sources: Vec<_> = entries.iter().map(|e| e.source).collect();
    assert!(sources.contains(&DeadLetterSource::Undecodable));
    assert!(sources.contains(&DeadLetterSource::AttemptsExhausted));

    let exhausted = entries
        .iter()
        .find(|e| e.source == DeadLetterSource::AttemptsExhausted)
        .unwrap();
    assert_eq!(exhausted.attempts, 3);
    assert!(!exhausted.requires_reconciliation);
    let replayed = QueueMessage::decode(&exhausted.payload().unwrap()).unwrap();
    assert_eq!(
        replayed.natural_key(),
        grant("13888300000", "card").natural_key()
    );
}

/// Sink whose inserts fail until `until`, like a database that is briefly down
struct OutageSink {
    inner: prizeflow::MemoryRecordSink,
    until: Instant,
}

impl OutageSink {
    fn new(outage: Duration) -> Self {
        Self {
            inner: prizeflow::MemoryRecordSink::new(),
            until: Instant::now() + outage,
        }
    }

    fn check(&self) -> Result<()> {
        if Instant::now() < self.until {
            return Err(PrizeError::Persistence("database is locked".into()));
        }
        Ok(())
    }
}

impl RecordSink for OutageSink {
    fn insert_grant(&self, event: &GrantEvent) -> Result<InsertOutcome> {
        self.check()?;
        self.inner.insert_grant(event)
    }

    fn insert_registration(&self, registration: &Registration) -> Result<InsertOutcome> {
        self.check()?;
        self.inner.insert_registration(registration)
    }

    fn grant_count(&self) -> Result<u64> {
        self.inner.grant_count()
    }

    fn registration_count(&self) -> Result<u64> {
        self.inner.registration_count()
    }
}

#[test]
fn test_short_outage_is_waited_out_not_dead_lettered() {
    let dir = tempfile::tempdir().unwrap();
    let log = DeadLetterLog::open(dir.path()).unwrap();
    let queue = Arc::new(MemoryGrantQueue::default());
    let sink = Arc::new(OutageSink::new(Duration::from_millis(200)));
    let recorder = Recorder::new(
        Arc::new(MemoryCounterStore::new()),
        queue.clone(),
        sink.clone(),
        RecorderConfig::default()
            .with_max_delivery_attempts(5)
            .with_retry_backoff(100, 1000),
    )
    .with_dead_letter_log(log.clone());

    queue.push(&grant("13888300000", "card").encode().unwrap()).unwrap();

    // One pass during the outage retries once and leaves the rest for later
    assert_eq!(recorder.drain_batch().unwrap(), 1);
    let stats = recorder.stats();
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.dead_lettered, 0);
    assert_eq!(queue.len().unwrap(), 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.grant_count().unwrap() == 0 && Instant::now() < deadline {
        recorder.drain_batch().unwrap();
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(sink.grant_count().unwrap(), 1);
    assert!(queue.is_empty().unwrap());
    let stats = recorder.stats();
    assert_eq!(stats.dead_lettered, 0);
    assert!(stats.retried < 5);
    assert_eq!(log.entry_count().unwrap(), 0);
}

#[test]
fn test_retry_ends_the_batch() {
    let queue = Arc::new(MemoryGrantQueue::default());
    let sink = Arc::new(FailingSink::new(1));
    let recorder = Recorder::new(
        Arc::new(MemoryCounterStore::new()),
        queue.clone(),
        sink.clone(),
        RecorderConfig::default().with_retry_backoff(60_000, 60_000),
    );

    queue.push(&grant("13888300000", "card").encode().unwrap()).unwrap();
    queue.push(&grant("13888300001", "card").encode().unwrap()).unwrap();

    // The first grant fails and ends the pass; the second waits for the next one
    assert_eq!(recorder.drain_batch().unwrap(), 1);
    assert_eq!(sink.grant_count().unwrap(), 0);

    assert_eq!(recorder.drain_batch().unwrap(), 1);
    assert_eq!(sink.grant_count().unwrap(), 1);

    // The failed grant is hidden for its backoff delay
    assert_eq!(recorder.drain_batch().unwrap(), 0);
    assert_eq!(queue.len().unwrap(), 1);
}

#[test]
fn test_dedup_marker_written_with_ttl() {
    let store = Arc::new(MemoryCounterStore::new());
    let recorder = Recorder::new(
        store.clone(),
        Arc::new(MemoryGrantQueue::default()),
        Arc::new(prizeflow::MemoryRecordSink::new()),
        RecorderConfig::default(),
    );

    let message = grant("13888300000", "card");
    recorder.record(&message).unwrap();

    let marker = format!("dedup:{}", message.natural_key());
    assert!(store.exists(&marker).unwrap());
}

#[tokio::test]
async fn test_run_drains_and_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let records = sqlite(&dir);
    let queue = Arc::new(MemoryGrantQueue::default());
    let recorder = Arc::new(Recorder::new(
        Arc::new(MemoryCounterStore::new()),
        queue.clone(),
        records.clone(),
        RecorderConfig::default().with_idle_backoff(1, 5),
    ));

    let at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
    for i in 0..20 {
        let mut event = GrantEvent::new(
            ParticipantId::new(format!("1388830{:04}", i)).unwrap(),
            Prize::NoPrize,
            "20261019".parse().unwrap(),
        );
        event.granted_at = at;
        queue.push(&QueueMessage::from(event).encode().unwrap()).unwrap();
    }

    let handle = recorder.shutdown_handle();
    let runner = {
        let recorder = Arc::clone(&recorder);
        tokio::spawn(async move { recorder.run().await })
    };

    for _ in 0..100 {
        if records.grant_count().unwrap() == 20 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.shutdown();
    runner.await.unwrap().unwrap();

    assert!(handle.is_shutdown());
    assert_eq!(records.grant_count().unwrap(), 20);
    assert!(queue.is_empty().unwrap());
}
