//! End-to-end: draws through LMDB counters and queue into SQLite records

use chrono::{TimeZone, Utc};
use prizeflow::{
    CounterStore, DrawOutcome, GrantQueue, ParticipantId, Prize, PrizeflowConfig, PrizeflowDb,
    RecordSink, SyncMode,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn config() -> PrizeflowConfig {
    PrizeflowConfig {
        sync_mode: SyncMode::NoSync,
        ..PrizeflowConfig::default()
    }
}

#[test]
fn test_draws_are_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = PrizeflowDb::open_with_config(dir.path(), config()).unwrap();
    let lottery = db.lottery().unwrap();
    let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();

    let winner = ParticipantId::new("13888300000").unwrap();
    let loser = ParticipantId::new("13700000000").unwrap();

    assert_eq!(lottery.draw(&winner, at), DrawOutcome::TierGranted("card".into()));
    assert_eq!(lottery.draw(&loser, at), DrawOutcome::NoPrize);
    lottery.register(&winner, "hello").unwrap();
    assert_eq!(db.queue().len().unwrap(), 3);

    let recorder = db.recorder();
    assert_eq!(recorder.drain_batch().unwrap(), 3);

    let status = db.status().unwrap();
    assert_eq!(status.queue_depth, 0);
    assert_eq!(status.grants, 2);
    assert_eq!(status.registrations, 1);
    assert_eq!(status.dead_letters, 0);

    let card = status.tiers.iter().find(|t| t.tier == "card").unwrap();
    assert_eq!(card.issued, 1);
    assert_eq!(card.remaining(), 99);

    let rows = db.records().grants_for(&winner).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].prize, Prize::Tier("card".into()));
    assert_eq!(db.records().prize_count(&Prize::NoPrize).unwrap(), 1);
}

#[test]
fn test_concurrent_draws_never_exceed_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let db = PrizeflowDb::open_with_config(dir.path(), config()).unwrap();
    let lottery = Arc::new(db.lottery().unwrap());
    let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    let barrier = Arc::new(Barrier::new(12));

    // Every participant contains "239": all of them ask for the phone tier
    let handles: Vec<_> = (0..12)
        .map(|i| {
            let lottery = Arc::clone(&lottery);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let p = ParticipantId::new(format!("1239{:07}", i)).unwrap();
                barrier.wait();
                lottery.draw(&p, at)
            })
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|o| matches!(o, DrawOutcome::TierGranted(_)))
        .count();

    // Default phone tier allows one grant per day
    assert_eq!(granted, 1);
    assert_eq!(db.counters().read_counter("tier:phone:issued").unwrap(), Some(1));

    db.recorder().drain_batch().unwrap();
    assert_eq!(db.records().prize_count(&Prize::Tier("phone".into())).unwrap(), 1);
    assert_eq!(db.records().grant_count().unwrap(), 1);
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    let p = ParticipantId::new("13888300000").unwrap();

    {
        let db = PrizeflowDb::open_with_config(dir.path(), config()).unwrap();
        db.lottery().unwrap().draw(&p, at);
    }

    let db = PrizeflowDb::open_with_config(dir.path(), config()).unwrap();
    assert_eq!(
        db.lottery().unwrap().draw(&p, at),
        DrawOutcome::Rejected(prizeflow::RejectReason::AlreadyParticipatedToday)
    );
    assert_eq!(db.queue().len().unwrap(), 1);

    db.recorder().drain_batch().unwrap();
    assert_eq!(db.records().grant_count().unwrap(), 1);
}
