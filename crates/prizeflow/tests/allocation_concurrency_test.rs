//! Capacity bounds under concurrent allocation
//!
//! Every scenario runs against the in-process store and the LMDB store.

use prizeflow::{
    Allocation, CounterStore, CounterStoreConfig, Day, LmdbCounterStore, MemoryCounterStore,
    ParticipantId, PrizeAllocator, SyncMode, TierConfig,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn day() -> Day {
    "20261019".parse().unwrap()
}

fn lmdb_store(dir: &tempfile::TempDir) -> Arc<LmdbCounterStore> {
    let cfg = CounterStoreConfig::new(dir.path().join("counters"))
        .with_map_size(64 * 1024 * 1024)
        .with_sync_mode(SyncMode::NoSync);
    Arc::new(LmdbCounterStore::open(cfg).unwrap())
}

/// Each thread allocates once for its own participant; returns grant count
fn race_distinct_participants<S: CounterStore + 'static>(
    store: Arc<S>,
    tier: TierConfig,
    threads: usize,
) -> usize {
    let name = tier.name.clone();
    let allocator = Arc::new(PrizeAllocator::new(store, [tier]));
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let allocator = Arc::clone(&allocator);
            let barrier = Arc::clone(&barrier);
            let name = name.clone();
            thread::spawn(move || {
                let participant = ParticipantId::new(format!("p{}", i)).unwrap();
                barrier.wait();
                allocator.try_allocate(&name, &participant, day()).unwrap()
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|a| a.is_granted())
        .count()
}

fn assert_exactly_capacity<S: CounterStore + 'static>(store: Arc<S>) {
    let granted = race_distinct_participants(store.clone(), TierConfig::new("phone", 7), 40);
    assert_eq!(granted, 7);
    assert_eq!(store.read_counter("tier:phone:issued").unwrap(), Some(7));
}

#[test]
fn test_global_capacity_exact_memory() {
    assert_exactly_capacity(Arc::new(MemoryCounterStore::new()));
}

#[test]
fn test_global_capacity_exact_lmdb() {
    let dir = tempfile::tempdir().unwrap();
    assert_exactly_capacity(lmdb_store(&dir));
}

#[test]
fn test_five_of_five_then_sixth_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = lmdb_store(&dir);

    let granted = race_distinct_participants(store.clone(), TierConfig::new("phone", 5), 5);
    assert_eq!(granted, 5);

    let allocator = PrizeAllocator::new(store, [TierConfig::new("phone", 5)]);
    let sixth = ParticipantId::new("p6").unwrap();
    assert_eq!(
        allocator.try_allocate("phone", &sixth, day()).unwrap(),
        Allocation::Exhausted
    );
}

fn assert_per_participant_cap<S: CounterStore + 'static>(store: Arc<S>) {
    let allocator = Arc::new(PrizeAllocator::new(
        store.clone(),
        [TierConfig::new("card", 100).with_per_participant_capacity(2)],
    ));
    let barrier = Arc::new(Barrier::new(10));

    // One participant hammering from ten threads
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let participant = ParticipantId::new("13888300000").unwrap();
                barrier.wait();
                allocator.try_allocate("card", &participant, day()).unwrap()
            })
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|a| a.is_granted())
        .count();

    assert_eq!(granted, 2);
    assert_eq!(store.read_counter("tier:card:issued").unwrap(), Some(2));
    assert_eq!(
        store
            .read_counter("tier:card:participant:13888300000:issued")
            .unwrap(),
        Some(2)
    );
}

#[test]
fn test_per_participant_cap_memory() {
    assert_per_participant_cap(Arc::new(MemoryCounterStore::new()));
}

#[test]
fn test_per_participant_cap_lmdb() {
    let dir = tempfile::tempdir().unwrap();
    assert_per_participant_cap(lmdb_store(&dir));
}

#[test]
fn test_third_sequential_attempt_fails() {
    let allocator = PrizeAllocator::new(
        Arc::new(MemoryCounterStore::new()),
        [TierConfig::new("card", 100).with_per_participant_capacity(2)],
    );
    let p = ParticipantId::new("13888300000").unwrap();

    assert!(allocator.try_allocate("card", &p, day()).unwrap().is_granted());
    assert!(allocator.try_allocate("card", &p, day()).unwrap().is_granted());
    assert_eq!(
        allocator.try_allocate("card", &p, day()).unwrap(),
        Allocation::Exhausted
    );
}

#[test]
fn test_mixed_bounds_never_exceeded() {
    let store = Arc::new(MemoryCounterStore::new());
    let tier = TierConfig::new("phone", 30)
        .with_per_participant_capacity(1)
        .with_daily_capacity(12);
    let allocator = Arc::new(PrizeAllocator::new(store.clone(), [tier]));
    let barrier = Arc::new(Barrier::new(16));

    // 16 threads, 8 participants, 4 attempts each
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let allocator = Arc::clone(&allocator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let participant = ParticipantId::new(format!("p{}", i % 8)).unwrap();
                barrier.wait();
                (0..4)
                    .filter(|_| {
                        allocator
                            .try_allocate("phone", &participant, day())
                            .unwrap()
                            .is_granted()
                    })
                    .count()
            })
        })
        .collect();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // Per-participant cap binds first: 8 participants x 1
    assert_eq!(granted, 8);
    for i in 0..8 {
        let key = format!("tier:phone:participant:p{}:issued", i);
        assert_eq!(store.read_counter(&key).unwrap(), Some(1));
    }
    assert_eq!(
        store.read_counter("tier:phone:day:20261019:issued").unwrap(),
        Some(8)
    );
}
