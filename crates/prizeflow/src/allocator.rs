use prizeflow_core::{
    observe, traits::CounterStore, Allocation, Day, ParticipantId, PrizeError, Result, TierConfig,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::keys;

/// One capacity bound checked by the allocation script
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    key: String,
    cap: u64,
}

/// Issued count of one tier against its global capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierUsage {
    pub tier: String,
    pub issued: u64,
    pub global_capacity: u64,
}

impl TierUsage {
    pub fn remaining(&self) -> u64 {
        self.global_capacity.saturating_sub(self.issued)
    }
}

/// Atomic check-and-increment of tier counters
///
/// Every tier goes through the same routine over an ordered list of bounds
/// (participant, daily, global). All bounds are checked before any counter
/// moves, and the whole check-and-increment runs as one store script, so
/// concurrent callers can never push a counter past its cap.
pub struct PrizeAllocator<S: CounterStore> {
    store: Arc<S>,
    tiers: HashMap<String, TierConfig>,
}

impl<S: CounterStore> PrizeAllocator<S> {
    pub fn new(store: Arc<S>, tiers: impl IntoIterator<Item = TierConfig>) -> Self {
        Self {
            store,
            tiers: tiers.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn tier(&self, name: &str) -> Option<&TierConfig> {
        self.tiers.get(name)
    }

    fn bounds(tier: &TierConfig, participant: &ParticipantId, day: Day) -> Vec<Bound> {
        let mut bounds = Vec::with_capacity(3);
        if let Some(cap) = tier.per_participant_capacity {
            bounds.push(Bound {
                key: keys::participant_issued(&tier.name, participant),
                cap,
            });
        }
        if let Some(cap) = tier.daily_capacity {
            bounds.push(Bound {
                key: keys::daily_issued(&tier.name, day),
                cap,
            });
        }
        bounds.push(Bound {
            key: keys::global_issued(&tier.name),
            cap: tier.global_capacity,
        });
        bounds
    }

    /// Try to take one unit of `tier` for `participant` on `day`
    ///
    /// Returns `Allocation::Exhausted` without changing any count when any
    /// bound is reached (a capacity of 0 is always exhausted). Store failures
    /// are returned as errors; nothing is granted in that case.
    pub fn try_allocate(
        &self,
        tier: &str,
        participant: &ParticipantId,
        day: Day,
    ) -> Result<Allocation> {
        let config = self
            .tiers
            .get(tier)
            .ok_or_else(|| PrizeError::NotFound(format!("tier '{}'", tier)))?;

        let bounds = Self::bounds(config, participant, day);
        let key_refs: Vec<&str> = bounds.iter().map(|b| b.key.as_str()).collect();
        let started = Instant::now();

        let allocation = self.store.transact(&key_refs, |txn| {
            let mut counts = Vec::with_capacity(bounds.len());
            for bound in &bounds {
                let count = match txn.get(&bound.key)? {
                    Some(count) => count,
                    None => {
                        txn.put(&bound.key, 0)?;
                        0
                    }
                };
                counts.push(count);
            }

            if bounds.iter().zip(&counts).any(|(b, count)| *count >= b.cap) {
                return Ok(Allocation::Exhausted);
            }

            for (bound, count) in bounds.iter().zip(&counts) {
                txn.put(&bound.key, count + 1)?;
            }
            Ok(Allocation::Granted)
        })?;

        observe::record_allocation(started.elapsed(), allocation.is_granted());
        tracing::debug!(
            tier,
            participant = %participant,
            granted = allocation.is_granted(),
            "Allocation attempted"
        );
        Ok(allocation)
    }

    /// Current global usage of every tier (read-only)
    pub fn usage(&self) -> Result<Vec<TierUsage>> {
        let mut usage = Vec::with_capacity(self.tiers.len());
        for tier in self.tiers.values() {
            usage.push(TierUsage {
                tier: tier.name.clone(),
                issued: self
                    .store
                    .read_counter(&keys::global_issued(&tier.name))?
                    .unwrap_or(0),
                global_capacity: tier.global_capacity,
            });
        }
        usage.sort_by(|a, b| a.tier.cmp(&b.tier));
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCounterStore;

    fn p(id: &str) -> ParticipantId {
        ParticipantId::new(id).unwrap()
    }

    fn day() -> Day {
        "20261019".parse().unwrap()
    }

    #[test]
    fn test_zero_capacity_never_grants() {
        let store = Arc::new(MemoryCounterStore::new());
        let allocator = PrizeAllocator::new(store.clone(), [TierConfig::new("none", 0)]);

        assert_eq!(
            allocator.try_allocate("none", &p("a"), day()).unwrap(),
            Allocation::Exhausted
        );
        assert_eq!(store.read_counter("tier:none:issued").unwrap(), Some(0));
    }

    #[test]
    fn test_participant_cap_blocks_without_touching_global() {
        let store = Arc::new(MemoryCounterStore::new());
        let allocator = PrizeAllocator::new(
            store.clone(),
            [TierConfig::new("card", 100).with_per_participant_capacity(2)],
        );

        assert!(allocator.try_allocate("card", &p("a"), day()).unwrap().is_granted());
        assert!(allocator.try_allocate("card", &p("a"), day()).unwrap().is_granted());
        assert_eq!(
            allocator.try_allocate("card", &p("a"), day()).unwrap(),
            Allocation::Exhausted
        );

        assert_eq!(store.read_counter("tier:card:issued").unwrap(), Some(2));
        assert!(allocator.try_allocate("card", &p("b"), day()).unwrap().is_granted());
    }

    #[test]
    fn test_daily_cap_resets_next_day() {
        let store = Arc::new(MemoryCounterStore::new());
        let allocator = PrizeAllocator::new(
            store.clone(),
            [TierConfig::new("phone", 5).with_daily_capacity(1)],
        );
        let tomorrow: Day = "20261020".parse().unwrap();

        assert!(allocator.try_allocate("phone", &p("a"), day()).unwrap().is_granted());
        assert_eq!(
            allocator.try_allocate("phone", &p("b"), day()).unwrap(),
            Allocation::Exhausted
        );
        assert!(allocator.try_allocate("phone", &p("b"), tomorrow).unwrap().is_granted());

        let usage = allocator.usage().unwrap();
        assert_eq!(usage[0].issued, 2);
        assert_eq!(usage[0].remaining(), 3);
    }

    #[test]
    fn test_unknown_tier_is_an_error() {
        let allocator = PrizeAllocator::new(Arc::new(MemoryCounterStore::new()), Vec::new());
        assert!(matches!(
            allocator.try_allocate("ghost", &p("a"), day()),
            Err(PrizeError::NotFound(_))
        ));
    }
}
