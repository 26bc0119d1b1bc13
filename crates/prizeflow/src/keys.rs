//! Counter store key layout
//!
//! ```text
//! tier:{tier}:issued                      global issued count
//! tier:{tier}:participant:{p}:issued      per-participant issued count
//! tier:{tier}:day:{yyyymmdd}:issued       per-day issued count
//! gate:{p}:{yyyymmdd}                     daily participation marker
//! dedup:{natural_key}                     recorder short-circuit marker
//! ```
//!
//! Participant ids and tier names never contain `:`, so no two keys of
//! different shapes can collide.

use prizeflow_core::{Day, ParticipantId};

pub fn global_issued(tier: &str) -> String {
    format!("tier:{}:issued", tier)
}

pub fn participant_issued(tier: &str, participant: &ParticipantId) -> String {
    format!("tier:{}:participant:{}:issued", tier, participant)
}

pub fn daily_issued(tier: &str, day: Day) -> String {
    format!("tier:{}:day:{}:issued", tier, day)
}

pub fn participation(participant: &ParticipantId, day: Day) -> String {
    format!("gate:{}:{}", participant, day)
}

pub fn dedup(natural_key: &str) -> String {
    format!("dedup:{}", natural_key)
}
