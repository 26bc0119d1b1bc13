use prizeflow_core::{traits::CounterStore, Day, ParticipantId, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::keys;

/// One lottery attempt per participant per day
///
/// The first call for a `(participant, day)` pair creates a marker that
/// expires after `ttl`; every later call for the same pair is refused while
/// the marker lives. The gate never touches allocation counters.
pub struct ParticipationGate<S: CounterStore> {
    store: Arc<S>,
    ttl: Duration,
}

impl<S: CounterStore> ParticipationGate<S> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Admit the participant's first attempt of `day`
    ///
    /// Returns `Ok(true)` only for the call that created the marker. Store
    /// failures propagate; callers must treat them as a rejection.
    pub fn try_admit(&self, participant: &ParticipantId, day: Day) -> Result<bool> {
        let key = keys::participation(participant, day);
        let admitted = self.store.set_if_absent(&key, Some(self.ttl))?;
        if !admitted {
            tracing::debug!(participant = %participant, day = %day, "Participation refused");
        }
        Ok(admitted)
    }

    /// Whether the participant already used `day`'s attempt (read-only)
    pub fn has_participated(&self, participant: &ParticipantId, day: Day) -> Result<bool> {
        self.store.exists(&keys::participation(participant, day))
    }
}
