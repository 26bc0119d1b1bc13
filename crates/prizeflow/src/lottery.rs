use chrono::{DateTime, Utc};
use prizeflow_core::{
    observe,
    traits::{CounterStore, GrantQueue},
    Allocation, Day, DeliveryId, DrawOutcome, GrantEvent, LotteryConfig, ParticipantId, Prize,
    PrizeError, QueueMessage, Registration, RejectReason, Result,
};
use std::sync::Arc;

use crate::allocator::{PrizeAllocator, TierUsage};
use crate::classifier::{self, OutcomeClassifier};
use crate::dead_letter::{DeadLetter, DeadLetterLog, DeadLetterSource};
use crate::gate::ParticipationGate;

/// Request path: classify, gate, allocate, enqueue
///
/// Every store failure on the way ends in `Rejected(SystemUnavailable)`;
/// nothing is granted when the counters cannot be consulted.
pub struct Lottery<S: CounterStore, Q: GrantQueue> {
    gate: ParticipationGate<S>,
    allocator: PrizeAllocator<S>,
    classifier: Box<dyn OutcomeClassifier>,
    queue: Arc<Q>,
    dead_letters: Option<Arc<DeadLetterLog>>,
    config: LotteryConfig,
}

impl<S: CounterStore, Q: GrantQueue> Lottery<S, Q> {
    /// Build the request path from a validated config
    pub fn new(store: Arc<S>, queue: Arc<Q>, config: LotteryConfig) -> Result<Self> {
        config.validate()?;
        let classifier = classifier::from_config(&config.classifier)?;
        Ok(Self::with_classifier(store, queue, config, classifier))
    }

    /// Build with a caller-supplied classifier policy
    pub fn with_classifier(
        store: Arc<S>,
        queue: Arc<Q>,
        config: LotteryConfig,
        classifier: Box<dyn OutcomeClassifier>,
    ) -> Self {
        Self {
            gate: ParticipationGate::new(store.clone(), config.participation_ttl()),
            allocator: PrizeAllocator::new(store, config.tiers.clone()),
            classifier,
            queue,
            dead_letters: None,
            config,
        }
    }

    pub fn with_dead_letter_log(mut self, log: Arc<DeadLetterLog>) -> Self {
        self.dead_letters = Some(log);
        self
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    pub fn allocator(&self) -> &PrizeAllocator<S> {
        &self.allocator
    }

    pub fn gate(&self) -> &ParticipationGate<S> {
        &self.gate
    }

    /// Run one lottery attempt for `participant` at `timestamp`
    pub fn draw(&self, participant: &ParticipantId, timestamp: DateTime<Utc>) -> DrawOutcome {
        let outcome = self.draw_inner(participant, timestamp);
        observe::record_draw(outcome.label());
        tracing::info!(participant = %participant, outcome = outcome.label(), "Draw finished");
        outcome
    }

    fn draw_inner(&self, participant: &ParticipantId, timestamp: DateTime<Utc>) -> DrawOutcome {
        let day = Day::from_timestamp(timestamp, self.config.utc_offset_secs);
        let requested = self.classifier.classify(participant);

        match self.gate.try_admit(participant, day) {
            Ok(true) => {}
            Ok(false) => return DrawOutcome::Rejected(RejectReason::AlreadyParticipatedToday),
            Err(e) => {
                tracing::error!(
                    participant = %participant,
                    error = %e,
                    "Participation gate unavailable"
                );
                return DrawOutcome::Rejected(RejectReason::SystemUnavailable);
            }
        }

        let Some(tier) = requested else {
            self.publish(GrantEvent::new(participant.clone(), Prize::NoPrize, day));
            return DrawOutcome::NoPrize;
        };

        match self.allocator.try_allocate(&tier, participant, day) {
            Ok(Allocation::Granted) => {
                self.publish(GrantEvent::new(
                    participant.clone(),
                    Prize::Tier(tier.clone()),
                    day,
                ));
                DrawOutcome::TierGranted(tier)
            }
            Ok(Allocation::Exhausted) => {
                tracing::debug!(participant = %participant, tier = %tier, "Tier exhausted");
                DrawOutcome::NoPrize
            }
            Err(e) => {
                tracing::error!(
                    participant = %participant,
                    tier = %tier,
                    error = %e,
                    "Allocation failed, failing closed"
                );
                DrawOutcome::Rejected(RejectReason::SystemUnavailable)
            }
        }
    }

    /// Queue a registration record for the recorder
    pub fn register(
        &self,
        participant: &ParticipantId,
        content: impl Into<String>,
    ) -> Result<DeliveryId> {
        let message = QueueMessage::from(Registration::new(participant.clone(), content));
        self.enqueue(&message)
    }

    /// Enqueue an allocated event; a failure here never revokes the grant
    fn publish(&self, event: GrantEvent) {
        // `enqueue` has already logged and dead-lettered the event
        if let Err(e) = self.enqueue(&QueueMessage::from(event)) {
            tracing::debug!(error = %e, "Grant stands without a queued notification");
        }
    }

    /// Push with retries, dead-lettering the message when every attempt fails
    fn enqueue(&self, message: &QueueMessage) -> Result<DeliveryId> {
        let payload = message.encode()?;
        let attempts = self.config.enqueue_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.queue.push(&payload) {
                Ok(id) => return Ok(id),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        natural_key = %message.natural_key(),
                        error = %e,
                        "Enqueue failed"
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        std::thread::sleep(self.config.enqueue_retry_delay());
                    }
                }
            }
        }

        let error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no enqueue attempt made".to_string());
        tracing::error!(
            natural_key = %message.natural_key(),
            error = %error,
            "Event could not be enqueued, requires reconciliation"
        );

        if let Some(log) = &self.dead_letters {
            let entry = DeadLetter::new(DeadLetterSource::EnqueueFailed, &payload, error.clone())
                .with_natural_key(message.natural_key());
            if let Err(e) = log.append(&entry) {
                tracing::error!(error = %e, "Dead-letter write failed for unqueued event");
            }
        }

        Err(PrizeError::TransportFailure(error))
    }

    /// Global usage per tier (read-only)
    pub fn usage(&self) -> Result<Vec<TierUsage>> {
        self.allocator.usage()
    }
}
