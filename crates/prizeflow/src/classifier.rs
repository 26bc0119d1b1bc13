//! Outcome classifiers: which tier, if any, a participant asks for
//!
//! A classifier is pure and deterministic: the same participant always maps
//! to the same answer and no I/O happens. Whether the tier is actually
//! granted is decided afterwards by the allocator.
//!
//! Policies:
//! - [`SubstringClassifier`]: first rule whose pattern occurs in the
//!   participant id (default rules:
//!   `239` asks for `phone`, `883` asks for `card`)
//! - [`WeightedClassifier`]: stable xxh3 hash of `salt + participant`
//!   picks a bucket proportionally to its weight
//! - [`AllowListClassifier`]: explicit participant table
//! - [`NoPrizeClassifier`]: never asks for a tier

use prizeflow_core::{
    ClassifierConfig, ParticipantId, PrizeError, Result, SubstringRule, WeightedTier,
};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::xxh3_64;

pub trait OutcomeClassifier: Send + Sync {
    /// Tier the participant is eligible to request, `None` for no prize
    fn classify(&self, participant: &ParticipantId) -> Option<String>;
}

pub struct SubstringClassifier {
    rules: Vec<SubstringRule>,
}

impl SubstringClassifier {
    pub fn new(rules: Vec<SubstringRule>) -> Self {
        Self { rules }
    }
}

impl OutcomeClassifier for SubstringClassifier {
    fn classify(&self, participant: &ParticipantId) -> Option<String> {
        self.rules
            .iter()
            .find(|rule| participant.as_str().contains(rule.contains.as_str()))
            .map(|rule| rule.tier.clone())
    }
}

pub struct WeightedClassifier {
    buckets: Vec<WeightedTier>,
    total_weight: u64,
    salt: String,
}

impl WeightedClassifier {
    pub fn new(buckets: Vec<WeightedTier>, salt: impl Into<String>) -> Result<Self> {
        let total_weight: u64 = buckets.iter().map(|b| b.weight as u64).sum();
        if total_weight == 0 {
            return Err(PrizeError::Config(
                "weighted classifier needs a non-zero total weight".into(),
            ));
        }
        Ok(Self {
            buckets,
            total_weight,
            salt: salt.into(),
        })
    }
}

impl OutcomeClassifier for WeightedClassifier {
    fn classify(&self, participant: &ParticipantId) -> Option<String> {
        let mut input = Vec::with_capacity(self.salt.len() + participant.as_str().len());
        input.extend_from_slice(self.salt.as_bytes());
        input.extend_from_slice(participant.as_str().as_bytes());

        let mut point = xxh3_64(&input) % self.total_weight;
        for bucket in &self.buckets {
            let weight = bucket.weight as u64;
            if point < weight {
                return bucket.tier.clone();
            }
            point -= weight;
        }
        None
    }
}

pub struct AllowListClassifier {
    entries: BTreeMap<String, String>,
}

impl AllowListClassifier {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

impl OutcomeClassifier for AllowListClassifier {
    fn classify(&self, participant: &ParticipantId) -> Option<String> {
        self.entries.get(participant.as_str()).cloned()
    }
}

pub struct NoPrizeClassifier;

impl OutcomeClassifier for NoPrizeClassifier {
    fn classify(&self, _participant: &ParticipantId) -> Option<String> {
        None
    }
}

/// Build the classifier described by `config`
pub fn from_config(config: &ClassifierConfig) -> Result<Box<dyn OutcomeClassifier>> {
    Ok(match config {
        ClassifierConfig::Substring { rules } => Box::new(SubstringClassifier::new(rules.clone())),
        ClassifierConfig::Weighted { buckets, salt } => {
            Box::new(WeightedClassifier::new(buckets.clone(), salt.clone())?)
        }
        ClassifierConfig::AllowList { entries } => {
            Box::new(AllowListClassifier::new(entries.clone()))
        }
        ClassifierConfig::NoPrize => Box::new(NoPrizeClassifier),
    })
}
