use super::MAX_TTL_SECS;
use crate::error::{PrizeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// A statically configured prize tier
///
/// `per_participant_capacity` and `daily_capacity` are optional bounds; a tier
/// without them is only limited by `global_capacity`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierConfig {
    pub name: String,

    /// Maximum grants of this tier across all participants
    pub global_capacity: u64,

    /// Maximum grants of this tier to a single participant
    #[serde(default)]
    pub per_participant_capacity: Option<u64>,

    /// Maximum grants of this tier per calendar day
    #[serde(default)]
    pub daily_capacity: Option<u64>,
}

impl TierConfig {
    pub fn new(name: impl Into<String>, global_capacity: u64) -> Self {
        Self {
            name: name.into(),
            global_capacity,
            per_participant_capacity: None,
            daily_capacity: None,
        }
    }

    pub fn with_per_participant_capacity(mut self, cap: u64) -> Self {
        self.per_participant_capacity = Some(cap);
        self
    }

    pub fn with_daily_capacity(mut self, cap: u64) -> Self {
        self.daily_capacity = Some(cap);
        self
    }
}

/// `participant contains <contains>` → `tier`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubstringRule {
    pub contains: String,
    pub tier: String,
}

/// One bucket of a weighted classifier; `tier: None` is the no-prize bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeightedTier {
    #[serde(default)]
    pub tier: Option<String>,
    pub weight: u32,
}

/// Which policy maps a participant to a requested tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// First rule whose substring occurs in the participant id wins
    Substring { rules: Vec<SubstringRule> },

    /// Stable hash of `salt + participant` picks a bucket proportionally to
    /// its weight
    Weighted {
        buckets: Vec<WeightedTier>,
        #[serde(default)]
        salt: String,
    },

    /// Explicit participant → tier table; everyone else gets no prize
    AllowList { entries: BTreeMap<String, String> },

    /// Nobody requests a tier
    NoPrize,
}

impl ClassifierConfig {
    fn referenced_tiers(&self) -> Vec<&str> {
        match self {
            ClassifierConfig::Substring { rules } => {
                rules.iter().map(|r| r.tier.as_str()).collect()
            }
            ClassifierConfig::Weighted { buckets, .. } => {
                buckets.iter().filter_map(|b| b.tier.as_deref()).collect()
            }
            ClassifierConfig::AllowList { entries } => {
                entries.values().map(|t| t.as_str()).collect()
            }
            ClassifierConfig::NoPrize => Vec::new(),
        }
    }
}

/// Configuration for the request path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryConfig {
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,

    #[serde(default = "default_classifier")]
    pub classifier: ClassifierConfig,

    /// Lifetime of the daily participation marker in seconds
    /// Default: 86400 (24 hours)
    #[serde(default = "default_participation_ttl_secs")]
    pub participation_ttl_secs: u64,

    /// Offset applied to request timestamps before deriving the day
    /// Default: 0 (UTC days)
    #[serde(default)]
    pub utc_offset_secs: i32,

    /// Extra push attempts after a failed enqueue
    /// Default: 3
    #[serde(default = "default_enqueue_retries")]
    pub enqueue_retries: u32,

    /// Delay between enqueue attempts (milliseconds)
    /// Default: 20ms
    #[serde(default = "default_enqueue_retry_delay_ms")]
    pub enqueue_retry_delay_ms: u64,
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig::new("phone", 5).with_daily_capacity(1),
        TierConfig::new("card", 100).with_per_participant_capacity(2),
    ]
}

fn default_classifier() -> ClassifierConfig {
    ClassifierConfig::Substring {
        rules: vec![
            SubstringRule {
                contains: "239".into(),
                tier: "phone".into(),
            },
            SubstringRule {
                contains: "883".into(),
                tier: "card".into(),
            },
        ],
    }
}

fn default_participation_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_enqueue_retries() -> u32 {
    3
}

fn default_enqueue_retry_delay_ms() -> u64 {
    20
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            classifier: default_classifier(),
            participation_ttl_secs: default_participation_ttl_secs(),
            utc_offset_secs: 0,
            enqueue_retries: default_enqueue_retries(),
            enqueue_retry_delay_ms: default_enqueue_retry_delay_ms(),
        }
    }
}

impl LotteryConfig {
    pub fn new(tiers: Vec<TierConfig>, classifier: ClassifierConfig) -> Self {
        Self {
            tiers,
            classifier,
            ..Self::default()
        }
    }

    pub fn with_utc_offset_secs(mut self, offset: i32) -> Self {
        self.utc_offset_secs = offset;
        self
    }

    pub fn with_participation_ttl_secs(mut self, secs: u64) -> Self {
        self.participation_ttl_secs = secs;
        self
    }

    pub fn with_enqueue_retries(mut self, retries: u32, delay_ms: u64) -> Self {
        self.enqueue_retries = retries;
        self.enqueue_retry_delay_ms = delay_ms;
        self
    }

    pub fn participation_ttl(&self) -> Duration {
        Duration::from_secs(self.participation_ttl_secs.min(MAX_TTL_SECS))
    }

    pub fn enqueue_retry_delay(&self) -> Duration {
        Duration::from_millis(self.enqueue_retry_delay_ms)
    }

    pub fn tier(&self, name: &str) -> Option<&TierConfig> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Check tier names and classifier references
    ///
    /// Tier names become part of counter keys, so they must be non-empty and
    /// free of the `:` key separator.
    pub fn validate(&self) -> Result<()> {
        if self.utc_offset_secs.unsigned_abs() >= 24 * 3600 {
            return Err(PrizeError::Config(format!(
                "utc_offset_secs must be within one day, got {}",
                self.utc_offset_secs
            )));
        }

        if self.participation_ttl_secs > MAX_TTL_SECS {
            return Err(PrizeError::Config(format!(
                "participation_ttl_secs must be at most {}, got {}",
                MAX_TTL_SECS, self.participation_ttl_secs
            )));
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            let malformed = tier.name.is_empty()
                || tier.name.contains(':')
                || tier.name.contains(char::is_whitespace);
            if malformed {
                return Err(PrizeError::Config(format!(
                    "Invalid tier name '{}': must be non-empty without ':' or whitespace",
                    tier.name
                )));
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(PrizeError::Config(format!(
                    "Duplicate tier name '{}'",
                    tier.name
                )));
            }
        }

        for name in self.classifier.referenced_tiers() {
            if !seen.contains(name) {
                return Err(PrizeError::Config(format!(
                    "Classifier references unknown tier '{}'",
                    name
                )));
            }
        }

        if let ClassifierConfig::Weighted { buckets, .. } = &self.classifier {
            let total: u64 = buckets.iter().map(|b| b.weight as u64).sum();
            if total == 0 {
                return Err(PrizeError::Config(
                    "Weighted classifier needs at least one bucket with non-zero weight".into(),
                ));
            }
        }

        Ok(())
    }
}
