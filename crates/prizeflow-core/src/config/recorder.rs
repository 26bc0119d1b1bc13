use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::MAX_TTL_SECS;
use crate::error::{PrizeError, Result};

/// Configuration for the idempotent recorder loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Lifetime of the per-natural-key dedup marker in seconds
    /// Default: 1800 (30 minutes)
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    /// First sleep after the queue is found empty (milliseconds)
    /// Default: 10ms
    #[serde(default = "default_idle_backoff_initial_ms")]
    pub idle_backoff_initial_ms: u64,

    /// Upper bound for the idle sleep; doubles from the initial value on
    /// every consecutive empty poll
    /// Default: 1000ms
    #[serde(default = "default_idle_backoff_max_ms")]
    pub idle_backoff_max_ms: u64,

    /// Maximum messages handled per `drain_batch` call
    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Deliveries of one message before it is moved to the dead-letter log
    /// Default: 5
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Redelivery delay after the first failed attempt (milliseconds)
    /// Doubles with every further attempt of the same message
    /// Default: 100ms
    #[serde(default = "default_retry_backoff_initial_ms")]
    pub retry_backoff_initial_ms: u64,

    /// Upper bound for the redelivery delay
    /// Default: 10000ms
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

fn default_dedup_ttl_secs() -> u64 {
    30 * 60
}

fn default_idle_backoff_initial_ms() -> u64 {
    10
}

fn default_idle_backoff_max_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_max_delivery_attempts() -> u32 {
    5
}

fn default_retry_backoff_initial_ms() -> u64 {
    100
}

fn default_retry_backoff_max_ms() -> u64 {
    10_000
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_secs: default_dedup_ttl_secs(),
            idle_backoff_initial_ms: default_idle_backoff_initial_ms(),
            idle_backoff_max_ms: default_idle_backoff_max_ms(),
            batch_size: default_batch_size(),
            max_delivery_attempts: default_max_delivery_attempts(),
            retry_backoff_initial_ms: default_retry_backoff_initial_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
        }
    }
}

impl RecorderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dedup_ttl_secs(mut self, secs: u64) -> Self {
        self.dedup_ttl_secs = secs;
        self
    }

    pub fn with_idle_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.idle_backoff_initial_ms = initial_ms;
        self.idle_backoff_max_ms = max_ms.max(initial_ms);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = attempts.max(1);
        self
    }

    /// Zero for both makes a failed message deliverable again at once
    pub fn with_retry_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.retry_backoff_initial_ms = initial_ms;
        self.retry_backoff_max_ms = max_ms.max(initial_ms);
        self
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs.min(MAX_TTL_SECS))
    }

    /// How long a message stays hidden after its `attempts`-th delivery failed
    ///
    /// `initial * 2^(attempts - 1)`, capped at the configured maximum.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let doublings = attempts.saturating_sub(1).min(63);
        let ms = self
            .retry_backoff_initial_ms
            .saturating_mul(1u64 << doublings)
            .min(self.retry_backoff_max_ms.max(self.retry_backoff_initial_ms));
        Duration::from_millis(ms)
    }

    pub fn idle_backoff_initial(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_initial_ms)
    }

    pub fn idle_backoff_max(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_max_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dedup_ttl_secs > MAX_TTL_SECS {
            return Err(PrizeError::Config(format!(
                "dedup_ttl_secs must be at most {}, got {}",
                MAX_TTL_SECS, self.dedup_ttl_secs
            )));
        }
        if self.retry_backoff_max_ms < self.retry_backoff_initial_ms {
            return Err(PrizeError::Config(format!(
                "retry_backoff_max_ms ({}) is below retry_backoff_initial_ms ({})",
                self.retry_backoff_max_ms, self.retry_backoff_initial_ms
            )));
        }
        Ok(())
    }
}
