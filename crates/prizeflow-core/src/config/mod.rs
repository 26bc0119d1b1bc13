pub mod lottery;
pub mod record;
pub mod recorder;
pub mod store;

/// Longest TTL a config may ask for (ten years, in seconds)
///
/// Keeps `now + ttl` representable on every clock the stores use.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

pub use lottery::{ClassifierConfig, LotteryConfig, SubstringRule, TierConfig, WeightedTier};
pub use record::{RecordStoreConfig, SynchronousMode};
pub use recorder::RecorderConfig;
pub use store::{CounterStoreConfig, EnvTuning, QueueConfig, SyncMode};
