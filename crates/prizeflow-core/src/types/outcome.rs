use serde::{Deserialize, Serialize};

/// Result of one allocation attempt against a tier
///
/// Running out of inventory is a normal outcome, not an error.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    Granted,
    Exhausted,
}

impl Allocation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Allocation::Granted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadyParticipatedToday,
    SystemUnavailable,
}

/// What the request layer gets back for one draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawOutcome {
    TierGranted(String),
    NoPrize,
    Rejected(RejectReason),
}

impl DrawOutcome {
    /// Short label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            DrawOutcome::TierGranted(_) => "granted",
            DrawOutcome::NoPrize => "no_prize",
            DrawOutcome::Rejected(RejectReason::AlreadyParticipatedToday) => "already_participated",
            DrawOutcome::Rejected(RejectReason::SystemUnavailable) => "unavailable",
        }
    }
}

/// Result of inserting a record under a unique natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The natural key already had a row; nothing was written
    AlreadyExists,
}

/// What the recorder did with one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    /// The short-lived dedup marker was already set
    pub marker_hit: bool,
    pub insert: InsertOutcome,
}

impl RecordOutcome {
    /// True when the message described a fact that was already recorded
    pub fn is_duplicate(&self) -> bool {
        self.marker_hit || self.insert == InsertOutcome::AlreadyExists
    }
}
