use crate::error::{PrizeError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_PARTICIPANT_LEN: usize = 128;

/// External participant identifier (e.g. a phone number)
///
/// The identifier is embedded in counter, marker and dedup keys, so it must
/// not contain the `:` separator or whitespace. Format validation beyond that
/// belongs to the request layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_PARTICIPANT_LEN {
            return Err(PrizeError::InvalidInput(format!(
                "participant id must be 1-{} bytes, got {}",
                MAX_PARTICIPANT_LEN,
                id.len()
            )));
        }
        if id.contains(':') || id.contains(char::is_whitespace) {
            return Err(PrizeError::InvalidInput(format!(
                "participant id '{}' contains ':' or whitespace",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = PrizeError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ParticipantId> for String {
    fn from(value: ParticipantId) -> Self {
        value.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Calendar day a request belongs to, rendered as `YYYYMMDD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Day(NaiveDate);

impl Day {
    const FORMAT: &'static str = "%Y%m%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Day of `timestamp` once shifted by `utc_offset_secs`
    pub fn from_timestamp(timestamp: DateTime<Utc>, utc_offset_secs: i32) -> Self {
        let shifted = timestamp + chrono::Duration::seconds(utc_offset_secs as i64);
        Self(shifted.date_naive())
    }

    pub fn today(utc_offset_secs: i32) -> Self {
        Self::from_timestamp(Utc::now(), utc_offset_secs)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for Day {
    type Err = PrizeError;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s, Self::FORMAT)
            .map(Self)
            .map_err(|e| PrizeError::InvalidInput(format!("invalid day '{}': {}", s, e)))
    }
}

impl TryFrom<String> for Day {
    type Error = PrizeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Day> for String {
    fn from(value: Day) -> Self {
        value.to_string()
    }
}
