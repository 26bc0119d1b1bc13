use crate::error::Result;
use crate::types::participant::{Day, ParticipantId};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Queue-assigned identifier of a message
pub type DeliveryId = u64;

/// Outcome recorded for a participant: a named tier or the consolation
/// "no prize" result
///
/// Deserializing rejects an empty tier name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prize {
    Tier(String),
    NoPrize,
}

/// Wire shape of [`Prize`] before validation
#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum PrizeRepr {
    Tier(String),
    NoPrize,
}

impl<'de> Deserialize<'de> for Prize {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match PrizeRepr::deserialize(deserializer)? {
            PrizeRepr::Tier(name) if name.is_empty() => {
                Err(de::Error::custom("prize tier name must not be empty"))
            }
            PrizeRepr::Tier(name) => Ok(Prize::Tier(name)),
            PrizeRepr::NoPrize => Ok(Prize::NoPrize),
        }
    }
}

impl Prize {
    /// Value stored in the natural-key column
    ///
    /// Tier names are never empty, so `""` cannot collide with a tier.
    pub fn key_segment(&self) -> &str {
        match self {
            Prize::Tier(name) => name,
            Prize::NoPrize => "",
        }
    }

    pub fn from_key_segment(segment: &str) -> Self {
        if segment.is_empty() {
            Prize::NoPrize
        } else {
            Prize::Tier(segment.to_string())
        }
    }
}

impl fmt::Display for Prize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prize::Tier(name) => f.write_str(name),
            Prize::NoPrize => f.write_str("no prize"),
        }
    }
}

/// Immutable fact emitted once per successful allocation decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEvent {
    pub participant: ParticipantId,
    pub prize: Prize,
    pub day: Day,
    pub granted_at: DateTime<Utc>,
}

impl GrantEvent {
    pub fn new(participant: ParticipantId, prize: Prize, day: Day) -> Self {
        Self {
            participant,
            prize,
            day,
            granted_at: Utc::now(),
        }
    }

    /// `(participant, prize, day)` rendered as a dedup key
    pub fn natural_key(&self) -> String {
        format!(
            "grant:{}:{}:{}",
            self.participant,
            self.prize.key_segment(),
            self.day
        )
    }
}

/// A participant registration, recorded once per participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub participant: ParticipantId,
    pub content: String,
    pub registered_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(participant: ParticipantId, content: impl Into<String>) -> Self {
        Self {
            participant,
            content: content.into(),
            registered_at: Utc::now(),
        }
    }

    pub fn natural_key(&self) -> String {
        format!("register:{}", self.participant)
    }
}

/// Payload carried by the grant queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueMessage {
    Grant(GrantEvent),
    Registration(Registration),
}

impl QueueMessage {
    pub fn natural_key(&self) -> String {
        match self {
            QueueMessage::Grant(event) => event.natural_key(),
            QueueMessage::Registration(reg) => reg.natural_key(),
        }
    }

    pub fn participant(&self) -> &ParticipantId {
        match self {
            QueueMessage::Grant(event) => &event.participant,
            QueueMessage::Registration(reg) => &reg.participant,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<GrantEvent> for QueueMessage {
    fn from(event: GrantEvent) -> Self {
        QueueMessage::Grant(event)
    }
}

impl From<Registration> for QueueMessage {
    fn from(reg: Registration) -> Self {
        QueueMessage::Registration(reg)
    }
}

/// A message handed out by `GrantQueue::pop`
///
/// The message stays in the queue until it is acked; `attempts` counts how
/// many times it has been handed out, including this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: DeliveryId,
    pub attempts: u32,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str) -> ParticipantId {
        ParticipantId::new(id).unwrap()
    }

    #[test]
    fn test_natural_key_ignores_grant_time() {
        let day: Day = "20261019".parse().unwrap();
        let a = GrantEvent::new(participant("13883000000"), Prize::Tier("card".into()), day);
        let mut b = a.clone();
        b.granted_at = a.granted_at + chrono::Duration::seconds(30);

        assert_eq!(a.natural_key(), b.natural_key());
        assert_eq!(a.natural_key(), "grant:13883000000:card:20261019");
    }

    #[test]
    fn test_no_prize_key_differs_from_tier_key() {
        let day: Day = "20261019".parse().unwrap();
        let tier = GrantEvent::new(participant("p1"), Prize::Tier("card".into()), day);
        let none = GrantEvent::new(participant("p1"), Prize::NoPrize, day);
        assert_ne!(tier.natural_key(), none.natural_key());
        assert_eq!(Prize::from_key_segment(none.prize.key_segment()), Prize::NoPrize);
    }

    #[test]
    fn test_message_wire_format_is_tagged() {
        let day: Day = "20261019".parse().unwrap();
        let msg = QueueMessage::from(GrantEvent::new(participant("p1"), Prize::NoPrize, day));
        let json: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();

        assert_eq!(json["kind"], "grant");
        assert_eq!(json["prize"], "no_prize");
        assert_eq!(json["day"], "20261019");
        assert_eq!(QueueMessage::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(QueueMessage::decode(b"not json").is_err());
        assert!(QueueMessage::decode(br#"{"kind":"grant","participant":"a:b"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_empty_tier() {
        let day: Day = "20261019".parse().unwrap();
        let msg = QueueMessage::from(GrantEvent::new(
            participant("p1"),
            Prize::Tier("card".into()),
            day,
        ));
        let json = String::from_utf8(msg.encode().unwrap()).unwrap();
        assert!(json.contains(r#""prize":{"tier":"card"}"#));
        assert_eq!(QueueMessage::decode(json.as_bytes()).unwrap(), msg);

        let blank = json.replace(r#"{"tier":"card"}"#, r#"{"tier":""}"#);
        assert!(QueueMessage::decode(blank.as_bytes()).is_err());
    }
}
