use prizeflow_core::{DeliveryId, PrizeError, Result};
use std::time::Duration;

/// Stored counter/marker entry: `[expires_at_ms: u64 BE][value: u64 BE]`
///
/// `expires_at_ms == 0` means the entry never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub expires_at_ms: u64,
    pub value: u64,
}

impl Entry {
    pub const LEN: usize = 16;

    pub fn permanent(value: u64) -> Self {
        Self {
            expires_at_ms: 0,
            value,
        }
    }

    pub fn expiring(value: u64, now_ms: u64, ttl: Option<Duration>) -> Self {
        let expires_at_ms = match ttl {
            Some(ttl) => now_ms.saturating_add(duration_ms(ttl)).max(1),
            None => 0,
        };
        Self {
            expires_at_ms,
            value,
        }
    }

    pub fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at_ms == 0 || self.expires_at_ms > now_ms
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..8].copy_from_slice(&self.expires_at_ms.to_be_bytes());
        out[8..].copy_from_slice(&self.value.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(PrizeError::Serialization(format!(
                "counter entry must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut expires = [0u8; 8];
        let mut value = [0u8; 8];
        expires.copy_from_slice(&bytes[..8]);
        value.copy_from_slice(&bytes[8..]);
        Ok(Self {
            expires_at_ms: u64::from_be_bytes(expires),
            value: u64::from_be_bytes(value),
        })
    }
}

/// Whole milliseconds of `d`, saturating at `u64::MAX`
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Format a DeliveryId as big-endian bytes (preserves sort order in LMDB)
pub fn delivery_id_to_key(id: DeliveryId) -> [u8; 8] {
    id.to_be_bytes()
}

/// Parse a DeliveryId from big-endian bytes
pub fn key_to_delivery_id(bytes: &[u8]) -> Option<DeliveryId> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(DeliveryId::from_be_bytes(arr))
}

/// Queued message header: `[visible_at_ms: u64 BE][attempts: u32 BE]` then payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub visible_at_ms: u64,
    pub attempts: u32,
    pub payload: Vec<u8>,
}

impl QueuedMessage {
    const HEADER_LEN: usize = 12;

    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            visible_at_ms: 0,
            attempts: 0,
            payload,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.visible_at_ms.to_be_bytes());
        out.extend_from_slice(&self.attempts.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(PrizeError::Serialization(format!(
                "queued message shorter than its {} byte header",
                Self::HEADER_LEN
            )));
        }
        let mut visible = [0u8; 8];
        let mut attempts = [0u8; 4];
        visible.copy_from_slice(&bytes[..8]);
        attempts.copy_from_slice(&bytes[8..12]);
        Ok(Self {
            visible_at_ms: u64::from_be_bytes(visible),
            attempts: u32::from_be_bytes(attempts),
            payload: bytes[Self::HEADER_LEN..].to_vec(),
        })
    }
}

/// Meta keys used in the queue's meta database
pub mod meta_keys {
    pub const NEXT_DELIVERY_ID: &str = "next_delivery_id";
    pub const CREATED_AT: &str = "created_at";
}
