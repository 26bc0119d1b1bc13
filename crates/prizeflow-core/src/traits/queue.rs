use crate::error::Result;
use crate::types::{Delivery, DeliveryId, QueueMessage};
use std::time::Duration;

/// Durable, at-least-once notification channel
///
/// `pop` hands a message out without removing it; the consumer removes it
/// with `ack` once its effect is durable. Unacked messages are handed out
/// again later, so consumers must be idempotent. No ordering is guaranteed.
pub trait GrantQueue: Send + Sync {
    /// Append a raw payload
    fn push(&self, payload: &[u8]) -> Result<DeliveryId>;

    /// Take the next visible message, `None` when nothing is deliverable
    fn pop(&self) -> Result<Option<Delivery>>;

    /// Remove a delivered message for good
    fn ack(&self, id: DeliveryId) -> Result<()>;

    /// Hand a delivered message back, visible again once `delay` elapses
    ///
    /// `Duration::ZERO` makes it deliverable right away. The attempt
    /// counter is kept.
    fn nack(&self, id: DeliveryId, delay: Duration) -> Result<()>;

    /// Messages still in the queue, delivered or not
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn push_message(&self, message: &QueueMessage) -> Result<DeliveryId> {
        self.push(&message.encode()?)
    }
}
