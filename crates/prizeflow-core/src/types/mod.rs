pub mod event;
pub mod outcome;
pub mod participant;

pub use event::{Delivery, DeliveryId, GrantEvent, Prize, QueueMessage, Registration};
pub use outcome::{Allocation, DrawOutcome, InsertOutcome, RecordOutcome, RejectReason};
pub use participant::{Day, ParticipantId};
