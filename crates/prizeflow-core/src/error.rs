use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrizeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The counter store cannot be reached or refused the operation.
    ///
    /// Gate and allocation callers must treat this as a rejection.
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// Queue push/pop failed.
    #[error("Queue transport failure: {0}")]
    TransportFailure(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Lock acquisition timed out after {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PrizeError {
    /// Whether the failure comes from the counter store being unreachable
    /// or overloaded, as opposed to a bug or bad input.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            PrizeError::StoreUnavailable(_) | PrizeError::LockTimeout { .. } | PrizeError::Io(_)
        )
    }
}

impl From<serde_json::Error> for PrizeError {
    fn from(err: serde_json::Error) -> Self {
        PrizeError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PrizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        assert!(PrizeError::StoreUnavailable("down".into()).is_unavailable());
        assert!(PrizeError::LockTimeout { timeout_ms: 5 }.is_unavailable());
        assert!(!PrizeError::Config("bad".into()).is_unavailable());
        assert!(!PrizeError::TransportFailure("queue".into()).is_unavailable());
    }

    #[test]
    fn test_json_errors_become_serialization() {
        let err: PrizeError = serde_json::from_str::<u64>("nope").unwrap_err().into();
        assert!(matches!(err, PrizeError::Serialization(_)));
    }
}
