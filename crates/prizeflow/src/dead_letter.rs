//! Dead-letter log for messages the pipeline could not deliver
//!
//! Two producers write here:
//! - the recorder, for payloads it cannot decode and for messages that kept
//!   failing past `max_delivery_attempts`
//! - the request path, for grants whose counters were already incremented
//!   but whose enqueue failed after every retry. Those entries carry
//!   `requires_reconciliation = true`.
//!
//! Format: one JSON object per line, payload base64-encoded so that
//! undecodable bytes survive intact. Each write is fsynced.

use base64::Engine;
use prizeflow_core::{observe, DeliveryId, PrizeError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a dead letter came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterSource {
    /// Payload could not be decoded into a queue message
    Undecodable,
    /// Recording kept failing until the attempt budget ran out
    AttemptsExhausted,
    /// The grant was allocated but never reached the queue
    EnqueueFailed,
}

impl DeadLetterSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterSource::Undecodable => "undecodable",
            DeadLetterSource::AttemptsExhausted => "attempts_exhausted",
            DeadLetterSource::EnqueueFailed => "enqueue_failed",
        }
    }
}

/// One line of the dead-letter log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source: DeadLetterSource,
    /// Queue id, when the message made it into the queue
    #[serde(default)]
    pub delivery_id: Option<DeliveryId>,
    #[serde(default)]
    pub natural_key: Option<String>,
    pub payload_b64: String,
    pub attempts: u32,
    pub error: String,
    pub requires_reconciliation: bool,
    /// RFC 3339 time the entry was written
    pub timestamp: String,
}

impl DeadLetter {
    pub fn new(source: DeadLetterSource, payload: &[u8], error: impl Into<String>) -> Self {
        Self {
            source,
            delivery_id: None,
            natural_key: None,
            payload_b64: base64::engine::general_purpose::STANDARD.encode(payload),
            attempts: 0,
            error: error.into(),
            requires_reconciliation: source == DeadLetterSource::EnqueueFailed,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_delivery(mut self, id: DeliveryId, attempts: u32) -> Self {
        self.delivery_id = Some(id);
        self.attempts = attempts;
        self
    }

    pub fn with_natural_key(mut self, key: impl Into<String>) -> Self {
        self.natural_key = Some(key.into());
        self
    }

    pub fn payload(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload_b64)
            .map_err(|e| PrizeError::Serialization(format!("invalid dead-letter payload: {}", e)))
    }
}

/// Append-only, fsynced JSON-lines file
pub struct DeadLetterLog {
    path: PathBuf,
    writer: parking_lot::Mutex<File>,
}

impl DeadLetterLog {
    pub const FILE_NAME: &'static str = "dead_letters.jsonl";

    /// Open or create `dir/dead_letters.jsonl`
    pub fn open(dir: &Path) -> Result<Arc<Self>> {
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                PrizeError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to open dead-letter log at {}: {}", path.display(), e),
                ))
            })?;

        tracing::debug!("Dead-letter log opened at {}", path.display());

        Ok(Arc::new(Self {
            path,
            writer: parking_lot::Mutex::new(file),
        }))
    }

    pub fn append(&self, entry: &DeadLetter) -> Result<()> {
        let json = serde_json::to_string(entry)?;

        let mut file = self.writer.lock();
        writeln!(file, "{}", json)?;
        file.sync_all()?;
        drop(file);

        observe::record_dead_letter(entry.source.as_str());
        tracing::error!(
            source = entry.source.as_str(),
            delivery_id = ?entry.delivery_id,
            natural_key = ?entry.natural_key,
            requires_reconciliation = entry.requires_reconciliation,
            error = %entry.error,
            dead_letter_path = %self.path.display(),
            "Message written to dead-letter log"
        );
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<DeadLetter>> {
        Self::read_path(&self.path)
    }

    /// Read a log file without opening it for writing (inspection tooling)
    pub fn read_path(path: &Path) -> Result<Vec<DeadLetter>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PrizeError::Io(e)),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = DeadLetterLog::open(dir.path()).unwrap();
        assert_eq!(log.entry_count().unwrap(), 0);

        let raw = vec![0xff, 0x00, 0x7b];
        let undecodable =
            DeadLetter::new(DeadLetterSource::Undecodable, &raw, "bad json").with_delivery(7, 1);
        log.append(&undecodable).unwrap();
        log.append(
            &DeadLetter::new(DeadLetterSource::EnqueueFailed, b"{}", "queue down")
                .with_natural_key("grant:p1:card:20261019"),
        )
        .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload().unwrap(), raw);
        assert_eq!(entries[0].delivery_id, Some(7));
        assert!(!entries[0].requires_reconciliation);
        assert!(entries[1].requires_reconciliation);
        assert_eq!(
            entries[1].natural_key.as_deref(),
            Some("grant:p1:card:20261019")
        );
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = DeadLetterLog::open(dir.path()).unwrap();
            log.append(&DeadLetter::new(DeadLetterSource::AttemptsExhausted, b"x", "e"))
                .unwrap();
        }
        let log = DeadLetterLog::open(dir.path()).unwrap();
        log.append(&DeadLetter::new(DeadLetterSource::AttemptsExhausted, b"y", "e"))
            .unwrap();
        assert_eq!(log.entry_count().unwrap(), 2);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = DeadLetterLog::read_path(&dir.path().join("nope.jsonl")).unwrap();
        assert!(entries.is_empty());
    }
}
