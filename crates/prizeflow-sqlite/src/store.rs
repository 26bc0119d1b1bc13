use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use prizeflow_core::{
    traits::RecordSink, Day, GrantEvent, InsertOutcome, ParticipantId, Prize, PrizeError,
    RecordStoreConfig, Registration, Result,
};
use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::schema;

fn persistence(e: rusqlite::Error) -> PrizeError {
    PrizeError::Persistence(e.to_string())
}

/// Map a unique-constraint violation to `AlreadyExists`
fn insert_outcome(result: rusqlite::Result<usize>) -> Result<InsertOutcome> {
    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Ok(InsertOutcome::AlreadyExists)
        }
        Err(e) => Err(persistence(e)),
    }
}

/// A persisted grant row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRow {
    pub id: i64,
    pub participant: ParticipantId,
    pub prize: Prize,
    pub day: Day,
    pub granted_at: DateTime<Utc>,
}

/// SQLite-backed record store
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    config: RecordStoreConfig,
}

impl SqliteRecordStore {
    pub fn open(cfg: RecordStoreConfig) -> Result<Self> {
        if let Some(parent) = cfg.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &cfg.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(persistence)?;

        Self::configure_connection(&conn, &cfg)?;
        schema::init(&conn)?;

        tracing::info!(path = %cfg.path.display(), "Record store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: cfg,
        })
    }

    fn configure_connection(conn: &Connection, cfg: &RecordStoreConfig) -> Result<()> {
        if cfg.wal_mode {
            // journal_mode returns the resulting mode as a row
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
                .map_err(|e| PrizeError::Config(e.to_string()))?;
        }
        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
            .map_err(|e| PrizeError::Config(e.to_string()))?;
        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
            .map_err(|e| PrizeError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn.lock();
        schema::schema_version(&conn)
    }

    /// Every grant recorded for one participant, oldest first
    pub fn grants_for(&self, participant: &ParticipantId) -> Result<Vec<GrantRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, participant, prize, day, granted_at FROM grants
                 WHERE participant = ?1 ORDER BY id",
            )
            .map_err(persistence)?;

        let rows = stmt
            .query_map([participant.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(persistence)?;

        let mut grants = Vec::new();
        for row in rows {
            let (id, participant, prize, day, granted_at) = row.map_err(persistence)?;
            grants.push(GrantRow {
                id,
                participant: ParticipantId::new(participant)?,
                prize: Prize::from_key_segment(&prize),
                day: day.parse()?,
                granted_at: DateTime::parse_from_rfc3339(&granted_at)
                    .map_err(|e| PrizeError::Serialization(e.to_string()))?
                    .with_timezone(&Utc),
            });
        }
        Ok(grants)
    }

    /// Number of grant rows for one prize
    pub fn prize_count(&self, prize: &Prize) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM grants WHERE prize = ?1",
                [prize.key_segment()],
                |row| row.get(0),
            )
            .map_err(persistence)?;
        Ok(count as u64)
    }
}

impl RecordSink for SqliteRecordStore {
    fn insert_grant(&self, event: &GrantEvent) -> Result<InsertOutcome> {
        let conn = self.conn.lock();
        let outcome = insert_outcome(conn.execute(
            "INSERT INTO grants (participant, prize, day, granted_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.participant.as_str(),
                event.prize.key_segment(),
                event.day.to_string(),
                event.granted_at.to_rfc3339(),
            ],
        ))?;

        tracing::debug!(
            participant = %event.participant,
            prize = %event.prize,
            day = %event.day,
            ?outcome,
            "Grant persisted"
        );
        Ok(outcome)
    }

    fn insert_registration(&self, registration: &Registration) -> Result<InsertOutcome> {
        let conn = self.conn.lock();
        let outcome = insert_outcome(conn.execute(
            "INSERT INTO registrations (participant, content, registered_at) VALUES (?1, ?2, ?3)",
            params![
                registration.participant.as_str(),
                registration.content,
                registration.registered_at.to_rfc3339(),
            ],
        ))?;

        tracing::debug!(
            participant = %registration.participant,
            ?outcome,
            "Registration persisted"
        );
        Ok(outcome)
    }

    fn grant_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM grants", [], |row| row.get(0))
            .map_err(persistence)?;
        Ok(count as u64)
    }

    fn registration_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM registrations", [], |row| row.get(0))
            .map_err(persistence)?;
        Ok(count as u64)
    }
}
