use prizeflow_core::{PrizeError, Result};
use rusqlite::Connection;

/// Current schema version written to `record_meta`
pub const SCHEMA_VERSION: u32 = 1;

fn persistence(e: rusqlite::Error) -> PrizeError {
    PrizeError::Persistence(e.to_string())
}

/// Create tables if needed and check the stored schema version
///
/// `prize` holds the tier name, or the empty string for "no prize", so the
/// consolation outcome is covered by the same unique constraint.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS record_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            schema_version INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS grants (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            participant TEXT NOT NULL,
            prize       TEXT NOT NULL,
            day         TEXT NOT NULL,
            granted_at  TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (participant, prize, day)
        );

        CREATE INDEX IF NOT EXISTS grants_participant ON grants(participant);

        CREATE TABLE IF NOT EXISTS registrations (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            participant   TEXT NOT NULL UNIQUE,
            content       TEXT NOT NULL,
            registered_at TEXT NOT NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(persistence)?;

    conn.execute(
        "INSERT OR IGNORE INTO record_meta (id, schema_version) VALUES (0, ?1)",
        [SCHEMA_VERSION as i64],
    )
    .map_err(persistence)?;

    let stored = schema_version(conn)?;
    if stored > SCHEMA_VERSION {
        return Err(PrizeError::InvalidState(format!(
            "record store schema version {} is newer than supported version {}",
            stored, SCHEMA_VERSION
        )));
    }
    if stored < SCHEMA_VERSION {
        update_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn
        .query_row(
            "SELECT schema_version FROM record_meta WHERE id = 0",
            [],
            |row| row.get(0),
        )
        .map_err(persistence)?;
    Ok(version as u32)
}

fn update_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "UPDATE record_meta SET schema_version = ?1, updated_at = datetime('now') WHERE id = 0",
        [version as i64],
    )
    .map_err(persistence)?;
    Ok(())
}
