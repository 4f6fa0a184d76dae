//! SQLite-backed event log
//!
//! Both the monitor and the supervisor append to the same `events.db`, so
//! writers wait out each other's locks instead of failing.

use chrono::{DateTime, Local};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, AuditLog, StoreError, StoreResult};

/// How long a writer waits for the other process to release the database
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    at TEXT NOT NULL,
    event TEXT NOT NULL
);
"#;

pub struct SqliteAuditLog {
    conn: Mutex<Connection>,
}

impl SqliteAuditLog {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Private log that disappears with the value
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn is_healthy(&self) -> bool {
        self.conn()
            .is_ok_and(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).is_ok())
    }
}

fn decode(id: i64, at: &str, event: &str) -> Option<AuditEvent> {
    let event: AuditEventType = match serde_json::from_str(event) {
        Ok(event) => event,
        Err(e) => {
            warn!(id, error = %e, "Skipping undecodable event");
            return None;
        }
    };
    let timestamp = DateTime::parse_from_rfc3339(at)
        .map(|at| at.with_timezone(&Local))
        .ok()?;
    Some(AuditEvent {
        id,
        timestamp,
        event,
    })
}

impl AuditLog for SqliteAuditLog {
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()> {
        let body = serde_json::to_string(&event.event)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO events (at, event) VALUES (?1, ?2)",
            params![event.timestamp.to_rfc3339(), body],
        )?;
        debug!(id = conn.last_insert_rowid(), event = %event.event, "Event recorded");
        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, at, event FROM events ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt
            .query_map([i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .iter()
            .filter_map(|(id, at, event)| decode(*id, at, event))
            .collect())
    }
}
