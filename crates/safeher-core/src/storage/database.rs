//! SQLite-based persistence.
//!
//! Provides persistent storage for:
//! - Namespaced preferences (the emergency contact list lives here)
//! - Dispatch history (one JSON report per job)
//! - The SMS outbox used by hosts without a radio

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::dispatch::{DispatchReport, Segment};
use crate::error::{CoreError, DatabaseError};

/// One SMS segment written by the outbox transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: i64,
    pub recipient: String,
    pub segment_index: usize,
    pub segment_count: usize,
    pub body: String,
    pub queued_at: DateTime<Utc>,
}

/// SQLite database for preferences, history and outbox.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/safeher/safeher.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("safeher.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prefs (
                namespace TEXT NOT NULL,
                key       TEXT NOT NULL,
                value     TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE TABLE IF NOT EXISTS dispatch_log (
                job_id      TEXT PRIMARY KEY,
                outcome     TEXT NOT NULL,
                report      TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sms_outbox (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient     TEXT NOT NULL,
                segment_index INTEGER NOT NULL,
                segment_count INTEGER NOT NULL,
                body          TEXT NOT NULL,
                queued_at     TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_dispatch_log_finished_at ON dispatch_log(finished_at);",
        )?;
        Ok(())
    }

    pub fn pref_get(&self, namespace: &str, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM prefs WHERE namespace = ?1 AND key = ?2")?;
        match stmt.query_row(params![namespace, key], |row| row.get::<_, String>(0)) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn pref_set(&self, namespace: &str, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO prefs (namespace, key, value) VALUES (?1, ?2, ?3)",
            params![namespace, key, value],
        )?;
        Ok(())
    }

    /// Returns `true` when a row was deleted.
    pub fn pref_remove(&self, namespace: &str, key: &str) -> Result<bool, rusqlite::Error> {
        let n = self.conn.execute(
            "DELETE FROM prefs WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(n > 0)
    }

    /// Append a finished dispatch job to the history.
    pub fn record_dispatch(&self, report: &DispatchReport) -> Result<(), CoreError> {
        let json = serde_json::to_string(report)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO dispatch_log (job_id, outcome, report, finished_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                report.job_id.to_string(),
                report.outcome.label(),
                json,
                report.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent reports first.
    pub fn list_dispatches(&self, limit: usize) -> Result<Vec<DispatchReport>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT report FROM dispatch_log ORDER BY finished_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(serde_json::from_str(&row?)?);
        }
        Ok(reports)
    }

    pub fn record_outbox(&self, recipient: &str, segment: &Segment) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO sms_outbox (recipient, segment_index, segment_count, body, queued_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                recipient,
                segment.index as i64,
                segment.count as i64,
                segment.text,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Oldest first.
    pub fn list_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recipient, segment_index, segment_count, body, queued_at
             FROM sms_outbox ORDER BY id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let queued_at: String = row.get(5)?;
            Ok(OutboxRecord {
                id: row.get(0)?,
                recipient: row.get(1)?,
                segment_index: row.get::<_, i64>(2)? as usize,
                segment_count: row.get::<_, i64>(3)? as usize,
                body: row.get(4)?,
                queued_at: DateTime::parse_from_rfc3339(&queued_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;
        rows.collect()
    }

    pub fn clear_outbox(&self) -> Result<usize, rusqlite::Error> {
        self.conn.execute("DELETE FROM sms_outbox", [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchOutcome, RecipientFailure};
    use uuid::Uuid;

    fn report(outcome: DispatchOutcome, finished_at: DateTime<Utc>) -> DispatchReport {
        DispatchReport {
            job_id: Uuid::new_v4(),
            gesture_seq: 1,
            outcome,
            attempted: 2,
            submitted: 1,
            failures: vec![RecipientFailure {
                recipient: "+919999999999".into(),
                reason: "radio off".into(),
            }],
            started_at: finished_at,
            finished_at,
        }
    }

    #[test]
    fn prefs_are_namespaced() {
        let db = Database::open_memory().unwrap();
        db.pref_set("SafeHerPrefs", "emergency_contacts", "+911").unwrap();
        db.pref_set("Other", "emergency_contacts", "+912").unwrap();
        assert_eq!(
            db.pref_get("SafeHerPrefs", "emergency_contacts").unwrap().as_deref(),
            Some("+911")
        );
        assert!(db.pref_remove("Other", "emergency_contacts").unwrap());
        assert!(!db.pref_remove("Other", "emergency_contacts").unwrap());
        assert_eq!(db.pref_get("Other", "emergency_contacts").unwrap(), None);
    }

    #[test]
    fn dispatch_history_newest_first() {
        let db = Database::open_memory().unwrap();
        let earlier = Utc::now() - chrono::Duration::minutes(5);
        let first = report(DispatchOutcome::NoContacts, earlier);
        let second = report(DispatchOutcome::Completed, Utc::now());
        db.record_dispatch(&first).unwrap();
        db.record_dispatch(&second).unwrap();

        let listed = db.list_dispatches(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].job_id, second.job_id);
        assert_eq!(listed[1].outcome, DispatchOutcome::NoContacts);
        assert_eq!(db.list_dispatches(1).unwrap().len(), 1);
    }

    #[test]
    fn outbox_keeps_segment_order() {
        let db = Database::open_memory().unwrap();
        for index in 1..=2 {
            let segment = Segment {
                index,
                count: 2,
                text: format!("part {index}"),
            };
            db.record_outbox("+911234567890", &segment).unwrap();
        }
        let rows = db.list_outbox(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].body, "part 1");
        assert_eq!(rows[1].segment_index, 2);
        assert_eq!(db.clear_outbox().unwrap(), 2);
        assert!(db.list_outbox(10).unwrap().is_empty());
    }

    #[test]
    fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("safeher.db");
        let db = Database::open_at(&path).unwrap();
        db.pref_set("SafeHerPrefs", "emergency_contacts", "+911").unwrap();
        drop(db);
        let reopened = Database::open_at(&path).unwrap();
        assert_eq!(
            reopened.pref_get("SafeHerPrefs", "emergency_contacts").unwrap().as_deref(),
            Some("+911")
        );
    }
}
