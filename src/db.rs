//! Database module for the intake service
//!
//! Write-through snapshots of sessions plus an audit log of submissions.

mod schema;

pub use schema::*;

use crate::session::{Session, SessionState};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Insert or replace the snapshot of a session
    pub fn save_session(&self, session: &Session) -> DbResult<()> {
        let data = serde_json::to_string(session)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (id, state, data, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                data = excluded.data,
                last_activity_at = excluded.last_activity_at",
            params![
                session.id,
                session.state.as_str(),
                data,
                timestamp(session.created_at),
                timestamp(session.last_activity_at),
            ],
        )?;
        Ok(())
    }

    /// Load every session active at or after `since`
    pub fn load_sessions(&self, since: DateTime<Utc>) -> DbResult<Vec<Session>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, state, data FROM sessions
             WHERE last_activity_at >= ?1
             ORDER BY last_activity_at",
        )?;

        let rows = stmt.query_map(params![timestamp(since)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, state, data) = row?;
            sessions.push(parse_session(&id, state, &data));
        }
        Ok(sessions)
    }

    /// Delete snapshots idle since before `cutoff`, returning how many went away
    pub fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> DbResult<usize> {
        let conn = self.lock();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE last_activity_at < ?1",
            params![timestamp(cutoff)],
        )?;
        Ok(deleted)
    }

    // ==================== Submission Operations ====================

    pub fn record_submission(&self, record: &SubmissionRecord) -> DbResult<i64> {
        let skipped = serde_json::to_string(&record.skipped)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO submissions (session_id, category, sub_category, item_count, required_count,
                                      skipped, outcome, channel, detail, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.session_id,
                record.category,
                record.sub_category,
                to_sql_count(record.item_count),
                to_sql_count(record.required_count),
                skipped,
                record.outcome.as_str(),
                record.channel,
                record.detail,
                timestamp(record.submitted_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent submissions first
    pub fn recent_submissions(&self, limit: usize) -> DbResult<Vec<SubmissionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, category, sub_category, item_count, required_count,
                    skipped, outcome, channel, detail, submitted_at
             FROM submissions ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![to_sql_count(limit)], |row| {
            let skipped: String = row.get(5)?;
            Ok(SubmissionRecord {
                session_id: row.get(0)?,
                category: row.get(1)?,
                sub_category: row.get(2)?,
                item_count: from_sql_count(row.get(3)?),
                required_count: from_sql_count(row.get(4)?),
                skipped: serde_json::from_str(&skipped).unwrap_or_default(),
                outcome: SubmissionOutcome::parse(&row.get::<_, String>(6)?),
                channel: row.get(7)?,
                detail: row.get(8)?,
                submitted_at: parse_datetime(&row.get::<_, String>(9)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

/// Rebuild a session from its row. The `state` column wins over the state
/// inside the JSON blob; a blob that no longer parses yields an empty
/// session in an unrecognised state so the conversation can self-heal.
fn parse_session(id: &str, state: String, data: &str) -> Session {
    let state = SessionState::from(state);
    match serde_json::from_str::<Session>(data) {
        Ok(mut session) => {
            session.state = state;
            session
        }
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "Unreadable session snapshot");
            let mut session = Session::new(id, Utc::now());
            session.state = SessionState::Unrecognized(format!("corrupt:{}", state.as_str()));
            session
        }
    }
}

/// Fixed-width UTC timestamps so that text comparison orders them
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn to_sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_sql_count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}
