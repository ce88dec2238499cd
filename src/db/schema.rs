//! Database schema and types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_activity_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_activity ON sessions(last_activity_at);

CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    category TEXT NOT NULL,
    sub_category TEXT,
    item_count INTEGER NOT NULL,
    required_count INTEGER NOT NULL,
    skipped TEXT NOT NULL DEFAULT '[]',
    outcome TEXT NOT NULL,
    channel TEXT,
    detail TEXT,
    submitted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_submissions_session ON submissions(session_id);
CREATE INDEX IF NOT EXISTS idx_submissions_time ON submissions(submitted_at DESC);
";

/// How a Terminal Sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Forwarded,
    Failed,
}

impl SubmissionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionOutcome::Forwarded => "forwarded",
            SubmissionOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "forwarded" => SubmissionOutcome::Forwarded,
            _ => SubmissionOutcome::Failed,
        }
    }
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row per packaging-and-forwarding run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub session_id: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub item_count: usize,
    pub required_count: usize,
    pub skipped: Vec<String>,
    pub outcome: SubmissionOutcome,
    /// Delivery channel, present when forwarding was attempted
    pub channel: Option<String>,
    pub detail: Option<String>,
    pub submitted_at: DateTime<Utc>,
}
