//! API request and response types

use crate::db::SubmissionRecord;
use crate::session::SessionStats;
use serde::{Deserialize, Serialize};

/// Outcome of accepting an inbound event
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub queued: bool,
    pub rate_limited: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub sessions: SessionStats,
    pub active_runtimes: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionListResponse {
    pub submissions: Vec<SubmissionRecord>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
