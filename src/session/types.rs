//! Session record types

use crate::catalog::{Category, SubCategory};
use crate::state_machine::event::AttachmentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Where a user is in the intake dialogue
///
/// Stored as its snake_case label. A label that names none of the known
/// states survives as `Unrecognized` so the state machine can recover from it
/// instead of failing to load the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionState {
    #[default]
    Initial,
    AwaitingCategory,
    AwaitingSubcategory,
    CollectingItems,
    Completed,
    /// Corrupted or foreign state label
    Unrecognized(String),
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Initial => "initial",
            SessionState::AwaitingCategory => "awaiting_category",
            SessionState::AwaitingSubcategory => "awaiting_subcategory",
            SessionState::CollectingItems => "collecting_items",
            SessionState::Completed => "completed",
            SessionState::Unrecognized(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, SessionState::Unrecognized(_))
    }
}

impl From<String> for SessionState {
    fn from(label: String) -> Self {
        match label.as_str() {
            "initial" => SessionState::Initial,
            "awaiting_category" => SessionState::AwaitingCategory,
            "awaiting_subcategory" => SessionState::AwaitingSubcategory,
            "collecting_items" => SessionState::CollectingItems,
            "completed" => SessionState::Completed,
            _ => SessionState::Unrecognized(label),
        }
    }
}

impl From<SessionState> for String {
    fn from(state: SessionState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One received document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub item_name: String,
    pub source_file_name: String,
    pub media_kind: AttachmentKind,
    pub mime_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    /// Location of the stored copy in the document tree
    pub stored_path: PathBuf,
}

/// Per-user intake progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub category: Option<Category>,
    pub sub_category: Option<SubCategory>,
    /// Fixed when collection starts; never re-derived from the catalog
    pub required_items: Vec<String>,
    pub uploaded_items: Vec<UploadRecord>,
    /// Index of the current required item. Skips advance it without an upload,
    /// so it is independent of `uploaded_items.len()`.
    pub cursor: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Initial,
            category: None,
            sub_category: None,
            required_items: Vec::new(),
            uploaded_items: Vec::new(),
            cursor: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn current_required_item(&self) -> Option<&str> {
        self.required_items.get(self.cursor).map(String::as_str)
    }

    pub fn remaining_items(&self) -> &[String] {
        self.required_items
            .get(self.cursor..)
            .unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.required_items.len()
    }

    /// Required items passed over without an upload
    pub fn skipped_items(&self) -> Vec<&str> {
        let end = self.cursor.min(self.required_items.len());
        self.required_items[..end]
            .iter()
            .filter(|item| !self.uploaded_items.iter().any(|u| &u.item_name == *item))
            .map(String::as_str)
            .collect()
    }
}

/// Aggregate view of the store for operators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub by_state: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}
