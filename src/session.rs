//! Session store
//!
//! Owns every in-flight intake session, keyed by the sender identifier.
//! Every operation is get-or-create: callers never see a missing session.

mod types;

pub use types::{Session, SessionState, SessionStats, UploadRecord};

use crate::catalog::{Category, SubCategory};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the session for `id`, creating it first if needed.
    /// Each call is atomic with respect to other store operations.
    fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let now = Utc::now();
        let mut sessions = self.lock();
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!(session_id = %id, "Creating session");
            Session::new(id, now)
        });
        session.last_activity_at = now;
        f(session)
    }

    /// Return a copy of the session, creating an INITIAL one if absent
    pub fn get(&self, id: &str) -> Session {
        self.with_session(id, |s| s.clone())
    }

    /// Read-only snapshot; does not create or touch the session
    pub fn peek(&self, id: &str) -> Option<Session> {
        self.lock().get(id).cloned()
    }

    pub fn set_state(&self, id: &str, state: SessionState) {
        self.with_session(id, |s| s.state = state);
    }

    pub fn set_selection(&self, id: &str, category: Category, sub_category: Option<SubCategory>) {
        self.with_session(id, |s| {
            s.category = Some(category);
            s.sub_category = sub_category;
        });
    }

    /// Fix the item list for collection; resets progress
    pub fn set_required_items(&self, id: &str, items: Vec<String>) {
        self.with_session(id, |s| {
            s.required_items = items;
            s.cursor = 0;
            s.uploaded_items.clear();
        });
    }

    pub fn append_upload(&self, id: &str, record: UploadRecord) {
        self.with_session(id, |s| s.uploaded_items.push(record));
    }

    pub fn advance_cursor(&self, id: &str) {
        self.with_session(id, |s| s.cursor += 1);
    }

    /// Replace the session with a fresh INITIAL record under the same id
    pub fn reset(&self, id: &str) {
        self.with_session(id, |s| *s = Session::new(id, Utc::now()));
    }

    #[allow(dead_code)] // Used in tests
    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    #[allow(dead_code)] // Used in tests
    pub fn current_required_item(&self, id: &str) -> Option<String> {
        self.with_session(id, |s| s.current_required_item().map(String::from))
    }

    #[allow(dead_code)] // Used in tests
    pub fn remaining_items(&self, id: &str) -> Vec<String> {
        self.with_session(id, |s| s.remaining_items().to_vec())
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_complete(&self, id: &str) -> bool {
        self.with_session(id, |s| s.is_complete())
    }

    /// Remove sessions idle for longer than `timeout`; returns the removed ids
    pub fn sweep_expired(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut sessions = self.lock();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| now - s.last_activity_at > timeout)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }

    /// Load previously persisted sessions, keeping any already in memory
    pub fn restore(&self, restored: impl IntoIterator<Item = Session>) -> usize {
        let mut sessions = self.lock();
        let mut count = 0;
        for session in restored {
            if !sessions.contains_key(&session.id) {
                sessions.insert(session.id.clone(), session);
                count += 1;
            }
        }
        count
    }

    pub fn stats(&self) -> SessionStats {
        let sessions = self.lock();
        let mut stats = SessionStats {
            total_sessions: sessions.len(),
            ..SessionStats::default()
        };
        for session in sessions.values() {
            *stats
                .by_state
                .entry(session.state.as_str().to_string())
                .or_default() += 1;
            let category = session.category.map_or("none", Category::key);
            *stats.by_category.entry(category.to_string()).or_default() += 1;
        }
        stats
    }
}
