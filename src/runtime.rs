//! Runtime for executing intake conversations
//!
//! One task per identifier consumes that identifier's inbox, so events for a
//! user are handled strictly in order while different users run in parallel.

mod executor;
mod rate_limit;
mod terminal;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{RuntimeDeps, SessionRuntime};
pub use rate_limit::RateLimiter;
pub use traits::*;

use crate::session::{Session, SessionState, SessionStats, SessionStore};
use crate::state_machine::{Event, InboundEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};

/// What happened to an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued,
    RateLimited,
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
}

/// Manager for all session runtimes
pub struct RuntimeManager {
    deps: RuntimeDeps,
    limiter: RateLimiter,
    session_timeout: chrono::Duration,
    runtimes: RwLock<HashMap<String, SessionHandle>>,
}

impl RuntimeManager {
    pub fn new(deps: RuntimeDeps, limiter: RateLimiter, session_timeout: chrono::Duration) -> Self {
        Self {
            deps,
            limiter,
            session_timeout,
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    /// Classify an inbound message and queue it on the sender's runtime
    pub async fn dispatch(&self, inbound: InboundEvent) -> Result<Dispatch, String> {
        let sender_id = inbound.sender_id.trim().to_string();
        if sender_id.is_empty() {
            return Err("sender_id must not be empty".to_string());
        }

        if !self.limiter.check(&sender_id, Instant::now()) {
            tracing::info!(session_id = %sender_id, "Inbound event rate limited");
            return Ok(Dispatch::RateLimited);
        }

        // Refresh activity now so a sweep cannot expire the session while
        // the event waits in the inbox
        self.deps.store.get(&sender_id);

        let event = Event::from_inbound(inbound);
        tracing::debug!(session_id = %sender_id, event = event.name(), "Inbound event");

        let handle = self.get_or_create(&sender_id).await;
        if let Err(e) = handle.event_tx.send(event).await {
            // The runtime task died; forget it so the next event starts a new one
            self.runtimes.write().await.remove(&sender_id);
            return Err(format!("Failed to queue event: {e}"));
        }
        Ok(Dispatch::Queued)
    }

    /// Get or create the runtime for an identifier
    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(session_id) {
                return handle.clone();
            }
        }

        let mut runtimes = self.runtimes.write().await;
        if let Some(handle) = runtimes.get(session_id) {
            return handle.clone();
        }

        let (event_tx, event_rx) = mpsc::channel(32);
        let runtime = SessionRuntime::new(session_id, self.deps.clone(), event_rx);
        tokio::spawn(runtime.run());

        let handle = SessionHandle { event_tx };
        runtimes.insert(session_id.to_string(), handle.clone());
        handle
    }

    /// Remove idle sessions, their runtimes and their snapshots
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        self.limiter.prune(Instant::now());

        // Hold the runtime map while sweeping the store so a dispatch that
        // revives a swept id cannot queue on the runtime being dropped
        let expired = {
            let mut runtimes = self.runtimes.write().await;
            let expired = self.deps.store.sweep_expired(now, self.session_timeout);
            for id in &expired {
                // Dropping the sender ends the runtime task once its inbox drains
                runtimes.remove(id);
            }
            expired
        };

        // Snapshots are never fresher than the in-memory session, so the
        // cutoff covers every swept id plus rows that were never restored
        let cutoff = now - self.session_timeout;
        match self
            .deps
            .collaborators
            .persistence
            .delete_sessions_before(cutoff)
            .await
        {
            Ok(deleted) if deleted > 0 => {
                tracing::debug!(count = deleted, "Deleted stale session snapshots");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Failed to delete expired session snapshots"),
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Swept expired sessions");
        }
        expired.len()
    }

    /// Load persisted sessions into the store
    ///
    /// A session saved with its checklist exhausted but still collecting was
    /// interrupted mid-submission; its terminal sequence is started again.
    pub async fn restore(&self, sessions: Vec<Session>) -> usize {
        let interrupted: Vec<String> = sessions
            .iter()
            .filter(|s| s.state == SessionState::CollectingItems && s.is_complete())
            .map(|s| s.id.clone())
            .collect();

        let restored = self.deps.store.restore(sessions);

        for id in interrupted {
            tracing::warn!(session_id = %id, "Resuming interrupted submission");
            let handle = self.get_or_create(&id).await;
            if let Err(e) = handle.event_tx.send(Event::ResumeTerminal).await {
                tracing::error!(session_id = %id, error = %e, "Failed to resume submission");
            }
        }

        restored
    }

    pub fn store(&self) -> &SessionStore {
        &self.deps.store
    }

    pub fn stats(&self) -> SessionStats {
        self.deps.store.stats()
    }

    /// Number of live runtime tasks
    pub async fn active_runtimes(&self) -> usize {
        self.runtimes.read().await.len()
    }

    #[cfg(test)]
    pub async fn has_runtime(&self, session_id: &str) -> bool {
        self.runtimes.read().await.contains_key(session_id)
    }
}
