//! Mock implementations for testing
//!
//! These mocks enable end-to-end runtime testing without real I/O.

use super::traits::*;
use super::{Dispatch, RateLimiter, RuntimeDeps, RuntimeManager, SessionRuntime};
use crate::catalog::{Catalog, Category};
use crate::db::SubmissionRecord;
use crate::gateway::GatewayError;
use crate::scheduler::Scheduler;
use crate::session::{Session, SessionState, SessionStore, UploadRecord};
use crate::state_machine::{
    AttachmentKind, AttachmentRef, ChoiceOption, EmptySubmissionPolicy, Event, InboundEvent,
    InboundKind, IntakeContext,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Recording Gateway
// ============================================================================

/// A message the runtime sent to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text { to: String, body: String },
    Prompt { to: String, body: String, keys: Vec<String> },
}

impl Outbound {
    pub fn body(&self) -> &str {
        match self {
            Outbound::Text { body, .. } | Outbound::Prompt { body, .. } => body,
        }
    }
}

/// Gateway that records sends and serves canned media
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<Outbound>>,
    /// Number of upcoming fetches that fail
    failing_fetches: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl RecordingGateway {
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|m| m.body().to_string())
    }

    pub fn bodies(&self) -> Vec<String> {
        self.messages().iter().map(|m| m.body().to_string()).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl OutboundGateway for RecordingGateway {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), GatewayError> {
        self.sent.lock().unwrap().push(Outbound::Text {
            to: recipient.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_choice_prompt(
        &self,
        recipient: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError> {
        self.sent.lock().unwrap().push(Outbound::Prompt {
            to: recipient.to_string(),
            body: body.to_string(),
            keys: options.iter().map(|o| o.key.clone()).collect(),
        });
        Ok(())
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<FetchedAttachment, GatewayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_fetches.store(failing - 1, Ordering::SeqCst);
            return Err(GatewayError::timeout(format!("media {} timed out", attachment.reference)));
        }
        Ok(FetchedAttachment {
            bytes: b"%PDF-1.4 mock".to_vec(),
            mime_type: "application/pdf".to_string(),
            file_name: None,
        })
    }
}

// ============================================================================
// Mock Document Store
// ============================================================================

/// Document store that keeps everything in memory and counts packaging
#[derive(Default)]
pub struct MockDocumentStore {
    pub stored: Mutex<Vec<(String, String)>>,
    /// (session id, number of uploads) per packaging call
    pub packaged: Mutex<Vec<(String, usize)>>,
    pub discarded: Mutex<Vec<PathBuf>>,
    fail_packaging: AtomicBool,
}

impl MockDocumentStore {
    pub fn fail_packaging(&self) {
        self.fail_packaging.store(true, Ordering::SeqCst);
    }

    pub fn package_calls(&self) -> usize {
        self.packaged.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn store_upload(
        &self,
        session_id: &str,
        category: Category,
        item_name: &str,
        attachment: &FetchedAttachment,
    ) -> Result<StoredUpload, String> {
        self.stored
            .lock()
            .unwrap()
            .push((session_id.to_string(), item_name.to_string()));
        Ok(StoredUpload {
            path: PathBuf::from(format!("/mock/{session_id}/{}/{item_name}.pdf", category.key())),
            file_name: format!("{item_name}.pdf"),
            size_bytes: attachment.bytes.len() as u64,
        })
    }

    async fn package_uploads(
        &self,
        session_id: &str,
        _category: Category,
        uploads: &[UploadRecord],
    ) -> Result<ArchiveHandle, String> {
        self.packaged
            .lock()
            .unwrap()
            .push((session_id.to_string(), uploads.len()));
        if self.fail_packaging.load(Ordering::SeqCst) {
            return Err("disk full".to_string());
        }
        Ok(ArchiveHandle {
            path: PathBuf::from(format!("/mock/archives/{session_id}.zip")),
            size_bytes: 1024,
            item_count: uploads.len(),
        })
    }

    async fn discard_archive(&self, archive: &ArchiveHandle) -> Result<(), String> {
        self.discarded.lock().unwrap().push(archive.path.clone());
        Ok(())
    }
}

// ============================================================================
// Mock Forwarder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    Deliver(DeliveryChannel),
    Undelivered,
    Fail,
}

pub struct MockForwarder {
    mode: Mutex<ForwardMode>,
    pub forwarded: Mutex<Vec<SubmissionSummary>>,
}

impl MockForwarder {
    pub fn new(mode: ForwardMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            forwarded: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: ForwardMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.forwarded.lock().unwrap().len()
    }
}

impl Default for MockForwarder {
    fn default() -> Self {
        Self::new(ForwardMode::Deliver(DeliveryChannel::Simulated))
    }
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn forward(
        &self,
        archive: &ArchiveHandle,
        summary: &SubmissionSummary,
    ) -> Result<ForwardReceipt, String> {
        self.forwarded.lock().unwrap().push(summary.clone());
        match *self.mode.lock().unwrap() {
            ForwardMode::Deliver(channel) => Ok(ForwardReceipt {
                delivered: true,
                channel,
            }),
            ForwardMode::Undelivered => Ok(ForwardReceipt {
                delivered: false,
                channel: DeliveryChannel::Direct,
            }),
            ForwardMode::Fail => Err(format!("webhook refused {}", archive.path.display())),
        }
    }
}

// ============================================================================
// In-Memory Persistence
// ============================================================================

#[derive(Default)]
pub struct InMemoryPersistence {
    pub sessions: Mutex<HashMap<String, Session>>,
    pub deleted: Mutex<Vec<String>>,
    pub submissions: Mutex<Vec<SubmissionRecord>>,
}

impl InMemoryPersistence {
    pub fn saved(&self, id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl SessionPersistence for InMemoryPersistence {
    async fn save_session(&self, session: &Session) -> Result<(), String> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize, String> {
        let mut sessions = self.sessions.lock().unwrap();
        let stale: Vec<String> = sessions
            .values()
            .filter(|s| s.last_activity_at < cutoff)
            .map(|s| s.id.clone())
            .collect();
        for id in &stale {
            sessions.remove(id);
        }
        self.deleted.lock().unwrap().extend(stale.iter().cloned());
        Ok(stale.len())
    }

    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), String> {
        self.submissions.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ============================================================================
// Test Runtime Harness
// ============================================================================

/// Mocks shared by a harness and the runtimes it drives
#[derive(Clone)]
pub struct Mocks {
    pub gateway: Arc<RecordingGateway>,
    pub documents: Arc<MockDocumentStore>,
    pub forwarder: Arc<MockForwarder>,
    pub persistence: Arc<InMemoryPersistence>,
    pub store: Arc<SessionStore>,
    pub scheduler: Scheduler,
}

impl Mocks {
    pub fn new() -> Self {
        Self {
            gateway: Arc::new(RecordingGateway::default()),
            documents: Arc::new(MockDocumentStore::default()),
            forwarder: Arc::new(MockForwarder::default()),
            persistence: Arc::new(InMemoryPersistence::default()),
            store: Arc::new(SessionStore::new()),
            scheduler: Scheduler::new(),
        }
    }

    pub fn deps(&self, policy: EmptySubmissionPolicy) -> RuntimeDeps {
        RuntimeDeps {
            store: self.store.clone(),
            context: Arc::new(IntakeContext::new(Arc::new(Catalog::standard()), policy)),
            collaborators: Collaborators {
                gateway: self.gateway.clone(),
                documents: self.documents.clone(),
                forwarder: self.forwarder.clone(),
                persistence: self.persistence.clone(),
            },
            scheduler: self.scheduler.clone(),
            archive_grace: Duration::from_secs(300),
        }
    }
}

/// Drives a single session runtime synchronously, one event at a time
pub struct TestRuntime {
    pub mocks: Mocks,
    pub session_id: String,
    runtime: SessionRuntime,
    attachments_sent: usize,
    // Keeps the inbox open for the lifetime of the harness
    _event_tx: mpsc::Sender<Event>,
}

impl TestRuntime {
    pub fn new() -> Self {
        Self::with_policy(EmptySubmissionPolicy::Forward)
    }

    pub fn with_policy(policy: EmptySubmissionPolicy) -> Self {
        let mocks = Mocks::new();
        let (event_tx, event_rx) = mpsc::channel(8);
        let session_id = "+15550001".to_string();
        let runtime = SessionRuntime::new(&session_id, mocks.deps(policy), event_rx);
        Self {
            mocks,
            session_id,
            runtime,
            attachments_sent: 0,
            _event_tx: event_tx,
        }
    }

    async fn deliver(&mut self, inbound: InboundEvent) {
        self.runtime
            .process_event(Event::from_inbound(inbound))
            .await
            .unwrap();
    }

    pub async fn send_text(&mut self, text: &str) {
        let inbound = InboundEvent {
            sender_id: self.session_id.clone(),
            kind: InboundKind::Text,
            text: Some(text.to_string()),
            attachment: None,
        };
        self.deliver(inbound).await;
    }

    pub async fn send_selection(&mut self, text: &str) {
        let inbound = InboundEvent {
            sender_id: self.session_id.clone(),
            kind: InboundKind::SelectionReply,
            text: Some(text.to_string()),
            attachment: None,
        };
        self.deliver(inbound).await;
    }

    pub async fn send_attachment(&mut self) {
        self.attachments_sent += 1;
        let inbound = InboundEvent {
            sender_id: self.session_id.clone(),
            kind: InboundKind::Attachment,
            text: None,
            attachment: Some(AttachmentRef {
                reference: format!("media-{}", self.attachments_sent),
                kind: AttachmentKind::Document,
                file_name: Some(format!("scan-{}.pdf", self.attachments_sent)),
            }),
        };
        self.deliver(inbound).await;
    }

    /// Walk through greeting, category and sub-category
    pub async fn start_collecting(&mut self, category: &str, sub_category: &str) {
        self.send_text("hi").await;
        self.send_selection(category).await;
        self.send_selection(sub_category).await;
        assert_eq!(self.session().state, SessionState::CollectingItems);
    }

    pub fn session(&self) -> Session {
        self.mocks.store.peek(&self.session_id).unwrap()
    }
}

/// Build a manager over fresh mocks
pub fn test_manager(rate_limit: u32, session_timeout: chrono::Duration) -> (Arc<RuntimeManager>, Mocks) {
    let mocks = Mocks::new();
    let manager = RuntimeManager::new(
        mocks.deps(EmptySubmissionPolicy::Forward),
        RateLimiter::new(rate_limit),
        session_timeout,
    );
    (Arc::new(manager), mocks)
}

/// Poll until the session reaches `expected` or the timeout elapses
pub async fn wait_for_state(store: &SessionStore, id: &str, expected: &SessionState, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if store.peek(id).is_some_and(|s| &s.state == expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SubCategory;
    use crate::db::SubmissionOutcome;
    use crate::state_machine::prompts;

    fn inbound_text(sender: &str, text: &str) -> InboundEvent {
        InboundEvent {
            sender_id: sender.to_string(),
            kind: InboundKind::Text,
            text: Some(text.to_string()),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn test_housing_salaried_full_path() {
        let mut rt = TestRuntime::new();
        rt.start_collecting("Home", "Salaried").await;

        let session = rt.session();
        assert_eq!(session.category, Some(Category::Housing));
        assert_eq!(
            session.required_items,
            vec![
                "Identity Proof",
                "Address Proof",
                "PAN Card",
                "Salary Slips",
                "Bank Statements",
                "Form 16",
                "Property Documents",
            ]
        );

        for _ in 0..7 {
            rt.send_attachment().await;
        }

        let session = rt.session();
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.uploaded_items.len(), 7);
        assert_eq!(session.uploaded_items[0].item_name, "Identity Proof");
        assert_eq!(session.uploaded_items[0].source_file_name, "scan-1.pdf");
        assert_eq!(rt.mocks.documents.package_calls(), 1);
        assert_eq!(rt.mocks.forwarder.calls(), 1);
        assert_eq!(rt.mocks.gateway.last_body(), Some(prompts::submitted(7)));

        let submissions = rt.mocks.persistence.submissions.lock().unwrap().clone();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].outcome, SubmissionOutcome::Forwarded);
        assert_eq!(submissions[0].channel.as_deref(), Some("simulated"));

        // Snapshot was written through after the final transition
        let saved = rt.mocks.persistence.saved(&rt.session_id).unwrap();
        assert_eq!(saved.state, SessionState::Completed);
    }

    #[tokio::test]
    async fn test_forwarded_summary_lists_items() {
        let mut rt = TestRuntime::new();
        rt.start_collecting("vehicle", "self employed").await;
        rt.send_attachment().await;
        rt.send_text("skip").await;
        let remaining = rt.session().required_items.len() - 2;
        for _ in 0..remaining {
            rt.send_attachment().await;
        }

        let summary = rt.mocks.forwarder.forwarded.lock().unwrap()[0].clone();
        assert_eq!(summary.category, Category::Vehicle);
        assert_eq!(summary.item_count, summary.required_count - 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.items[0].file_name, "scan-1.pdf");
    }

    #[tokio::test]
    async fn test_skip_to_completion_forwards_empty_bundle() {
        let mut rt = TestRuntime::new();
        rt.start_collecting("Home", "Salaried").await;
        for _ in 0..7 {
            rt.send_text("skip").await;
        }

        let session = rt.session();
        assert_eq!(session.state, SessionState::Completed);
        assert!(session.uploaded_items.is_empty());
        assert_eq!(*rt.mocks.documents.packaged.lock().unwrap(), vec![(rt.session_id.clone(), 0)]);
        assert_eq!(rt.mocks.forwarder.calls(), 1);
    }

    #[tokio::test]
    async fn test_skip_policy_completes_without_packaging() {
        let mut rt = TestRuntime::with_policy(EmptySubmissionPolicy::Skip);
        rt.start_collecting("education", "salaried").await;
        let total = rt.session().required_items.len();
        for _ in 0..total {
            rt.send_text("next").await;
        }

        assert_eq!(rt.session().state, SessionState::Completed);
        assert_eq!(rt.mocks.documents.package_calls(), 0);
        assert_eq!(rt.mocks.forwarder.calls(), 0);
        assert_eq!(
            rt.mocks.gateway.last_body().as_deref(),
            Some(prompts::COMPLETED_WITHOUT_DOCUMENTS)
        );
    }

    #[tokio::test]
    async fn test_duplicate_attachment_after_completion_does_not_repackage() {
        let mut rt = TestRuntime::new();
        rt.start_collecting("Home", "Salaried").await;
        for _ in 0..7 {
            rt.send_attachment().await;
        }
        rt.send_attachment().await;

        assert_eq!(rt.mocks.documents.package_calls(), 1);
        assert_eq!(rt.mocks.gateway.fetches.load(Ordering::SeqCst), 7);
        assert_eq!(rt.mocks.gateway.last_body().as_deref(), Some(prompts::COMPLETED_HINT));
    }

    #[tokio::test]
    async fn test_exhausted_checklist_short_circuits() {
        let mut rt = TestRuntime::new();
        rt.start_collecting("personal", "salaried").await;
        // Checklist exhausted but state not yet flipped to Completed
        let total = rt.session().required_items.len();
        for _ in 0..total {
            rt.mocks.store.advance_cursor(&rt.session_id);
        }
        rt.send_attachment().await;

        assert_eq!(rt.mocks.gateway.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(rt.mocks.documents.package_calls(), 0);
        assert_eq!(rt.mocks.gateway.last_body().as_deref(), Some(prompts::ALREADY_COMPLETE));
    }

    #[tokio::test]
    async fn test_upload_failure_retries_same_item() {
        let mut rt = TestRuntime::new();
        rt.start_collecting("Home", "Salaried").await;
        rt.mocks.gateway.fail_next_fetches(2);

        rt.send_attachment().await;
        rt.send_attachment().await;
        assert_eq!(rt.session().cursor, 0);
        assert_eq!(
            rt.mocks.gateway.last_body(),
            Some(prompts::upload_retry("Identity Proof"))
        );

        rt.send_attachment().await;
        let session = rt.session();
        assert_eq!(session.cursor, 1);
        assert_eq!(session.current_required_item(), Some("Address Proof"));
    }

    #[tokio::test]
    async fn test_packaging_failure_still_completes() {
        let mut rt = TestRuntime::new();
        rt.mocks.documents.fail_packaging();
        rt.start_collecting("business", "self-employed").await;
        let total = rt.session().required_items.len();
        for _ in 0..total {
            rt.send_attachment().await;
        }

        assert_eq!(rt.session().state, SessionState::Completed);
        assert_eq!(rt.mocks.forwarder.calls(), 0);
        assert_eq!(rt.mocks.gateway.last_body().as_deref(), Some(prompts::TERMINAL_FAILED));
        let submissions = rt.mocks.persistence.submissions.lock().unwrap().clone();
        assert_eq!(submissions[0].outcome, SubmissionOutcome::Failed);
        assert!(submissions[0].detail.as_deref().unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_undelivered_forward_is_a_failure_and_archive_is_cleaned_up() {
        let mut rt = TestRuntime::new();
        rt.mocks.forwarder.set_mode(ForwardMode::Undelivered);
        rt.start_collecting("Home", "Salaried").await;
        for _ in 0..7 {
            rt.send_text("skip").await;
        }

        assert_eq!(rt.session().state, SessionState::Completed);
        assert_eq!(rt.mocks.gateway.last_body().as_deref(), Some(prompts::TERMINAL_FAILED));

        // Pending archive deletion runs immediately at shutdown
        assert!(rt.mocks.documents.discarded.lock().unwrap().is_empty());
        assert!(rt.mocks.scheduler.shutdown(Duration::from_secs(1)).await);
        assert_eq!(rt.mocks.documents.discarded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_mid_collection() {
        let mut rt = TestRuntime::new();
        rt.start_collecting("Home", "Salaried").await;
        rt.send_attachment().await;
        rt.mocks.gateway.clear();

        rt.send_text("Start over").await;

        let session = rt.session();
        assert_eq!(session.state, SessionState::AwaitingCategory);
        assert!(session.category.is_none());
        assert!(session.required_items.is_empty());
        assert!(session.uploaded_items.is_empty());
        assert_eq!(session.cursor, 0);
        assert!(matches!(
            &rt.mocks.gateway.messages()[0],
            Outbound::Prompt { body, keys, .. } if body == prompts::WELCOME && keys.len() == 5
        ));
    }

    #[tokio::test]
    async fn test_unrecognized_state_recovers() {
        let mut rt = TestRuntime::new();
        rt.mocks
            .store
            .set_state(&rt.session_id, SessionState::Unrecognized("legacy_state".to_string()));

        rt.send_text("hello?").await;

        assert_eq!(rt.session().state, SessionState::AwaitingCategory);
        let bodies = rt.mocks.gateway.bodies();
        assert_eq!(bodies[0], prompts::SESSION_RECOVERED);
        assert_eq!(bodies[1], prompts::WELCOME);
    }

    #[tokio::test]
    async fn test_invalid_category_reprompts() {
        let mut rt = TestRuntime::new();
        rt.send_text("hi").await;
        rt.send_text("a pony").await;

        assert_eq!(rt.session().state, SessionState::AwaitingCategory);
        assert_eq!(rt.mocks.gateway.last_body().as_deref(), Some(prompts::CATEGORY_RETRY));
    }

    #[tokio::test]
    async fn test_status_reports_progress() {
        let mut rt = TestRuntime::new();
        rt.start_collecting("Home", "Salaried").await;
        rt.send_attachment().await;
        rt.send_text("skip").await;
        rt.send_text("status").await;

        let body = rt.mocks.gateway.last_body().unwrap();
        assert!(body.contains("Identity Proof: received"));
        assert!(body.contains("Address Proof: skipped"));
        assert!(body.contains("PAN Card: waiting"));
    }

    // ========================================================================
    // RuntimeManager
    // ========================================================================

    #[tokio::test]
    async fn test_dispatch_runs_conversation() {
        let (manager, mocks) = test_manager(0, chrono::Duration::minutes(30));
        assert_eq!(
            manager.dispatch(inbound_text("u1", "hello")).await.unwrap(),
            Dispatch::Queued
        );
        manager.dispatch(inbound_text("u1", "car")).await.unwrap();

        assert!(
            wait_for_state(&mocks.store, "u1", &SessionState::AwaitingSubcategory, Duration::from_secs(2)).await
        );
        assert_eq!(manager.active_runtimes().await, 1);
    }

    #[tokio::test]
    async fn test_identifiers_are_isolated() {
        let (manager, mocks) = test_manager(0, chrono::Duration::minutes(30));
        manager.dispatch(inbound_text("a", "hi")).await.unwrap();
        manager.dispatch(inbound_text("b", "hi")).await.unwrap();
        manager.dispatch(inbound_text("a", "education")).await.unwrap();

        assert!(wait_for_state(&mocks.store, "a", &SessionState::AwaitingSubcategory, Duration::from_secs(2)).await);
        assert!(wait_for_state(&mocks.store, "b", &SessionState::AwaitingCategory, Duration::from_secs(2)).await);
        assert_eq!(mocks.store.peek("b").unwrap().category, None);
    }

    #[tokio::test]
    async fn test_dispatch_rate_limits() {
        let (manager, _mocks) = test_manager(2, chrono::Duration::minutes(30));
        assert_eq!(manager.dispatch(inbound_text("u1", "a")).await.unwrap(), Dispatch::Queued);
        assert_eq!(manager.dispatch(inbound_text("u1", "b")).await.unwrap(), Dispatch::Queued);
        assert_eq!(
            manager.dispatch(inbound_text("u1", "c")).await.unwrap(),
            Dispatch::RateLimited
        );
        assert_eq!(manager.dispatch(inbound_text("u2", "a")).await.unwrap(), Dispatch::Queued);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_blank_sender() {
        let (manager, _mocks) = test_manager(0, chrono::Duration::minutes(30));
        assert!(manager.dispatch(inbound_text("  ", "hi")).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_sessions() {
        let (manager, mocks) = test_manager(0, chrono::Duration::minutes(30));
        manager.dispatch(inbound_text("idle", "hi")).await.unwrap();
        assert!(wait_for_state(&mocks.store, "idle", &SessionState::AwaitingCategory, Duration::from_secs(2)).await);

        // Nothing is stale yet
        assert_eq!(manager.sweep_expired(chrono::Utc::now()).await, 0);

        let later = chrono::Utc::now() + chrono::Duration::minutes(31);
        assert_eq!(manager.sweep_expired(later).await, 1);
        assert!(mocks.store.peek("idle").is_none());
        assert_eq!(manager.active_runtimes().await, 0);
        assert_eq!(*mocks.persistence.deleted.lock().unwrap(), vec!["idle".to_string()]);
        assert!(mocks.persistence.saved("idle").is_none());

        // The next message starts over from INITIAL
        manager.dispatch(inbound_text("idle", "home")).await.unwrap();
        assert!(wait_for_state(&mocks.store, "idle", &SessionState::AwaitingCategory, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_restore_keeps_progress() {
        let (manager, mocks) = test_manager(0, chrono::Duration::minutes(30));
        let mut session = Session::new("back", chrono::Utc::now());
        session.state = SessionState::AwaitingSubcategory;
        session.category = Some(Category::Personal);
        assert_eq!(manager.restore(vec![session]).await, 1);

        manager.dispatch(inbound_text("back", "salaried")).await.unwrap();
        assert!(wait_for_state(&mocks.store, "back", &SessionState::CollectingItems, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_restore_resumes_interrupted_submission() {
        let (manager, mocks) = test_manager(0, chrono::Duration::minutes(30));
        // Saved after the last skip but before the terminal sequence finished
        let mut session = Session::new("crashed", chrono::Utc::now());
        session.state = SessionState::CollectingItems;
        session.category = Some(Category::Personal);
        session.sub_category = Some(SubCategory::Salaried);
        session.required_items = vec!["PAN Card".to_string()];
        session.cursor = 1;
        assert_eq!(manager.restore(vec![session]).await, 1);

        assert!(wait_for_state(&mocks.store, "crashed", &SessionState::Completed, Duration::from_secs(2)).await);
        assert_eq!(mocks.documents.package_calls(), 1);
        assert_eq!(mocks.forwarder.forwarded.lock().unwrap().len(), 1);

        // Later messages see a finished application and never repackage
        manager.dispatch(inbound_text("crashed", "status")).await.unwrap();
        manager.dispatch(inbound_text("crashed", "hello")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mocks.documents.package_calls(), 1);
        assert_eq!(mocks.gateway.last_body().as_deref(), Some(prompts::COMPLETED_HINT));
    }

    #[tokio::test]
    async fn test_sweep_deletes_snapshots_that_were_never_restored() {
        let (manager, mocks) = test_manager(0, chrono::Duration::minutes(30));
        let now = chrono::Utc::now();
        let ancient = Session::new("ancient", now - chrono::Duration::hours(2));
        mocks.persistence.save_session(&ancient).await.unwrap();
        let recent = Session::new("recent", now - chrono::Duration::minutes(5));
        mocks.persistence.save_session(&recent).await.unwrap();

        // Nothing is in memory, so only the snapshot table has stale rows
        assert_eq!(manager.sweep_expired(now).await, 0);
        assert!(mocks.persistence.saved("ancient").is_none());
        assert!(mocks.persistence.saved("recent").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_and_dispatch_keep_one_runtime_per_identifier() {
        let (manager, mocks) = test_manager(0, chrono::Duration::milliseconds(20));
        for round in 0..20 {
            let id = format!("racer-{round}");
            manager.dispatch(inbound_text(&id, "hi")).await.unwrap();
            assert!(wait_for_state(&mocks.store, &id, &SessionState::AwaitingCategory, Duration::from_secs(2)).await);
            tokio::time::sleep(Duration::from_millis(40)).await;

            let sweeper = {
                let manager = manager.clone();
                tokio::spawn(async move { manager.sweep_expired(chrono::Utc::now()).await })
            };
            let dispatched = manager.dispatch(inbound_text(&id, "home")).await.unwrap();
            sweeper.await.unwrap();

            // Whichever side won, the event sits on a runtime the manager
            // still tracks, so the next event cannot start a second one
            assert_eq!(dispatched, Dispatch::Queued);
            assert!(manager.has_runtime(&id).await, "round {round}");
        }
    }
}
