//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::catalog::{Category, SubCategory};
use crate::db::{Database, SubmissionRecord};
use crate::gateway::GatewayError;
use crate::session::{Session, UploadRecord};
use crate::state_machine::{AttachmentRef, ChoiceOption};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Media downloaded from the messaging channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAttachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// File name reported by the channel, if any
    pub file_name: Option<String>,
}

/// Messaging channel used to talk to users
#[async_trait]
pub trait OutboundGateway: Send + Sync {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), GatewayError>;

    /// Send a prompt with selectable options (buttons or a list)
    async fn send_choice_prompt(
        &self,
        recipient: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError>;

    /// Download the media behind an attachment reference
    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<FetchedAttachment, GatewayError>;
}

/// A file written to the upload tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

/// A packaged bundle ready for forwarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveHandle {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub item_count: usize,
}

/// File tree holding uploads and archives
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn store_upload(
        &self,
        session_id: &str,
        category: Category,
        item_name: &str,
        attachment: &FetchedAttachment,
    ) -> Result<StoredUpload, String>;

    /// Package every upload into one archive. An empty upload list yields
    /// a valid archive holding only the manifest.
    async fn package_uploads(
        &self,
        session_id: &str,
        category: Category,
        uploads: &[UploadRecord],
    ) -> Result<ArchiveHandle, String>;

    async fn discard_archive(&self, archive: &ArchiveHandle) -> Result<(), String>;
}

/// How a submission reached the back office
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Direct,
    /// No transport configured; the submission was only logged
    Simulated,
}

impl DeliveryChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryChannel::Direct => "direct",
            DeliveryChannel::Simulated => "simulated",
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardReceipt {
    pub delivered: bool,
    pub channel: DeliveryChannel,
}

/// Per-item line of the metadata summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryItem {
    pub item_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Structured metadata forwarded alongside the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionSummary {
    pub session_id: String,
    pub category: Category,
    pub sub_category: Option<SubCategory>,
    pub required_count: usize,
    pub item_count: usize,
    pub items: Vec<SummaryItem>,
    pub skipped: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionSummary {
    pub fn new(session: &Session, category: Category, submitted_at: DateTime<Utc>) -> Self {
        let items: Vec<SummaryItem> = session
            .uploaded_items
            .iter()
            .map(|u| SummaryItem {
                item_name: u.item_name.clone(),
                file_name: u.source_file_name.clone(),
                mime_type: u.mime_type.clone(),
                size_bytes: u.size_bytes,
            })
            .collect();

        Self {
            session_id: session.id.clone(),
            category,
            sub_category: session.sub_category,
            required_count: session.required_items.len(),
            item_count: items.len(),
            items,
            skipped: session.skipped_items().into_iter().map(String::from).collect(),
            submitted_at,
        }
    }
}

/// Back-office delivery of a completed application
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        archive: &ArchiveHandle,
        summary: &SubmissionSummary,
    ) -> Result<ForwardReceipt, String>;
}

/// Durable storage for session snapshots and the submission log
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn save_session(&self, session: &Session) -> Result<(), String>;

    /// Drop snapshots idle since before `cutoff`; returns how many went away
    async fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize, String>;

    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), String>;
}

/// Every collaborator a session runtime talks to
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn OutboundGateway>,
    pub documents: Arc<dyn DocumentStore>,
    pub forwarder: Arc<dyn Forwarder>,
    pub persistence: Arc<dyn SessionPersistence>,
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as `SessionPersistence`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionPersistence for DatabaseStorage {
    async fn save_session(&self, session: &Session) -> Result<(), String> {
        self.db.save_session(session).map_err(|e| e.to_string())
    }

    async fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize, String> {
        self.db
            .delete_sessions_before(cutoff)
            .map_err(|e| e.to_string())
    }

    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), String> {
        self.db
            .record_submission(record)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
