//! Events that drive the intake dialogue

use crate::runtime::DeliveryChannel;
use crate::session::UploadRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// Inbound surface
// ============================================================================

/// Transport-independent shape of a message received from a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender_id: String,
    pub kind: InboundKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundKind {
    /// Button or list reply
    SelectionReply,
    Text,
    Attachment,
}

/// Media kind reported by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Document,
    Image,
    Video,
    Audio,
}

/// Opaque handle to media held by the messaging channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    #[serde(rename = "ref")]
    pub reference: String,
    pub kind: AttachmentKind,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Keyword commands available while filling in the checklist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Skip,
    Status,
    Restart,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.trim().to_lowercase();
        let word = lowered.strip_prefix('/').unwrap_or(&lowered).trim();
        match word {
            "skip" | "next" => Some(Command::Skip),
            "status" | "progress" => Some(Command::Status),
            "restart" | "reset" | "start over" | "new" | "new application" => Some(Command::Restart),
            _ => None,
        }
    }
}

// ============================================================================
// State machine events
// ============================================================================

/// Result of a packaging-and-forwarding run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Forwarded {
        channel: DeliveryChannel,
        item_count: usize,
    },
    Failed {
        message: String,
    },
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User events
    SelectionReply { text: String },
    Text { text: String },
    Command(Command),
    Attachment(AttachmentRef),

    // Runtime events
    UploadStored { record: UploadRecord },
    UploadFailed { item_name: String, message: String },
    TerminalFinished { outcome: TerminalOutcome },
    /// Restored snapshot whose submission was cut short by a restart
    ResumeTerminal,
}

impl Event {
    /// Classify an inbound message
    pub fn from_inbound(inbound: InboundEvent) -> Self {
        let InboundEvent {
            kind,
            text,
            attachment,
            ..
        } = inbound;

        if let Some(attachment) = attachment {
            return Event::Attachment(attachment);
        }

        let text = text.unwrap_or_default();
        if let Some(command) = Command::parse(&text) {
            return Event::Command(command);
        }

        match kind {
            InboundKind::SelectionReply => Event::SelectionReply { text },
            InboundKind::Text | InboundKind::Attachment => Event::Text { text },
        }
    }

    /// Whether this event came from the user rather than the runtime
    pub fn is_user_event(&self) -> bool {
        matches!(
            self,
            Event::SelectionReply { .. } | Event::Text { .. } | Event::Command(_) | Event::Attachment(_)
        )
    }

    /// Short label for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::SelectionReply { .. } => "selection_reply",
            Event::Text { .. } => "text",
            Event::Command(_) => "command",
            Event::Attachment(_) => "attachment",
            Event::UploadStored { .. } => "upload_stored",
            Event::UploadFailed { .. } => "upload_failed",
            Event::TerminalFinished { .. } => "terminal_finished",
            Event::ResumeTerminal => "resume_terminal",
        }
    }
}
