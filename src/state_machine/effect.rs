//! Effects produced by state transitions

use super::event::AttachmentRef;
use crate::catalog::{Category, CatalogOption, SubCategory};
use crate::session::{SessionState, UploadRecord};
use serde::Serialize;

/// A selectable option in a button or list prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub key: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<CatalogOption> for ChoiceOption {
    fn from(option: CatalogOption) -> Self {
        Self {
            key: option.key.to_string(),
            label: option.display_name.to_string(),
            description: Some(option.description.to_string()),
        }
    }
}

/// Effects to be executed, in order, after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    // Session store mutations
    SetState(SessionState),
    SetSelection {
        category: Category,
        sub_category: Option<SubCategory>,
    },
    SetRequiredItems(Vec<String>),
    AppendUpload(UploadRecord),
    AdvanceCursor,
    Reset,

    /// Write the session snapshot to durable storage
    PersistSession,

    // Outbound messages
    SendText(String),
    SendChoicePrompt {
        body: String,
        options: Vec<ChoiceOption>,
    },

    /// Download the attachment and store it as `item_name`
    FetchAttachment {
        item_name: String,
        attachment: AttachmentRef,
    },

    /// Package every upload and forward the bundle
    RunTerminalSequence,
}

impl Effect {
    pub fn send_text(text: impl Into<String>) -> Self {
        Effect::SendText(text.into())
    }

    pub fn choice_prompt(body: impl Into<String>, options: impl IntoIterator<Item = ChoiceOption>) -> Self {
        Effect::SendChoicePrompt {
            body: body.into(),
            options: options.into_iter().collect(),
        }
    }

    /// Whether this effect mutates the session store
    #[cfg(test)]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Effect::SetState(_)
                | Effect::SetSelection { .. }
                | Effect::SetRequiredItems(_)
                | Effect::AppendUpload(_)
                | Effect::AdvanceCursor
                | Effect::Reset
        )
    }
}
