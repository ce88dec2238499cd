//! Session runtime executor

use super::terminal::run_terminal_sequence;
use super::traits::Collaborators;
use crate::scheduler::Scheduler;
use crate::session::{SessionStore, UploadRecord};
use crate::state_machine::{transition, AttachmentRef, Effect, Event, IntakeContext};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared pieces every session runtime needs
#[derive(Clone)]
pub struct RuntimeDeps {
    pub store: Arc<SessionStore>,
    pub context: Arc<IntakeContext>,
    pub collaborators: Collaborators,
    pub scheduler: Scheduler,
    pub archive_grace: Duration,
}

/// Serializes event handling for one identifier
pub struct SessionRuntime {
    session_id: String,
    deps: RuntimeDeps,
    event_rx: mpsc::Receiver<Event>,
}

impl SessionRuntime {
    pub fn new(session_id: impl Into<String>, deps: RuntimeDeps, event_rx: mpsc::Receiver<Event>) -> Self {
        Self {
            session_id: session_id.into(),
            deps,
            event_rx,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(session_id = %self.session_id, "Starting session runtime");

        while let Some(event) = self.event_rx.recv().await {
            if let Err(e) = self.process_event(event).await {
                tracing::error!(session_id = %self.session_id, error = %e, "Error handling event");
            }
        }

        tracing::debug!(session_id = %self.session_id, "Session runtime stopped");
    }

    /// Handle one inbound event and every follow-up event it generates
    pub(crate) async fn process_event(&mut self, event: Event) -> Result<(), String> {
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let session = self.deps.store.get(&self.session_id);
            if !session.state.is_known() {
                tracing::warn!(
                    session_id = %self.session_id,
                    state = %session.state,
                    "Unrecognized session state, resetting"
                );
            }

            let event_name = current_event.name();
            let result = transition(&session, &self.deps.context, current_event)
                .map_err(|e| e.to_string())?;

            tracing::debug!(
                session_id = %self.session_id,
                state = %session.state,
                event = event_name,
                effects = result.effects.len(),
                "Transition"
            );

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&self, effect: Effect) -> Option<Event> {
        let id = self.session_id.as_str();
        let store = &self.deps.store;

        match effect {
            Effect::SetState(state) => {
                tracing::info!(session_id = %id, state = %state, "State change");
                store.set_state(id, state);
                None
            }
            Effect::SetSelection {
                category,
                sub_category,
            } => {
                store.set_selection(id, category, sub_category);
                None
            }
            Effect::SetRequiredItems(items) => {
                store.set_required_items(id, items);
                None
            }
            Effect::AppendUpload(record) => {
                store.append_upload(id, record);
                None
            }
            Effect::AdvanceCursor => {
                store.advance_cursor(id);
                None
            }
            Effect::Reset => {
                store.reset(id);
                None
            }

            Effect::PersistSession => {
                if let Some(session) = store.peek(id) {
                    if let Err(e) = self.deps.collaborators.persistence.save_session(&session).await {
                        tracing::error!(session_id = %id, error = %e, "Failed to persist session");
                    }
                }
                None
            }

            Effect::SendText(body) => {
                if let Err(e) = self.deps.collaborators.gateway.send_text(id, &body).await {
                    tracing::warn!(session_id = %id, error = %e, "Failed to send message");
                }
                None
            }
            Effect::SendChoicePrompt { body, options } => {
                if let Err(e) = self
                    .deps
                    .collaborators
                    .gateway
                    .send_choice_prompt(id, &body, &options)
                    .await
                {
                    tracing::warn!(session_id = %id, error = %e, "Failed to send prompt");
                }
                None
            }

            Effect::FetchAttachment {
                item_name,
                attachment,
            } => Some(self.fetch_and_store(item_name, attachment).await),

            Effect::RunTerminalSequence => {
                let session = store.peek(id)?;
                let outcome = run_terminal_sequence(
                    &session,
                    &self.deps.collaborators,
                    &self.deps.scheduler,
                    self.deps.archive_grace,
                )
                .await;
                Some(Event::TerminalFinished { outcome })
            }
        }
    }

    /// Download an attachment and write it into the upload tree
    async fn fetch_and_store(&self, item_name: String, attachment: AttachmentRef) -> Event {
        match self.try_fetch_and_store(&item_name, &attachment).await {
            Ok(record) => {
                tracing::info!(
                    session_id = %self.session_id,
                    item = %item_name,
                    size_bytes = record.size_bytes,
                    "Upload stored"
                );
                Event::UploadStored { record }
            }
            Err(message) => {
                tracing::error!(
                    session_id = %self.session_id,
                    item = %item_name,
                    error = %message,
                    "Upload processing failed"
                );
                Event::UploadFailed { item_name, message }
            }
        }
    }

    async fn try_fetch_and_store(
        &self,
        item_name: &str,
        attachment: &AttachmentRef,
    ) -> Result<UploadRecord, String> {
        let category = self
            .deps
            .store
            .peek(&self.session_id)
            .and_then(|s| s.category)
            .ok_or_else(|| "session has no category".to_string())?;

        let fetched = self
            .deps
            .collaborators
            .gateway
            .fetch_attachment(attachment)
            .await
            .map_err(|e| e.to_string())?;

        let stored = self
            .deps
            .collaborators
            .documents
            .store_upload(&self.session_id, category, item_name, &fetched)
            .await?;

        let source_file_name = attachment
            .file_name
            .clone()
            .or_else(|| fetched.file_name.clone())
            .unwrap_or_else(|| stored.file_name.clone());

        Ok(UploadRecord {
            item_name: item_name.to_string(),
            source_file_name,
            media_kind: attachment.kind,
            mime_type: fetched.mime_type,
            size_bytes: stored.size_bytes,
            uploaded_at: Utc::now(),
            stored_path: stored.path,
        })
    }
}
