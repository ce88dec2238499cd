//! Pure state transition function
//!
//! Given a session snapshot and an event, decides which store mutations,
//! outbound messages and collaborator calls must happen, in order. No I/O.

use super::context::{EmptySubmissionPolicy, IntakeContext};
use super::effect::{ChoiceOption, Effect};
use super::event::{Command, Event, TerminalOutcome};
use super::prompts;
use crate::session::{Session, SessionState, UploadRecord};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug, Default, PartialEq)]
pub struct TransitionResult {
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("event {event} cannot be handled in state {state}")]
    UnexpectedEvent { state: String, event: &'static str },
}

/// Pure transition function
pub fn transition(
    session: &Session,
    ctx: &IntakeContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (&session.state, event) {
        // ============================================================
        // Recovery and restart
        // ============================================================
        (SessionState::Unrecognized(_), event) if event.is_user_event() => Ok(recover(ctx)),

        (SessionState::Unrecognized(_), event) => Err(unexpected(session, &event)),

        (_, Event::Command(Command::Restart)) => Ok(restart(ctx)),

        // ============================================================
        // Selection phase
        // ============================================================
        (SessionState::Initial, event) if event.is_user_event() => Ok(enter_initial(ctx)),

        (
            SessionState::AwaitingCategory,
            Event::SelectionReply { text } | Event::Text { text },
        ) => Ok(select_category(ctx, &text)),

        (SessionState::AwaitingCategory, Event::Command(_) | Event::Attachment(_)) => {
            Ok(prompt_category(ctx, prompts::CHOOSE_FROM_LIST))
        }

        (
            SessionState::AwaitingSubcategory,
            Event::SelectionReply { text } | Event::Text { text },
        ) => Ok(select_subcategory(session, ctx, &text)),

        (SessionState::AwaitingSubcategory, Event::Command(_) | Event::Attachment(_)) => {
            Ok(prompt_subcategory(ctx, prompts::CHOOSE_FROM_LIST))
        }

        // ============================================================
        // Collection phase
        // ============================================================
        (SessionState::CollectingItems, Event::Attachment(attachment)) => {
            // No current item means the checklist is already done; never
            // start a second upload (and so a second terminal run) here.
            Ok(match session.current_required_item() {
                Some(item) => TransitionResult::new().with_effect(Effect::FetchAttachment {
                    item_name: item.to_string(),
                    attachment,
                }),
                None => already_complete(),
            })
        }

        (SessionState::CollectingItems, Event::UploadStored { record }) => {
            Ok(record_upload(session, ctx, record))
        }

        (SessionState::CollectingItems, Event::UploadFailed { item_name, .. }) => {
            Ok(send(prompts::upload_retry(&item_name)))
        }

        (SessionState::CollectingItems, Event::Command(Command::Skip)) => Ok(skip_item(session, ctx)),

        (SessionState::CollectingItems, Event::Command(Command::Status)) => {
            Ok(send(prompts::progress(session)))
        }

        (
            SessionState::CollectingItems,
            Event::SelectionReply { .. } | Event::Text { .. },
        ) => Ok(match session.current_required_item() {
            Some(item) => send(prompts::upload_hint(item)),
            None => already_complete(),
        }),

        (SessionState::CollectingItems, Event::TerminalFinished { outcome }) => Ok(finish(outcome)),

        (SessionState::CollectingItems, Event::ResumeTerminal) if session.is_complete() => {
            Ok(TransitionResult::new().with_effects(next_step(
                ctx,
                &session.required_items,
                session.cursor,
                session.uploaded_items.len(),
            )))
        }

        // ============================================================
        // Completed
        // ============================================================
        (SessionState::Completed, Event::Command(Command::Status)) => {
            Ok(send(prompts::completed_status(session)))
        }

        (SessionState::Completed, event) if event.is_user_event() => {
            Ok(send(prompts::COMPLETED_HINT))
        }

        (_, event) => Err(unexpected(session, &event)),
    }
}

fn unexpected(session: &Session, event: &Event) -> TransitionError {
    TransitionError::UnexpectedEvent {
        state: session.state.to_string(),
        event: event.name(),
    }
}

fn send(text: impl Into<String>) -> TransitionResult {
    TransitionResult::new().with_effect(Effect::send_text(text))
}

fn already_complete() -> TransitionResult {
    send(prompts::ALREADY_COMPLETE)
}

fn category_options(ctx: &IntakeContext) -> Vec<ChoiceOption> {
    ctx.catalog
        .list_categories()
        .into_iter()
        .map(ChoiceOption::from)
        .collect()
}

fn subcategory_options(ctx: &IntakeContext) -> Vec<ChoiceOption> {
    ctx.catalog
        .list_subcategories()
        .into_iter()
        .map(ChoiceOption::from)
        .collect()
}

fn enter_initial(ctx: &IntakeContext) -> TransitionResult {
    TransitionResult::new()
        .with_effect(Effect::choice_prompt(prompts::WELCOME, category_options(ctx)))
        .with_effect(Effect::SetState(SessionState::AwaitingCategory))
        .with_effect(Effect::PersistSession)
}

fn restart(ctx: &IntakeContext) -> TransitionResult {
    TransitionResult::new()
        .with_effect(Effect::Reset)
        .with_effects(enter_initial(ctx).effects)
}

/// Self-heal a session whose state could not be interpreted
fn recover(ctx: &IntakeContext) -> TransitionResult {
    TransitionResult::new()
        .with_effect(Effect::Reset)
        .with_effect(Effect::send_text(prompts::SESSION_RECOVERED))
        .with_effects(enter_initial(ctx).effects)
}

fn prompt_category(ctx: &IntakeContext, body: &str) -> TransitionResult {
    TransitionResult::new().with_effect(Effect::choice_prompt(body, category_options(ctx)))
}

fn prompt_subcategory(ctx: &IntakeContext, body: &str) -> TransitionResult {
    TransitionResult::new().with_effect(Effect::choice_prompt(body, subcategory_options(ctx)))
}

fn select_category(ctx: &IntakeContext, text: &str) -> TransitionResult {
    match ctx.catalog.normalize_category(text) {
        Some(category) => TransitionResult::new()
            .with_effect(Effect::SetSelection {
                category,
                sub_category: None,
            })
            .with_effect(Effect::SetState(SessionState::AwaitingSubcategory))
            .with_effect(Effect::choice_prompt(
                prompts::SUBCATEGORY_PROMPT,
                subcategory_options(ctx),
            ))
            .with_effect(Effect::PersistSession),
        None => prompt_category(ctx, prompts::CATEGORY_RETRY),
    }
}

fn select_subcategory(session: &Session, ctx: &IntakeContext, text: &str) -> TransitionResult {
    // A sub-category question without a stored category is a corrupt record
    let Some(category) = session.category else {
        return recover(ctx);
    };
    let Some(sub_category) = ctx.catalog.normalize_subcategory(text) else {
        return prompt_subcategory(ctx, prompts::SUBCATEGORY_RETRY);
    };
    let Some(items) = ctx.catalog.required_items(category, sub_category) else {
        return recover(ctx);
    };

    TransitionResult::new()
        .with_effect(Effect::SetSelection {
            category,
            sub_category: Some(sub_category),
        })
        .with_effect(Effect::SetRequiredItems(items.clone()))
        .with_effect(Effect::SetState(SessionState::CollectingItems))
        .with_effect(Effect::send_text(prompts::checklist(session, &items)))
        .with_effects(next_step(ctx, &items, 0, 0))
}

fn record_upload(session: &Session, ctx: &IntakeContext, record: UploadRecord) -> TransitionResult {
    let Some(item) = session.current_required_item() else {
        return already_complete();
    };
    let received = prompts::received(item);

    TransitionResult::new()
        .with_effect(Effect::AppendUpload(record))
        .with_effect(Effect::AdvanceCursor)
        .with_effect(Effect::send_text(received))
        .with_effects(next_step(
            ctx,
            &session.required_items,
            session.cursor + 1,
            session.uploaded_items.len() + 1,
        ))
}

fn skip_item(session: &Session, ctx: &IntakeContext) -> TransitionResult {
    let Some(item) = session.current_required_item() else {
        return already_complete();
    };

    TransitionResult::new()
        .with_effect(Effect::AdvanceCursor)
        .with_effect(Effect::send_text(prompts::skipped(item)))
        .with_effects(next_step(
            ctx,
            &session.required_items,
            session.cursor + 1,
            session.uploaded_items.len(),
        ))
}

/// Ask for the item at `cursor`, or wrap up when the checklist is exhausted
fn next_step(ctx: &IntakeContext, items: &[String], cursor: usize, uploads: usize) -> Vec<Effect> {
    if let Some(item) = items.get(cursor) {
        return vec![
            Effect::send_text(prompts::item_request(&ctx.catalog, cursor, items.len(), item)),
            Effect::PersistSession,
        ];
    }

    if uploads == 0 && ctx.empty_submission == EmptySubmissionPolicy::Skip {
        return vec![
            Effect::SetState(SessionState::Completed),
            Effect::send_text(prompts::COMPLETED_WITHOUT_DOCUMENTS),
            Effect::PersistSession,
        ];
    }

    vec![
        Effect::send_text(prompts::PACKAGING),
        Effect::PersistSession,
        Effect::RunTerminalSequence,
    ]
}

fn finish(outcome: TerminalOutcome) -> TransitionResult {
    let text = match outcome {
        TerminalOutcome::Forwarded { item_count, .. } => prompts::submitted(item_count),
        TerminalOutcome::Failed { .. } => prompts::TERMINAL_FAILED.to_string(),
    };
    TransitionResult::new()
        .with_effect(Effect::SetState(SessionState::Completed))
        .with_effect(Effect::SendText(text))
        .with_effect(Effect::PersistSession)
}

/// Apply the store-mutating effects to a session copy, the way the runtime
/// applies them through the session store
#[cfg(test)]
pub(crate) fn apply_mutations(session: &mut Session, effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::SetState(state) => session.state = state.clone(),
            Effect::SetSelection {
                category,
                sub_category,
            } => {
                session.category = Some(*category);
                session.sub_category = *sub_category;
            }
            Effect::SetRequiredItems(items) => {
                session.required_items.clone_from(items);
                session.cursor = 0;
                session.uploaded_items.clear();
            }
            Effect::AppendUpload(record) => session.uploaded_items.push(record.clone()),
            Effect::AdvanceCursor => session.cursor += 1,
            Effect::Reset => *session = Session::new(session.id.clone(), session.created_at),
            _ => {}
        }
    }
}
