//! Terminal Sequence: package, forward, audit, schedule cleanup

use super::traits::{ArchiveHandle, Collaborators, ForwardReceipt, SubmissionSummary};
use crate::db::{SubmissionOutcome, SubmissionRecord};
use crate::scheduler::Scheduler;
use crate::session::Session;
use crate::state_machine::TerminalOutcome;
use chrono::Utc;
use std::time::Duration;

/// Run the one-shot packaging and forwarding for a finished checklist.
/// Never retried; failures come back as `TerminalOutcome::Failed`.
pub(crate) async fn run_terminal_sequence(
    session: &Session,
    collaborators: &Collaborators,
    scheduler: &Scheduler,
    archive_grace: Duration,
) -> TerminalOutcome {
    let Some(category) = session.category else {
        tracing::error!(session_id = %session.id, "Terminal sequence without a category");
        return TerminalOutcome::Failed {
            message: "session has no category".to_string(),
        };
    };

    let summary = SubmissionSummary::new(session, category, Utc::now());
    let outcome = match deliver(session, &summary, collaborators, scheduler, archive_grace).await {
        Ok(receipt) => {
            tracing::info!(
                session_id = %session.id,
                category = %category.key(),
                item_count = summary.item_count,
                skipped = summary.skipped.len(),
                channel = %receipt.channel,
                "Application submitted"
            );
            TerminalOutcome::Forwarded {
                channel: receipt.channel,
                item_count: summary.item_count,
            }
        }
        Err(message) => {
            tracing::error!(
                session_id = %session.id,
                category = %category.key(),
                error = %message,
                "Terminal sequence failed; needs manual follow-up"
            );
            TerminalOutcome::Failed { message }
        }
    };

    let record = audit_record(&summary, &outcome);
    if let Err(e) = collaborators.persistence.record_submission(&record).await {
        tracing::error!(session_id = %session.id, error = %e, "Failed to record submission");
    }

    outcome
}

async fn deliver(
    session: &Session,
    summary: &SubmissionSummary,
    collaborators: &Collaborators,
    scheduler: &Scheduler,
    archive_grace: Duration,
) -> Result<ForwardReceipt, String> {
    let archive = collaborators
        .documents
        .package_uploads(&session.id, summary.category, &session.uploaded_items)
        .await
        .map_err(|e| format!("packaging failed: {e}"))?;

    // The archive is transient whether or not forwarding works
    schedule_discard(collaborators, scheduler, archive.clone(), archive_grace);

    let receipt = collaborators
        .forwarder
        .forward(&archive, summary)
        .await
        .map_err(|e| format!("forwarding failed: {e}"))?;

    if receipt.delivered {
        Ok(receipt)
    } else {
        Err(format!("{} channel did not deliver the submission", receipt.channel))
    }
}

fn schedule_discard(
    collaborators: &Collaborators,
    scheduler: &Scheduler,
    archive: ArchiveHandle,
    grace: Duration,
) {
    let documents = collaborators.documents.clone();
    scheduler.after("archive-cleanup", grace, async move {
        match documents.discard_archive(&archive).await {
            Ok(()) => tracing::debug!(path = %archive.path.display(), "Archive deleted"),
            Err(e) => {
                tracing::warn!(path = %archive.path.display(), error = %e, "Failed to delete archive");
            }
        }
    });
}

fn audit_record(summary: &SubmissionSummary, outcome: &TerminalOutcome) -> SubmissionRecord {
    let (outcome, channel, detail) = match outcome {
        TerminalOutcome::Forwarded { channel, .. } => (
            SubmissionOutcome::Forwarded,
            Some(channel.as_str().to_string()),
            None,
        ),
        TerminalOutcome::Failed { message } => {
            (SubmissionOutcome::Failed, None, Some(message.clone()))
        }
    };

    SubmissionRecord {
        session_id: summary.session_id.clone(),
        category: summary.category.key().to_string(),
        sub_category: summary.sub_category.map(|s| s.key().to_string()),
        item_count: summary.item_count,
        required_count: summary.required_count,
        skipped: summary.skipped.clone(),
        outcome,
        channel,
        detail,
        submitted_at: summary.submitted_at,
    }
}
