//! User-facing message text

use crate::catalog::Catalog;
use crate::session::Session;
use std::fmt::Write;

pub const WELCOME: &str = "Welcome! I'll help you submit the documents for your loan application.\n\
     What type of loan are you applying for?";

pub const CATEGORY_RETRY: &str =
    "Sorry, I didn't recognise that loan type. Please pick one of the options below.";

pub const SUBCATEGORY_PROMPT: &str = "What is your employment type?";

pub const SUBCATEGORY_RETRY: &str =
    "Sorry, I didn't recognise that employment type. Please pick Salaried or Self-Employed.";

pub const CHOOSE_FROM_LIST: &str = "Please choose an option from the list to continue.";

pub const SESSION_RECOVERED: &str =
    "Something went wrong with your previous session, so let's start again.";

pub const ALREADY_COMPLETE: &str =
    "All your documents have already been received and your application is being submitted.";

pub const COMPLETED_HINT: &str =
    "Your application is complete and under review. Type *restart* to start a new application.";

pub const TERMINAL_FAILED: &str = "We received all your documents but hit an error while submitting them. \
     Our team has been notified and will follow up with you.";

pub const PACKAGING: &str = "Thanks! That's everything. Submitting your application now...";

pub fn submitted(document_count: usize) -> String {
    format!(
        "Your application has been submitted with {document_count} document(s). \
         Our team will review it and get back to you. Type *restart* to start a new application."
    )
}

pub const COMPLETED_WITHOUT_DOCUMENTS: &str = "Your application is complete. No documents were uploaded, \
     so our team will contact you for the missing items. Type *restart* to start a new application.";

/// Checklist shown when collection starts
pub fn checklist(session: &Session, items: &[String]) -> String {
    let category = session
        .category
        .map_or("your loan", |c| c.display_name());
    let mut text = format!("For a {category} you'll need {} document(s):\n", items.len());
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(text, "{}. {item}", i + 1);
    }
    text.push_str("\nSend each document as a file or photo. You can type *skip*, *status* or *restart* at any time.");
    text
}

/// Request for the item at `index` (0-based) of `total`
pub fn item_request(catalog: &Catalog, index: usize, total: usize, item: &str) -> String {
    format!(
        "Document {} of {total}: *{item}*\n{}",
        index + 1,
        catalog.describe(item)
    )
}

pub fn received(item: &str) -> String {
    format!("Received your {item}.")
}

pub fn skipped(item: &str) -> String {
    format!("Skipped {item}.")
}

pub fn upload_hint(item: &str) -> String {
    format!("Please upload your *{item}* as a file or photo, or type *skip*, *status* or *restart*.")
}

pub fn upload_retry(item: &str) -> String {
    format!("Sorry, we couldn't process that file. Please send your *{item}* again.")
}

/// Progress summary while collecting
pub fn progress(session: &Session) -> String {
    let total = session.required_items.len();
    let done = session.cursor.min(total);
    let mut text = format!(
        "Progress: {done} of {total} item(s) handled, {} uploaded.\n",
        session.uploaded_items.len()
    );
    for (i, item) in session.required_items.iter().enumerate() {
        let mark = if session.uploaded_items.iter().any(|u| &u.item_name == item) {
            "received"
        } else if i < session.cursor {
            "skipped"
        } else if i == session.cursor {
            "waiting"
        } else {
            "pending"
        };
        let _ = writeln!(text, "- {item}: {mark}");
    }
    text
}

/// Static summary of a completed application
pub fn completed_status(session: &Session) -> String {
    let category = session.category.map_or("-", |c| c.display_name());
    let sub_category = session.sub_category.map_or("-", |s| s.display_name());
    format!(
        "Your {category} application ({sub_category}) is complete and under review. \
         {} of {} document(s) were uploaded.",
        session.uploaded_items.len(),
        session.required_items.len()
    )
}
