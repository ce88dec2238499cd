//! Immutable configuration shared by every transition

use crate::catalog::Catalog;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What to do when every item was skipped and nothing was uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySubmissionPolicy {
    /// Package an empty archive and forward it with the metadata summary
    #[default]
    Forward,
    /// Complete the session without packaging or forwarding
    Skip,
}

impl EmptySubmissionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "forward" => Some(Self::Forward),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntakeContext {
    pub catalog: Arc<Catalog>,
    pub empty_submission: EmptySubmissionPolicy,
}

impl IntakeContext {
    pub fn new(catalog: Arc<Catalog>, empty_submission: EmptySubmissionPolicy) -> Self {
        Self {
            catalog,
            empty_submission,
        }
    }
}
