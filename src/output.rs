//! Result types returned by a submission.

use crate::pipeline::validate::{ReplyShape, ValidationIssue};
use serde::{Deserialize, Serialize};

/// Everything the presentation layer needs after a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutput {
    /// The model's reply, exactly as received.
    pub response: String,
    /// Advisory warnings, in rule order.
    pub issues: Vec<ValidationIssue>,
    /// Whether the reply was prose (what the rules expect) or JSON.
    pub reply_shape: ReplyShape,
    pub stats: SubmissionStats,
}

impl SubmissionOutput {
    /// Warning strings in display order.
    pub fn warnings(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.to_string()).collect()
    }
}

/// Counters and timings for one submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionStats {
    pub documents: usize,
    pub pages_loaded: usize,
    pub pages_submitted: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub load_duration_ms: u64,
    pub encode_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub total_duration_ms: u64,
}
