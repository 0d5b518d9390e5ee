//! Heuristic sanity checks on the model's free-text reply.
//!
//! These are lexical nudges, not a correctness guarantee. Rules run on a
//! lowercased copy of the reply and never modify it:
//!
//! 1. [`ValidationIssue::MissingTotal`]: neither "total amount" nor "total"
//!    appears anywhere.
//! 2. [`ValidationIssue::TotalBeforeLineItems`]: both "total" and
//!    "line item" appear, and the first "total" comes before the first
//!    "line item".
//!
//! Rule 2 is a plain ordering check. It fires on any reply where "total"
//! shows up in an unrelated sentence before "line item" does; that
//! behaviour is kept as-is.
//!
//! Both rules assume a prose reply. [`reply_shape`] tells callers when the
//! model answered with JSON instead, so the assumption can be checked
//! rather than silently degrading.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Advisory finding about a reply. Never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssue {
    MissingTotal,
    TotalBeforeLineItems,
}

impl ValidationIssue {
    /// Human-readable warning text.
    pub fn message(&self) -> &'static str {
        match self {
            ValidationIssue::MissingTotal => "Total amount might be unclear",
            ValidationIssue::TotalBeforeLineItems => {
                "Potential mismatch between total and line items"
            }
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Run every rule, in rule order. At most one issue per rule.
pub fn validate(text: &str) -> Vec<ValidationIssue> {
    let lower = text.to_lowercase();
    let mut issues = Vec::new();

    if !lower.contains("total amount") && !lower.contains("total") {
        issues.push(ValidationIssue::MissingTotal);
    }

    if let (Some(total), Some(line_item)) = (lower.find("total"), lower.find("line item")) {
        if total < line_item {
            issues.push(ValidationIssue::TotalBeforeLineItems);
        }
    }

    issues
}

// ── Reply shape ──────────────────────────────────────────────────────────

/// What the reply looks like, as far as the prose rules are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyShape {
    /// Free text; the rules above apply as intended.
    Prose,
    /// A JSON object or array, bare or inside a ``` fence.
    Structured,
}

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Classify a reply as prose or structured JSON.
pub fn reply_shape(text: &str) -> ReplyShape {
    let trimmed = text.trim();
    let body = RE_FENCED
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    let looks_like_json = (body.starts_with('{') && body.ends_with('}'))
        || (body.starts_with('[') && body.ends_with(']'));
    if looks_like_json && serde_json::from_str::<serde_json::Value>(body).is_ok() {
        ReplyShape::Structured
    } else {
        ReplyShape::Prose
    }
}
