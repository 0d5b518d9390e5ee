//! Error types for the invoxt library.
//!
//! Every variant of [`InvoxtError`] is terminal for the submission that
//! produced it: nothing in the pipeline retries internally. The caller (the
//! CLI, or whatever presentation layer embeds the library) decides how to
//! surface the message.
//!
//! Advisory findings about a model reply are *not* errors. They are
//! [`crate::pipeline::validate::ValidationIssue`]s and always travel alongside
//! a successful result.

use thiserror::Error;

/// All errors returned by the invoxt library.
#[derive(Debug, Error)]
pub enum InvoxtError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload is neither a PDF nor a supported raster image.
    #[error("Unsupported file type '{mime_type}'\nAccepted types: application/pdf, image/jpeg, image/png.")]
    UnsupportedFormat { mime_type: String },

    /// A raster upload claimed a supported type but its bytes did not decode.
    #[error("Image could not be decoded: {detail}")]
    ImageDecodeFailed { detail: String },

    /// Nothing to work on: no documents, no selected pages, or no encoded pages.
    #[error("Nothing to submit: {what}")]
    EmptyInput { what: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF rasterizer failed, could not be loaded, or produced no pages.
    #[error("PDF rasterization failed: {detail}")]
    RasterizationFailed { detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// No usable credential, or the service rejected the one we sent.
    #[error("Authentication error for model provider '{provider}': {detail}{}", auth_hint(.provider))]
    AuthenticationError { provider: String, detail: String },

    /// Transport or service failure: network, rate limit, timeout, bad reply.
    #[error("Model provider '{provider}' failed: {message}")]
    UpstreamError { provider: String, message: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where to look for the credential, per provider.
fn auth_hint(provider: &str) -> String {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" => "\nSet GOOGLE_API_KEY or pass --api-key.".to_string(),
        "custom" | "ollama" | "lmstudio" | "mock" => String::new(),
        other => format!("\nSet {}_API_KEY.", other.to_ascii_uppercase()),
    }
}

impl InvoxtError {
    pub(crate) fn empty(what: impl Into<String>) -> Self {
        InvoxtError::EmptyInput { what: what.into() }
    }

    pub(crate) fn rasterization(detail: impl Into<String>) -> Self {
        InvoxtError::RasterizationFailed {
            detail: detail.into(),
        }
    }

    pub(crate) fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        InvoxtError::UpstreamError {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_names_the_type() {
        let e = InvoxtError::UnsupportedFormat {
            mime_type: "text/plain".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("text/plain"), "got: {msg}");
        assert!(msg.contains("image/png"));
    }

    #[test]
    fn upstream_display() {
        let e = InvoxtError::upstream("gemini", "HTTP 429: quota exceeded");
        assert!(e.to_string().contains("gemini"));
        assert!(e.to_string().contains("429"));
    }

    #[test]
    fn auth_error_display() {
        let e = InvoxtError::AuthenticationError {
            provider: "gemini".into(),
            detail: "no API key configured".into(),
        };
        assert!(e.to_string().contains("gemini"));
        assert!(e.to_string().contains("no API key configured"));
        assert!(e.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn auth_hint_follows_provider() {
        let openai = InvoxtError::AuthenticationError {
            provider: "openai".into(),
            detail: "invalid key".into(),
        }
        .to_string();
        assert!(openai.contains("OPENAI_API_KEY"), "got: {openai}");
        assert!(!openai.contains("GOOGLE_API_KEY"));

        let custom = InvoxtError::AuthenticationError {
            provider: "custom".into(),
            detail: "rejected".into(),
        }
        .to_string();
        assert!(!custom.contains("API_KEY"), "got: {custom}");
    }

    #[test]
    fn empty_input_display() {
        let e = InvoxtError::empty("no pages selected");
        assert_eq!(e.to_string(), "Nothing to submit: no pages selected");
    }
}
