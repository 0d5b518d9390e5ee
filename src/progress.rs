//! Progress-callback trait for submission events.
//!
//! Inject an [`Arc<dyn SubmissionProgressCallback>`] via
//! [`crate::submit::InvoicePipeline::with_progress`] to hear about each stage
//! as it happens: a terminal spinner, a log line, a UI status field.
//!
//! # Example
//!
//! ```rust
//! use invoxt::SubmissionProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl SubmissionProgressCallback for PageCounter {
//!     fn on_document_loaded(&self, _index: usize, _total: usize, _name: &str, pages: usize) {
//!         self.pages.fetch_add(pages, Ordering::SeqCst);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the pipeline as a submission progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait SubmissionProgressCallback: Send + Sync {
    /// Called after each upload has been turned into pages.
    ///
    /// # Arguments
    /// * `index`: 0-based position of the upload
    /// * `total_documents`: number of uploads in the submission
    /// * `name`: display name of the upload
    /// * `pages`: pages it produced
    fn on_document_loaded(&self, index: usize, total_documents: usize, name: &str, pages: usize) {
        let _ = (index, total_documents, name, pages);
    }

    /// Called just before the model request is sent.
    fn on_extraction_start(&self, pages: usize) {
        let _ = pages;
    }

    /// Called when the model replied.
    ///
    /// # Arguments
    /// * `reply_len`: byte length of the reply
    /// * `issues`: number of validation warnings raised
    fn on_extraction_complete(&self, reply_len: usize, issues: usize) {
        let _ = (reply_len, issues);
    }

    /// Called when the submission failed at any stage.
    fn on_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SubmissionProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn SubmissionProgressCallback>;
