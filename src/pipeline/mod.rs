//! Pipeline stages for invoice question answering.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the external collaborators (pdfium, the hosted model) can be
//! swapped for fakes behind a trait.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ encode ──▶ extract ──▶ validate
//! (pdfium)     (PNG)      (LLM)       (heuristics)
//! ```
//!
//! 1. [`document`]: uploads → ordered page images; PDFs are staged in a
//!    temp file and rasterised on a blocking thread
//! 2. [`encode`]  : page image → PNG bytes + MIME type
//! 3. [`extract`] : one multimodal call with prompt, pages and query; the
//!    only stage with network I/O ([`gemini`] and [`provider`] are its
//!    backends)
//! 4. [`validate`]: substring heuristics over the reply

pub mod document;
pub mod encode;
pub mod extract;
pub mod gemini;
pub mod provider;
pub mod validate;
