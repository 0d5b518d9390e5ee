//! # invoxt
//!
//! Ask questions about invoices with a multimodal language model.
//!
//! Upload one or more invoices (PDF, JPEG or PNG) and a free-text question
//! such as "What is the total amount due?". Every page is rendered to an
//! image, sent to the model in a single request together with an
//! invoice-expert instruction prompt, and the reply comes back verbatim with
//! a couple of lexical sanity warnings attached.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads + question
//!  │
//!  ├─ 1. Load      PDF → pages via pdfium (spawn_blocking), images decoded as-is
//!  ├─ 2. Select    optional page subset
//!  ├─ 3. Encode    page → PNG + MIME type
//!  ├─ 4. Extract   one multimodal call: prompt, pages, question
//!  └─ 5. Validate  "total" heuristics → advisory warnings
//! ```
//!
//! The warnings are heuristics over the reply text only. They never check the
//! reply against the documents and never block the answer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoxt::{ExtractionConfig, InvoicePipeline, LoaderConfig, PageSelection, UploadedDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GOOGLE_API_KEY once
//!     let pipeline = InvoicePipeline::new(&LoaderConfig::default(), &ExtractionConfig::from_env())?;
//!     let invoice = UploadedDocument::pdf("invoice.pdf", std::fs::read("invoice.pdf")?);
//!
//!     let output = pipeline
//!         .submit("What is the total amount due?", &[invoice], &PageSelection::All)
//!         .await?;
//!     println!("{}", output.response);
//!     for warning in output.warnings() {
//!         eprintln!("⚠ {}", warning);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoxt` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! invoxt = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod submit;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ApiCredential, ExtractionConfig, ExtractionConfigBuilder, LoaderConfig, LoaderConfigBuilder,
    PageSelection,
};
pub use error::InvoxtError;
pub use output::{SubmissionOutput, SubmissionStats};
pub use pipeline::document::{
    DocumentKind, DocumentLoader, PageImage, PdfiumRasterizer, RasterFormat, Rasterizer,
    UploadedDocument,
};
pub use pipeline::encode::{encode_page, EncodedPage};
pub use pipeline::extract::{
    ExtractionClient, ExtractionRequest, ExtractionResult, ModelReply, MultimodalModel,
};
pub use pipeline::gemini::GeminiModel;
pub use pipeline::provider::LlmProviderModel;
pub use pipeline::validate::{reply_shape, validate, ReplyShape, ValidationIssue};
pub use progress::{NoopProgressCallback, ProgressCallback, SubmissionProgressCallback};
pub use submit::InvoicePipeline;
