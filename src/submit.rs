//! Submission entry points: uploads + question → reply + warnings.
//!
//! One submission runs every stage to completion before returning:
//!
//! ```text
//! load_all ─▶ select ─▶ encode_pages ─▶ extract ─▶ validate
//! ```
//!
//! Nothing is shared between submissions except the read-only configuration
//! held by [`InvoicePipeline`], so one pipeline can serve concurrent callers.

use crate::config::{ExtractionConfig, LoaderConfig, PageSelection};
use crate::error::InvoxtError;
use crate::output::{SubmissionOutput, SubmissionStats};
use crate::pipeline::document::{DocumentLoader, PageImage, UploadedDocument};
use crate::pipeline::encode;
use crate::pipeline::extract::ExtractionClient;
use crate::pipeline::validate::{self, ReplyShape};
use crate::progress::ProgressCallback;
use crate::prompts::instruction_prompt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A configured loader + model client.
#[derive(Clone)]
pub struct InvoicePipeline {
    loader: DocumentLoader,
    client: ExtractionClient,
    instruction: String,
    progress: Option<ProgressCallback>,
}

impl InvoicePipeline {
    /// Build from configuration. Fails with
    /// [`InvoxtError::AuthenticationError`] when the model has no credential.
    pub fn new(
        loader_config: &LoaderConfig,
        extraction_config: &ExtractionConfig,
    ) -> Result<Self, InvoxtError> {
        let loader = DocumentLoader::new(loader_config);
        let client = ExtractionClient::new(extraction_config)?;
        Ok(Self::from_parts(loader, client)
            .instruction(instruction_prompt(extraction_config.system_prompt.as_deref())))
    }

    /// Assemble from already-built stages (fake collaborators in tests).
    pub fn from_parts(loader: DocumentLoader, client: ExtractionClient) -> Self {
        Self {
            loader,
            client,
            instruction: instruction_prompt(None).to_string(),
            progress: None,
        }
    }

    /// Replace the instruction prompt sent ahead of the pages.
    pub fn instruction(mut self, prompt: impl Into<String>) -> Self {
        self.instruction = prompt.into();
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Load `documents` without submitting, e.g. to preview pages.
    pub async fn load(&self, documents: &[UploadedDocument]) -> Result<Vec<PageImage>, InvoxtError> {
        self.loader.load_all(documents).await
    }

    /// Ask `query` about the selected pages of `documents`.
    ///
    /// # Errors
    /// Any [`InvoxtError`] from a stage ends the submission. Validation
    /// warnings are never errors; they come back in
    /// [`SubmissionOutput::issues`].
    pub async fn submit(
        &self,
        query: &str,
        documents: &[UploadedDocument],
        selection: &PageSelection,
    ) -> Result<SubmissionOutput, InvoxtError> {
        let result = self.run(query, documents, selection).await;
        if let (Err(e), Some(cb)) = (&result, &self.progress) {
            cb.on_error(&e.to_string());
        }
        result
    }

    /// Synchronous wrapper around [`InvoicePipeline::submit`].
    ///
    /// Creates a temporary tokio runtime internally.
    ///
    /// # Panics
    /// Panics when called from within an async runtime (tokio refuses to
    /// block a runtime thread). Use [`InvoicePipeline::submit`] from async code.
    pub fn submit_sync(
        &self,
        query: &str,
        documents: &[UploadedDocument],
        selection: &PageSelection,
    ) -> Result<SubmissionOutput, InvoxtError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| InvoxtError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.submit(query, documents, selection))
    }

    async fn run(
        &self,
        query: &str,
        documents: &[UploadedDocument],
        selection: &PageSelection,
    ) -> Result<SubmissionOutput, InvoxtError> {
        let total_start = Instant::now();
        info!("Starting submission: {} document(s)", documents.len());

        if documents.is_empty() {
            return Err(InvoxtError::empty(
                "upload at least one PDF or image before submitting",
            ));
        }

        // ── Step 1: Load pages ───────────────────────────────────────────
        let load_start = Instant::now();
        let mut pages = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            let loaded = self.loader.load_indexed(document, index).await?;
            if let Some(ref cb) = self.progress {
                cb.on_document_loaded(index, documents.len(), &document.name, loaded.len());
            }
            pages.extend(loaded);
        }
        let load_duration_ms = load_start.elapsed().as_millis() as u64;
        let pages_loaded = pages.len();
        info!("Loaded {} page(s) in {}ms", pages_loaded, load_duration_ms);

        // ── Step 2: Apply page selection ─────────────────────────────────
        let selected = select_pages(pages, selection);
        if selected.is_empty() {
            return Err(InvoxtError::empty(format!(
                "page selection {:?} matches none of the {} loaded page(s)",
                selection, pages_loaded
            )));
        }
        debug!("Selected {} of {} page(s)", selected.len(), pages_loaded);
        let pages_submitted = selected.len();

        // ── Step 3: Encode ───────────────────────────────────────────────
        let encode_start = Instant::now();
        let encoded = encode::encode_pages(selected).await?;
        let encode_duration_ms = encode_start.elapsed().as_millis() as u64;

        // ── Step 4: Ask the model ────────────────────────────────────────
        if let Some(ref cb) = self.progress {
            cb.on_extraction_start(pages_submitted);
        }
        let result = self.client.extract(&self.instruction, encoded, query).await?;

        // ── Step 5: Validate ─────────────────────────────────────────────
        let issues = validate::validate(&result.raw_text);
        let reply_shape = validate::reply_shape(&result.raw_text);
        if reply_shape == ReplyShape::Structured {
            warn!("Model replied with JSON; the prose heuristics may not apply");
        }
        if let Some(ref cb) = self.progress {
            cb.on_extraction_complete(result.raw_text.len(), issues.len());
        }

        let stats = SubmissionStats {
            documents: documents.len(),
            pages_loaded,
            pages_submitted,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            load_duration_ms,
            encode_duration_ms,
            extract_duration_ms: result.duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Submission complete: {} page(s), {} warning(s), {}ms total",
            pages_submitted,
            issues.len(),
            stats.total_duration_ms
        );

        Ok(SubmissionOutput {
            response: result.raw_text,
            issues,
            reply_shape,
            stats,
        })
    }
}

/// Keep only the selected pages, preserving document-then-page order.
fn select_pages(pages: Vec<PageImage>, selection: &PageSelection) -> Vec<PageImage> {
    let keep = selection.to_indices(pages.len());
    let mut keep = keep.into_iter().peekable();
    pages
        .into_iter()
        .enumerate()
        .filter_map(|(i, page)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(page)
            } else {
                None
            }
        })
        .collect()
}
