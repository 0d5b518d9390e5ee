//! Offline integration tests for the full submission flow.
//!
//! pdfium and the hosted model are replaced by in-process fakes, so these
//! run everywhere without a network or a pdfium library.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbaImage};
use invoxt::prompts::INVOICE_INSTRUCTION_PROMPT;
use invoxt::{
    DocumentLoader, ExtractionClient, ExtractionRequest, InvoicePipeline, InvoxtError, ModelReply,
    MultimodalModel, PageSelection, Rasterizer, RasterFormat, ReplyShape,
    SubmissionProgressCallback, UploadedDocument, ValidationIssue,
};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Renders `pages` blank pages of increasing width, or fails outright.
struct FakeRasterizer {
    pages: usize,
    fail: bool,
}

impl Rasterizer for FakeRasterizer {
    fn rasterize(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, InvoxtError> {
        if self.fail {
            return Err(InvoxtError::RasterizationFailed {
                detail: "fake pdfium refused".into(),
            });
        }
        Ok((0..self.pages)
            .map(|i| DynamicImage::ImageRgba8(RgbaImage::new(10 + i as u32, 10)))
            .collect())
    }
}

/// Replies with a fixed text and records every request it sees.
struct FakeModel {
    reply: Result<String, String>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl FakeModel {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ExtractionRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("model was called")
    }
}

#[async_trait]
impl MultimodalModel for FakeModel {
    fn provider(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &ExtractionRequest) -> Result<ModelReply, InvoxtError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(text) => Ok(ModelReply {
                text: text.clone(),
                input_tokens: 1200,
                output_tokens: 40,
            }),
            Err(message) => Err(InvoxtError::UpstreamError {
                provider: "fake".into(),
                message: message.clone(),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl SubmissionProgressCallback for RecordingProgress {
    fn on_document_loaded(&self, index: usize, total: usize, name: &str, pages: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("loaded {index}/{total} {name} {pages}"));
    }

    fn on_extraction_start(&self, pages: usize) {
        self.events.lock().unwrap().push(format!("start {pages}"));
    }

    fn on_extraction_complete(&self, _reply_len: usize, issues: usize) {
        self.events.lock().unwrap().push(format!("done {issues}"));
    }

    fn on_error(&self, error: &str) {
        self.events.lock().unwrap().push(format!("error {error}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn invoice_pdf() -> UploadedDocument {
    UploadedDocument::pdf("invoice.pdf", b"%PDF-1.7\n%fake body".to_vec())
}

fn receipt_png() -> UploadedDocument {
    UploadedDocument::image("receipt.png", RasterFormat::Png, png_bytes(4, 3))
}

fn pipeline(pdf_pages: usize, model: Arc<FakeModel>) -> InvoicePipeline {
    let loader = DocumentLoader::with_rasterizer(Arc::new(FakeRasterizer {
        pages: pdf_pages,
        fail: false,
    }));
    InvoicePipeline::from_parts(loader, ExtractionClient::with_model(model, 30))
}

// ── Submission flow ──────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_sends_all_pages_in_one_request() {
    init_tracing();
    let model = FakeModel::replying("Line items: paper x2. Total amount: $40.");
    let pipeline = pipeline(2, model.clone());

    let output = pipeline
        .submit(
            "What is the total amount due?",
            &[invoice_pdf(), receipt_png()],
            &PageSelection::All,
        )
        .await
        .unwrap();

    assert_eq!(model.calls(), 1, "exactly one model call per submission");
    let request = model.last_request();
    assert_eq!(request.instruction_prompt, INVOICE_INSTRUCTION_PROMPT);
    assert_eq!(request.user_query, "What is the total amount due?");
    assert_eq!(request.pages.len(), 3);
    assert!(request.pages.iter().all(|p| p.mime_type == "image/png"));

    assert_eq!(output.response, "Line items: paper x2. Total amount: $40.");
    assert!(output.issues.is_empty());
    assert_eq!(output.reply_shape, ReplyShape::Prose);
    assert_eq!(output.stats.documents, 2);
    assert_eq!(output.stats.pages_loaded, 3);
    assert_eq!(output.stats.pages_submitted, 3);
    assert_eq!(output.stats.input_tokens, 1200);
    assert_eq!(output.stats.output_tokens, 40);
}

#[tokio::test]
async fn reply_is_returned_verbatim_with_warnings() {
    let model = FakeModel::replying("Total: 100, Line Item: paper");
    let output = pipeline(1, model)
        .submit("Summarise", &[invoice_pdf()], &PageSelection::All)
        .await
        .unwrap();

    assert_eq!(output.response, "Total: 100, Line Item: paper");
    assert_eq!(output.issues, vec![ValidationIssue::TotalBeforeLineItems]);
    assert_eq!(
        output.warnings(),
        vec!["Potential mismatch between total and line items".to_string()]
    );
}

#[tokio::test]
async fn reply_without_total_is_flagged() {
    let model = FakeModel::replying("Thank you for your purchase");
    let output = pipeline(1, model)
        .submit("Who is the vendor?", &[receipt_png()], &PageSelection::All)
        .await
        .unwrap();

    assert_eq!(output.issues, vec![ValidationIssue::MissingTotal]);
    assert_eq!(output.warnings(), vec!["Total amount might be unclear".to_string()]);
}

#[tokio::test]
async fn json_reply_is_marked_structured() {
    let model = FakeModel::replying("```json\n{\"total\": 100}\n```");
    let output = pipeline(1, model)
        .submit("Extract as JSON", &[invoice_pdf()], &PageSelection::All)
        .await
        .unwrap();

    assert_eq!(output.reply_shape, ReplyShape::Structured);
    assert!(output.issues.is_empty());
}

#[tokio::test]
async fn custom_instruction_replaces_default() {
    let model = FakeModel::replying("Total: 5");
    pipeline(1, model.clone())
        .instruction("You read receipts.")
        .submit("Total?", &[receipt_png()], &PageSelection::All)
        .await
        .unwrap();

    assert_eq!(model.last_request().instruction_prompt, "You read receipts.");
}

// ── Page selection ───────────────────────────────────────────────────────────

#[tokio::test]
async fn selection_spans_documents_in_upload_order() {
    let model = FakeModel::replying("Total: 1");
    let output = pipeline(3, model.clone())
        .submit(
            "Total?",
            &[invoice_pdf(), receipt_png()],
            &PageSelection::Range(3, 4),
        )
        .await
        .unwrap();

    assert_eq!(output.stats.pages_loaded, 4);
    assert_eq!(output.stats.pages_submitted, 2);
    assert_eq!(model.last_request().pages.len(), 2);
}

#[tokio::test]
async fn selection_matching_nothing_never_calls_model() {
    let model = FakeModel::replying("Total: 1");
    let err = pipeline(2, model.clone())
        .submit("Total?", &[invoice_pdf()], &PageSelection::Single(9))
        .await
        .unwrap_err();

    assert!(matches!(err, InvoxtError::EmptyInput { .. }), "got {err:?}");
    assert_eq!(model.calls(), 0);
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_uploads_is_empty_input() {
    let model = FakeModel::replying("Total: 1");
    let progress = Arc::new(RecordingProgress::default());
    let err = pipeline(1, model.clone())
        .with_progress(progress.clone())
        .submit("Total?", &[], &PageSelection::All)
        .await
        .unwrap_err();

    assert!(matches!(err, InvoxtError::EmptyInput { .. }), "got {err:?}");
    assert_eq!(model.calls(), 0);
    let events = progress.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("error "));
}

#[test]
fn unsupported_mime_type_is_rejected() {
    let err = UploadedDocument::new("anim.gif", "image/gif", b"GIF89a".to_vec()).unwrap_err();
    match err {
        InvoxtError::UnsupportedFormat { mime_type } => assert_eq!(mime_type, "image/gif"),
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[tokio::test]
async fn upstream_failure_propagates_without_retry() {
    let model = FakeModel::failing("HTTP 500: internal");
    let progress = Arc::new(RecordingProgress::default());
    let err = pipeline(1, model.clone())
        .with_progress(progress.clone())
        .submit("Total?", &[invoice_pdf()], &PageSelection::All)
        .await
        .unwrap_err();

    assert!(matches!(err, InvoxtError::UpstreamError { .. }), "got {err:?}");
    assert_eq!(model.calls(), 1);
    let events = progress.events.lock().unwrap();
    assert_eq!(events.last().map(|e| e.starts_with("error ")), Some(true));
}

#[tokio::test]
async fn staged_pdfs_are_removed_on_success_and_failure() {
    let staging = tempfile::tempdir().unwrap();

    let ok_loader = DocumentLoader::with_rasterizer(Arc::new(FakeRasterizer {
        pages: 2,
        fail: false,
    }))
    .staging_dir(staging.path());
    let model = FakeModel::replying("Total: 1");
    InvoicePipeline::from_parts(ok_loader, ExtractionClient::with_model(model, 30))
        .submit("Total?", &[invoice_pdf()], &PageSelection::All)
        .await
        .unwrap();
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);

    let failing_loader = DocumentLoader::with_rasterizer(Arc::new(FakeRasterizer {
        pages: 0,
        fail: true,
    }))
    .staging_dir(staging.path());
    let model = FakeModel::replying("Total: 1");
    let err = InvoicePipeline::from_parts(failing_loader, ExtractionClient::with_model(model.clone(), 30))
        .submit("Total?", &[invoice_pdf()], &PageSelection::All)
        .await
        .unwrap_err();
    assert!(matches!(err, InvoxtError::RasterizationFailed { .. }), "got {err:?}");
    assert_eq!(model.calls(), 0);
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

// ── Progress + sync entry point ──────────────────────────────────────────────

#[tokio::test]
async fn progress_events_follow_stage_order() {
    let progress = Arc::new(RecordingProgress::default());
    pipeline(2, FakeModel::replying("Total: 100, Line Item: paper"))
        .with_progress(progress.clone())
        .submit("Total?", &[invoice_pdf(), receipt_png()], &PageSelection::All)
        .await
        .unwrap();

    let events = progress.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "loaded 0/2 invoice.pdf 2".to_string(),
            "loaded 1/2 receipt.png 1".to_string(),
            "start 3".to_string(),
            "done 1".to_string(),
        ]
    );
}

#[test]
fn submit_sync_runs_without_a_runtime() {
    let output = pipeline(1, FakeModel::replying("Line item: pen. Total: 2"))
        .submit_sync("Total?", &[receipt_png()], &PageSelection::All)
        .unwrap();
    assert_eq!(output.response, "Line item: pen. Total: 2");
    assert!(output.issues.is_empty());
}

#[tokio::test]
async fn output_serialises_to_json() {
    let output = pipeline(1, FakeModel::replying("Total: 100, Line Item: paper"))
        .submit("Total?", &[invoice_pdf()], &PageSelection::All)
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::to_value(&output).unwrap();
    assert_eq!(json["response"], "Total: 100, Line Item: paper");
    assert_eq!(json["issues"][0], "TotalBeforeLineItems");
    assert_eq!(json["reply_shape"], "Prose");
    assert_eq!(json["stats"]["pages_submitted"], 1);
}
