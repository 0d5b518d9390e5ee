//! CLI binary for invoxt.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `LoaderConfig` / `ExtractionConfig`, submits the files and prints the
//! reply followed by the validation summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use invoxt::config::{API_KEY_ENV, DEFAULT_MODEL, MODEL_ENV};
use invoxt::{
    ExtractionConfig, InvoicePipeline, LoaderConfig, PageSelection, ProgressCallback,
    SubmissionOutput, SubmissionProgressCallback, UploadedDocument,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Shown in place of a warning list when nothing was flagged.
const NO_ISSUES: &str = "No potential issues detected in the extraction.";

/// Shown after the warning list.
const REVIEW_HINT: &str = "Please review the extracted data carefully.";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner that narrates the submission and
/// prints one line per loaded document.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Loading");
        bar.set_message("Rendering uploads…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl SubmissionProgressCallback for CliProgressCallback {
    fn on_document_loaded(&self, index: usize, total_documents: usize, name: &str, pages: usize) {
        self.bar.println(format!(
            "  {} {:>2}/{:<2} {}  {}",
            green("✓"),
            index + 1,
            total_documents,
            name,
            dim(&format!("{pages} page(s)")),
        ));
    }

    fn on_extraction_start(&self, pages: usize) {
        self.bar.set_prefix("Asking");
        self.bar.set_message(format!("sending {pages} page(s) to the model…"));
    }

    fn on_extraction_complete(&self, _reply_len: usize, _issues: usize) {
        self.bar.finish_and_clear();
    }

    fn on_error(&self, _error: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ask about a single invoice
  invoxt -q "What is the total amount due?" invoice.pdf

  # Several uploads in one request (pages keep upload order)
  invoxt -q "List every line item" scan1.jpg scan2.png invoice.pdf

  # Only the first three pages, JSON output
  invoxt --pages 1-3 --json -q "Who issued this invoice?" invoice.pdf

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY     Gemini API key (required for the default backend)
  INVOXT_MODEL       Override the model ID (default: gemini-1.5-pro-002)
  PDFIUM_LIB_PATH    Path to libpdfium or the directory holding it

A .env file in the working directory is loaded before flags are parsed.
"#;

/// Ask questions about invoices using a multimodal LLM.
#[derive(Parser, Debug)]
#[command(
    name = "invoxt",
    version,
    about = "Ask questions about PDF and image invoices using a multimodal LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Invoice files: PDF, JPEG or PNG.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Question to ask about the invoices.
    #[arg(short = 'q', long)]
    query: String,

    /// Page selection over all uploads combined: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "INVOXT_PAGES", default_value = "all")]
    pages: String,

    /// Model ID. Defaults to gemini-1.5-pro-002 for the gemini backend and
    /// is required for any other provider.
    #[arg(long, env = MODEL_ENV)]
    model: Option<String>,

    /// Backend: gemini (built-in) or any edgequake-llm provider name.
    #[arg(long, env = "INVOXT_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Path to libpdfium or the directory that contains it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Rendering DPI for PDF pages (72–400).
    #[arg(long, env = "INVOXT_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "INVOXT_PASSWORD")]
    password: Option<String>,

    /// Model call timeout in seconds.
    #[arg(long, env = "INVOXT_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Sampling temperature.
    #[arg(long, env = "INVOXT_TEMPERATURE")]
    temperature: Option<f32>,

    /// Path to a text file replacing the built-in instruction prompt.
    #[arg(long, env = "INVOXT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Output the full submission (reply, warnings, stats) as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "INVOXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Print only the reply and errors.
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Read uploads ─────────────────────────────────────────────────────
    let mut documents = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        documents.push(read_document(path).await?);
    }

    // ── Build pipeline ───────────────────────────────────────────────────
    let (loader_config, extraction_config) = build_configs(&cli).await?;
    let selection = parse_pages(&cli.pages)?;

    let mut pipeline = InvoicePipeline::new(&loader_config, &extraction_config)
        .context("Failed to set up the model client")?;
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        pipeline = pipeline.with_progress(cb);
    }

    // ── Submit ───────────────────────────────────────────────────────────
    let output = pipeline
        .submit(&cli.query, &documents, &selection)
        .await
        .context("Submission failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    print_reply(&output)?;
    if !cli.quiet {
        print_summary(&output);
    }

    Ok(())
}

/// Read a file and classify it by extension, falling back to its content.
async fn read_document(path: &Path) -> Result<UploadedDocument> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let document = match mime_guess::from_path(path).first() {
        Some(mime) => UploadedDocument::new(name, mime.essence_str(), bytes),
        None => UploadedDocument::sniff(name, bytes),
    };
    document.with_context(|| format!("Cannot use {}", path.display()))
}

/// Map CLI args to the two config structs.
async fn build_configs(cli: &Cli) -> Result<(LoaderConfig, ExtractionConfig)> {
    let mut loader = LoaderConfig::builder().dpi(cli.dpi);
    if let Some(ref lib) = cli.pdfium_lib {
        loader = loader.pdfium_library_path(lib);
    }
    if let Some(ref pwd) = cli.password {
        loader = loader.password(pwd);
    }
    let loader = loader.build().context("Invalid loader configuration")?;

    let model = resolve_model(cli.model.as_deref(), cli.provider.as_deref())?;
    let mut extraction = ExtractionConfig::builder()
        .model(model)
        .timeout_secs(cli.timeout);
    if let Some(ref key) = cli.api_key {
        extraction = extraction.api_key(key);
    }
    if let Some(ref provider) = cli.provider {
        extraction = extraction.provider_name(provider);
    }
    if let Some(t) = cli.temperature {
        extraction = extraction.temperature(t);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        extraction = extraction.system_prompt(prompt);
    }
    let extraction = extraction.build().context("Invalid model configuration")?;

    Ok((loader, extraction))
}

/// The Gemini default model only applies when the backend is Gemini.
fn resolve_model(model: Option<&str>, provider: Option<&str>) -> Result<String> {
    if let Some(m) = model.map(str::trim).filter(|m| !m.is_empty()) {
        return Ok(m.to_string());
    }
    match provider {
        Some(p) if !p.eq_ignore_ascii_case("gemini") => {
            anyhow::bail!("--model is required with --provider {p}")
        }
        _ => Ok(DEFAULT_MODEL.to_string()),
    }
}

fn print_reply(output: &SubmissionOutput) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(output.response.as_bytes())
        .context("Failed to write to stdout")?;
    if !output.response.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

fn print_summary(output: &SubmissionOutput) {
    eprintln!();
    if output.issues.is_empty() {
        eprintln!("{} {}", green("✔"), NO_ISSUES);
    } else {
        eprintln!("{}", bold("Validation warnings:"));
        for warning in output.warnings() {
            eprintln!("  {} {}", yellow("⚠"), warning);
        }
        eprintln!("{} {}", cyan("◆"), REVIEW_HINT);
    }

    let stats = &output.stats;
    eprintln!(
        "   {}  /  {} tokens in  /  {} tokens out  —  {}ms total",
        dim(&format!("{} of {} page(s)", stats.pages_submitted, stats.pages_loaded)),
        dim(&stats.input_tokens.to_string()),
        dim(&stats.output_tokens.to_string()),
        stats.total_duration_ms,
    );
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
