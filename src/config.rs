//! Configuration types for invoice extraction.
//!
//! Two structs cover the two collaborators the pipeline talks to:
//!
//! * [`LoaderConfig`]: how PDFs are rasterised (resolution, pixel cap, and
//!   where the pdfium library lives).
//! * [`ExtractionConfig`]: which hosted model to call and with what
//!   credential, timeout and sampling options.
//!
//! The model credential is read once (see [`ExtractionConfig::from_env`]) and
//! then carried in the struct. Nothing downstream consults the process
//! environment, so tests can inject fake credentials freely.

use crate::error::InvoxtError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default Gemini model, matching the hosted model the tool was built around.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro-002";

/// Base URL of the Gemini REST API.
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Environment variable overriding the model id.
pub const MODEL_ENV: &str = "INVOXT_MODEL";

// ── Loader ───────────────────────────────────────────────────────────────

/// Configuration for turning uploads into page images.
///
/// # Example
/// ```rust
/// use invoxt::LoaderConfig;
///
/// let config = LoaderConfig::builder()
///     .dpi(150)
///     .pdfium_library_path("/opt/pdfium/lib")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// Applied after the DPI scale, so an oversized page shrinks
    /// proportionally instead of exhausting memory.
    pub max_rendered_pixels: u32,

    /// Location of the pdfium shared library: either the library file itself
    /// or the directory that contains it. `None` binds the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 4000,
            pdfium_library_path: None,
            password: None,
        }
    }
}

impl LoaderConfig {
    /// Create a new builder for `LoaderConfig`.
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`LoaderConfig`].
#[derive(Debug)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LoaderConfig, InvoxtError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(InvoxtError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// An API key that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential(String);

impl ApiCredential {
    /// Wrap a key. Blank keys are rejected so "set but empty" env vars
    /// behave like missing ones.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(<redacted>)")
    }
}

/// Configuration for the model call.
///
/// Built via [`ExtractionConfig::builder()`], [`ExtractionConfig::from_env()`]
/// or [`ExtractionConfig::default()`] (which has no credential and will
/// therefore fail with an authentication error for the Gemini backend).
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Credential for the Gemini backend.
    pub api_key: Option<ApiCredential>,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Provider name for non-Gemini backends routed through edgequake-llm
    /// (e.g. "openai", "anthropic", "ollama"). `None` or "gemini" selects the
    /// built-in Gemini client.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Gemini REST base URL. Default: [`DEFAULT_GEMINI_ENDPOINT`].
    pub endpoint: String,

    /// Sampling temperature. `None` leaves the provider default in place.
    pub temperature: Option<f32>,

    /// Cap on generated tokens. `None` leaves the provider default in place.
    pub max_output_tokens: Option<usize>,

    /// Timeout for the single model call, in seconds. Default: 120.
    /// Expiry is reported as an upstream error.
    pub timeout_secs: u64,

    /// Replacement for the built-in invoice instruction prompt.
    pub system_prompt: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            temperature: None,
            max_output_tokens: None,
            timeout_secs: 120,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("system_prompt", &self.system_prompt.as_ref().map(|s| s.len()))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the credential and optional model override from the process
    /// environment. Call once at startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = std::env::var(API_KEY_ENV).ok().and_then(ApiCredential::new);
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        config
    }

    /// Name of the backend this config resolves to, for logs and errors.
    pub fn provider_label(&self) -> &str {
        if self.provider.is_some() {
            return "custom";
        }
        match self.provider_name.as_deref() {
            Some(name) if !name.eq_ignore_ascii_case("gemini") => name,
            _ => "gemini",
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = ApiCredential::new(key);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = Some(n);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// A missing credential is *not* a build error: it surfaces as
    /// [`InvoxtError::AuthenticationError`] when the client is created.
    pub fn build(self) -> Result<ExtractionConfig, InvoxtError> {
        let c = &self.config;
        if c.timeout_secs == 0 {
            return Err(InvoxtError::InvalidConfig(
                "Timeout must be ≥ 1 second".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(InvoxtError::InvalidConfig("Model id must not be empty".into()));
        }
        if !(c.endpoint.starts_with("http://") || c.endpoint.starts_with("https://")) {
            return Err(InvoxtError::InvalidConfig(format!(
                "Endpoint must be an HTTP/HTTPS URL, got '{}'",
                c.endpoint
            )));
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Which loaded pages to submit to the model.
///
/// Page numbers are 1-indexed over the combined sequence of every uploaded
/// document, in document-then-page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Submit every page (default).
    #[default]
    All,
    /// Submit a single page (1-indexed).
    Single(usize),
    /// Submit a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Submit specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
