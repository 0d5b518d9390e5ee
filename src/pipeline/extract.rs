//! Model interaction: one multimodal request per submission.
//!
//! [`ExtractionClient`] owns the policy (input checks, timeout, empty-reply
//! handling); a [`MultimodalModel`] owns the wire format. Two backends ship
//! with the crate:
//!
//! * [`crate::pipeline::gemini::GeminiModel`]: Gemini REST API, the default.
//! * [`crate::pipeline::provider::LlmProviderModel`]: any edgequake-llm
//!   vision provider (OpenAI, Anthropic, Ollama, ...).
//!
//! There is no retry loop. A failed call is terminal for the submission and
//! the error goes straight back to the caller.

use crate::config::ExtractionConfig;
use crate::error::InvoxtError;
use crate::pipeline::encode::EncodedPage;
use crate::pipeline::gemini::GeminiModel;
use crate::pipeline::provider::LlmProviderModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything sent to the model in one call.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub instruction_prompt: String,
    pub pages: Vec<EncodedPage>,
    pub user_query: String,
}

/// Raw reply from a backend.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Successful extraction. `raw_text` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub raw_text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// A hosted multimodal model.
///
/// Implementations translate an [`ExtractionRequest`] into exactly one
/// network call and map failures onto
/// [`InvoxtError::AuthenticationError`] / [`InvoxtError::UpstreamError`].
#[async_trait]
pub trait MultimodalModel: Send + Sync {
    /// Provider name used in logs and error messages.
    fn provider(&self) -> &str;

    async fn generate(&self, request: &ExtractionRequest) -> Result<ModelReply, InvoxtError>;
}

/// Sends pages plus a question to the configured model.
#[derive(Clone)]
pub struct ExtractionClient {
    model: Arc<dyn MultimodalModel>,
    timeout: Duration,
}

impl std::fmt::Debug for ExtractionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionClient")
            .field("provider", &self.model.provider())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ExtractionClient {
    /// Build a client from configuration, most specific backend first:
    ///
    /// 1. a pre-built edgequake-llm provider (`config.provider`)
    /// 2. a named non-Gemini provider (`config.provider_name`), created via
    ///    edgequake-llm's `ProviderFactory`
    /// 3. the built-in Gemini client, which requires `config.api_key`
    pub fn new(config: &ExtractionConfig) -> Result<Self, InvoxtError> {
        let model: Arc<dyn MultimodalModel> = if let Some(ref provider) = config.provider {
            Arc::new(LlmProviderModel::new(Arc::clone(provider), config))
        } else if config.provider_label() != "gemini" {
            Arc::new(LlmProviderModel::from_name(
                config.provider_label(),
                &config.model,
                config,
            )?)
        } else {
            Arc::new(GeminiModel::new(config)?)
        };
        info!("Extraction backend: {} ({})", model.provider(), config.model);
        Ok(Self::with_model(model, config.timeout_secs))
    }

    /// Build a client around any backend.
    pub fn with_model(model: Arc<dyn MultimodalModel>, timeout_secs: u64) -> Self {
        Self {
            model,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn provider(&self) -> &str {
        self.model.provider()
    }

    /// Ask `query` about `pages`, prefixed by the instruction `prompt`.
    ///
    /// # Errors
    /// - [`InvoxtError::EmptyInput`] when `pages` is empty (checked before any I/O)
    /// - [`InvoxtError::AuthenticationError`] when the backend rejects the credential
    /// - [`InvoxtError::UpstreamError`] on transport failure, timeout, or an
    ///   empty reply
    pub async fn extract(
        &self,
        prompt: &str,
        pages: Vec<EncodedPage>,
        query: &str,
    ) -> Result<ExtractionResult, InvoxtError> {
        if pages.is_empty() {
            return Err(InvoxtError::empty("at least one page is required for extraction"));
        }

        let request = ExtractionRequest {
            instruction_prompt: prompt.to_string(),
            pages,
            user_query: query.to_string(),
        };
        let provider = self.model.provider().to_string();
        debug!(
            "Sending {} page(s) to '{}' ({} payload bytes)",
            request.pages.len(),
            provider,
            request.pages.iter().map(|p| p.payload.len()).sum::<usize>()
        );

        let start = Instant::now();
        let reply = match tokio::time::timeout(self.timeout, self.model.generate(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Model call timed out after {}s", self.timeout.as_secs());
                return Err(InvoxtError::upstream(
                    provider,
                    format!("call timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };
        let duration = start.elapsed();

        if reply.text.trim().is_empty() {
            return Err(InvoxtError::upstream(provider, "model returned an empty reply"));
        }

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            reply.input_tokens, reply.output_tokens, duration
        );

        Ok(ExtractionResult {
            raw_text: reply.text,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            duration_ms: duration.as_millis() as u64,
        })
    }
}
