//! Gemini backend: `models/{model}:generateContent` over HTTPS.
//!
//! The request is a single user turn whose parts are, in order: the
//! instruction prompt, every page as inline PNG data, and the user's query.
//! The credential travels in the `x-goog-api-key` header, never in the URL,
//! so it cannot leak into logged request lines.

use crate::config::{ApiCredential, ExtractionConfig};
use crate::error::InvoxtError;
use crate::pipeline::extract::{ExtractionRequest, ModelReply, MultimodalModel};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PROVIDER: &str = "gemini";

/// Gemini REST client.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: ApiCredential,
    model: String,
    endpoint: String,
    temperature: Option<f32>,
    max_output_tokens: Option<usize>,
}

impl GeminiModel {
    /// Fails with [`InvoxtError::AuthenticationError`] when no credential is configured.
    pub fn new(config: &ExtractionConfig) -> Result<Self, InvoxtError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| InvoxtError::AuthenticationError {
                provider: PROVIDER.to_string(),
                detail: "no API key configured".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InvoxtError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn url(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }

    fn build_body(&self, request: &ExtractionRequest) -> GenerateContentRequest {
        let mut parts = Vec::with_capacity(request.pages.len() + 2);
        parts.push(Part::text(&request.instruction_prompt));
        for page in &request.pages {
            parts.push(Part {
                text: None,
                inline_data: Some(Blob {
                    mime_type: page.mime_type.clone(),
                    data: page.to_base64(),
                }),
            });
        }
        parts.push(Part::text(&request.user_query));

        let generation_config = if self.temperature.is_some() || self.max_output_tokens.is_some() {
            Some(GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            })
        } else {
            None
        };

        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config,
        }
    }
}

#[async_trait]
impl MultimodalModel for GeminiModel {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &ExtractionRequest) -> Result<ModelReply, InvoxtError> {
        let body = self.build_body(request);
        debug!("POST {}", self.url());

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| InvoxtError::upstream(PROVIDER, describe_transport_error(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| InvoxtError::upstream(PROVIDER, format!("reading response: {e}")))?;

        if !status.is_success() {
            return Err(map_error_status(status, &text));
        }

        parse_reply(&text)
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("could not connect: {e}")
    } else {
        e.to_string()
    }
}

/// Map a non-2xx response onto the error taxonomy.
///
/// Gemini reports a bad key as `400 INVALID_ARGUMENT` with "API key not valid"
/// in the message, so that case is authentication too.
pub(crate) fn map_error_status(status: StatusCode, body: &str) -> InvoxtError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    let bad_key = status == StatusCode::BAD_REQUEST && message.to_lowercase().contains("api key");
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || bad_key {
        return InvoxtError::AuthenticationError {
            provider: PROVIDER.to_string(),
            detail: format!("HTTP {}: {}", status.as_u16(), message),
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return InvoxtError::upstream(PROVIDER, format!("rate limited (HTTP 429): {message}"));
    }

    InvoxtError::upstream(PROVIDER, format!("HTTP {}: {}", status.as_u16(), message))
}

/// Pull the text out of a successful response body.
pub(crate) fn parse_reply(body: &str) -> Result<ModelReply, InvoxtError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| InvoxtError::upstream(PROVIDER, format!("malformed response: {e}")))?;

    if let Some(reason) = parsed
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(InvoxtError::upstream(
            PROVIDER,
            format!("request blocked: {reason}"),
        ));
    }

    let candidate = parsed
        .candidates
        .first()
        .ok_or_else(|| InvoxtError::upstream(PROVIDER, "response contained no candidates"))?;

    let text: String = candidate
        .content
        .as_ref()
        .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
        return Err(InvoxtError::upstream(
            PROVIDER,
            format!("candidate had no text (finish reason: {reason})"),
        ));
    }

    let usage = parsed.usage_metadata.unwrap_or_default();
    Ok(ModelReply {
        text,
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
    })
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
}

impl Part {
    fn text(s: &str) -> Self {
        Self {
            text: Some(s.to_string()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
