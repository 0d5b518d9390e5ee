//! edgequake-llm backend for non-Gemini vision providers.
//!
//! The request becomes two chat messages: the instruction prompt as the
//! system message, then one user message carrying the query text with every
//! page attached as an image.

use crate::config::ExtractionConfig;
use crate::error::InvoxtError;
use crate::pipeline::extract::{ExtractionRequest, ModelReply, MultimodalModel};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Adapter from an edgequake-llm provider to [`MultimodalModel`].
pub struct LlmProviderModel {
    provider: Arc<dyn LLMProvider>,
    name: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl LlmProviderModel {
    /// Wrap a pre-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            name: config.provider_label().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        }
    }

    /// Instantiate a named provider. The provider's own API key variable
    /// (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, ...) is read by the factory.
    ///
    /// # Errors
    /// An unknown provider name or a missing key variable is
    /// [`InvoxtError::InvalidConfig`]; a rejected credential is
    /// [`InvoxtError::AuthenticationError`].
    pub fn from_name(
        provider_name: &str,
        model: &str,
        config: &ExtractionConfig,
    ) -> Result<Self, InvoxtError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model)
            .map_err(|e| classify_factory_error(provider_name, e))?;
        Ok(Self {
            provider,
            name: provider_name.to_string(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        })
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        }
    }
}

/// Build the two-message conversation for a request.
pub(crate) fn build_messages(request: &ExtractionRequest) -> Vec<ChatMessage> {
    let images: Vec<_> = request.pages.iter().map(|p| p.to_image_data()).collect();
    vec![
        ChatMessage::system(request.instruction_prompt.as_str()),
        ChatMessage::user_with_images(request.user_query.as_str(), images),
    ]
}

#[async_trait]
impl MultimodalModel for LlmProviderModel {
    fn provider(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ExtractionRequest) -> Result<ModelReply, InvoxtError> {
        let messages = build_messages(request);
        let options = self.options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&self.name, e))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );

        Ok(ModelReply {
            text: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

/// Map a failed chat call onto the error taxonomy. Only an explicit
/// authentication failure from the provider counts as one.
pub(crate) fn classify_provider_error(provider: &str, error: LlmError) -> InvoxtError {
    match error {
        LlmError::AuthError(detail) => InvoxtError::AuthenticationError {
            provider: provider.to_string(),
            detail,
        },
        LlmError::RateLimited(msg) => InvoxtError::upstream(provider, format!("rate limited: {msg}")),
        other => InvoxtError::upstream(provider, other.to_string()),
    }
}

/// Map a provider construction failure. The factory reports unknown names and
/// missing key variables as configuration errors.
pub(crate) fn classify_factory_error(provider: &str, error: LlmError) -> InvoxtError {
    match error {
        LlmError::AuthError(detail) => InvoxtError::AuthenticationError {
            provider: provider.to_string(),
            detail,
        },
        other => InvoxtError::InvalidConfig(format!("provider '{provider}': {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::EncodedPage;

    #[test]
    fn messages_carry_prompt_query_and_images() {
        let request = ExtractionRequest {
            instruction_prompt: "You read invoices.".into(),
            pages: vec![
                EncodedPage {
                    mime_type: "image/png".into(),
                    payload: vec![1, 2],
                },
                EncodedPage {
                    mime_type: "image/png".into(),
                    payload: vec![3],
                },
            ],
            user_query: "Who is the vendor?".into(),
        };
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 2);
        assert!(format!("{:?}", messages[0]).contains("You read invoices."));
        let user = format!("{:?}", messages[1]);
        assert!(user.contains("Who is the vendor?"));
        assert!(user.contains("image/png"));
    }

    #[test]
    fn auth_error_is_authentication() {
        assert!(matches!(
            classify_provider_error("openai", LlmError::AuthError("invalid key".into())),
            InvoxtError::AuthenticationError { .. }
        ));
    }

    #[test]
    fn rate_limit_mentioning_api_key_is_upstream() {
        let err = classify_provider_error(
            "openai",
            LlmError::RateLimited(
                "Rate limit reached (HTTP 429) for API key sk-...abc: 60 requests per min".into(),
            ),
        );
        match err {
            InvoxtError::UpstreamError { provider, message } => {
                assert_eq!(provider, "openai");
                assert!(message.contains("rate limited"));
            }
            other => panic!("expected UpstreamError, got {other:?}"),
        }
    }

    #[test]
    fn server_error_with_401_in_request_id_is_upstream() {
        assert!(matches!(
            classify_provider_error(
                "openai",
                LlmError::ApiError("HTTP 500: internal error, request id req_94013abc".into())
            ),
            InvoxtError::UpstreamError { .. }
        ));
        assert!(matches!(
            classify_provider_error("openai", LlmError::Timeout),
            InvoxtError::UpstreamError { .. }
        ));
        assert!(matches!(
            classify_provider_error("openai", LlmError::NetworkError("reset".into())),
            InvoxtError::UpstreamError { .. }
        ));
    }

    #[test]
    fn factory_config_failure_is_invalid_config() {
        let err = classify_factory_error(
            "nosuch",
            LlmError::ConfigError("Unknown LLM provider: nosuch".into()),
        );
        match err {
            InvoxtError::InvalidConfig(msg) => assert!(msg.contains("nosuch")),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn unknown_provider_name_is_invalid_config() {
        let config = ExtractionConfig::default();
        let err = LlmProviderModel::from_name("definitely-not-a-provider", "m", &config)
            .err()
            .expect("unknown provider must fail");
        assert!(matches!(err, InvoxtError::InvalidConfig(_)), "got {err:?}");
    }
}
