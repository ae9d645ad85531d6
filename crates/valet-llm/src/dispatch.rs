use valet_core::error::{Result, ValetError};
use valet_core::types::{ChatRequest, ChatResponse};

use crate::anthropic::AnthropicLlm;
use crate::openai::OpenAiLlm;
use crate::provider::LlmProvider;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Provider selection resolved once from config.
///
/// Groq speaks the OpenAI wire format, so it reuses the OpenAI client
/// with a different base URL.
#[derive(Debug)]
pub enum LlmDispatch {
    OpenAi(OpenAiLlm),
    Anthropic(AnthropicLlm),
}

impl LlmDispatch {
    pub fn from_config(provider: &str, model: &str, api_key: &str, base_url: &str) -> Result<Self> {
        match provider {
            "openai" => Ok(Self::OpenAi(OpenAiLlm::new(
                api_key.to_string(),
                model.to_string(),
            ))),
            "groq" => {
                let url = if base_url.is_empty() {
                    GROQ_BASE_URL.to_string()
                } else {
                    base_url.to_string()
                };
                Ok(Self::OpenAi(OpenAiLlm::with_base_url(
                    api_key.to_string(),
                    model.to_string(),
                    url,
                    "groq",
                )))
            }
            "anthropic" => Ok(Self::Anthropic(AnthropicLlm::new(
                api_key.to_string(),
                model.to_string(),
            ))),
            other => Err(ValetError::Config(format!(
                "unknown llm provider: '{other}'"
            ))),
        }
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        match self {
            Self::OpenAi(p) => p.chat(request).await,
            Self::Anthropic(p) => p.chat(request).await,
        }
    }

    pub fn provider_name(&self) -> &str {
        match self {
            Self::OpenAi(p) => p.name(),
            Self::Anthropic(p) => p.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_providers() {
        assert!(LlmDispatch::from_config("openai", "gpt-4o", "k", "").is_ok());
        assert!(LlmDispatch::from_config("anthropic", "claude", "k", "").is_ok());
        let groq = LlmDispatch::from_config("groq", "llama-3.1-70b-versatile", "k", "").unwrap();
        assert_eq!(groq.provider_name(), "groq");
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let err = LlmDispatch::from_config("cohere", "m", "k", "").unwrap_err();
        assert!(matches!(err, ValetError::Config(_)));
    }
}
