use reqwest::Client;
use serde_json::json;
use valet_core::error::{Result, ValetError};
use valet_core::types::{ChatRequest, ChatResponse, Usage};

use crate::provider::LlmProvider;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat completion provider.
///
/// Also serves Groq and other OpenAI-compatible APIs via `with_base_url`.
#[derive(Debug)]
pub struct OpenAiLlm {
    client: Client,
    api_key: String,
    model: String,
    chat_url: String,
    name: &'static str,
}

impl OpenAiLlm {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            chat_url: OPENAI_CHAT_URL.to_string(),
            name: "openai",
        }
    }

    /// OpenAI-compatible provider at a different endpoint.
    /// `base_url` is the API root, e.g. "https://api.groq.com/openai/v1".
    pub fn with_base_url(api_key: String, model: String, base_url: String, name: &'static str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            chat_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            name,
        }
    }
}

impl LlmProvider for OpenAiLlm {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });

        if let Some(max_tokens) = request.max_tokens {
            body.as_object_mut()
                .unwrap()
                .insert("max_tokens".to_string(), json!(max_tokens));
        }

        if let Some(temp) = request.temperature {
            body.as_object_mut()
                .unwrap()
                .insert("temperature".to_string(), json!(temp));
        }

        let response = self
            .client
            .post(&self.chat_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ValetError::Llm {
                provider: self.name.to_string(),
                message: format!("request failed: {e}"),
            })?;

        let status = response.status().as_u16();
        let response_text = response.text().await.map_err(|e| ValetError::Llm {
            provider: self.name.to_string(),
            message: format!("failed to read response body: {e}"),
        })?;

        if !(200..300).contains(&status) {
            return Err(ValetError::Http {
                status,
                body: response_text,
            });
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&response_text).map_err(|e| ValetError::Llm {
                provider: self.name.to_string(),
                message: format!("failed to parse response JSON: {e}"),
            })?;

        let content = parsed["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| ValetError::Llm {
                provider: self.name.to_string(),
                message: "missing choices[0].message.content in response".to_string(),
            })?
            .to_string();

        let usage = match (
            parsed["usage"]["prompt_tokens"].as_u64(),
            parsed["usage"]["completion_tokens"].as_u64(),
        ) {
            (Some(input), Some(output)) => Some(Usage {
                input_tokens: input as u32,
                output_tokens: output as u32,
            }),
            _ => None,
        };

        Ok(ChatResponse { content, usage })
    }

    fn name(&self) -> &str {
        self.name
    }
}
