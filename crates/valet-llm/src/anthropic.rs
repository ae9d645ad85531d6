use reqwest::Client;
use serde_json::json;
use valet_core::error::{Result, ValetError};
use valet_core::types::{ChatRequest, ChatResponse, Usage};

use crate::provider::LlmProvider;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude LLM provider.
#[derive(Debug)]
pub struct AnthropicLlm {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicLlm {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }

    /// Split the request into an optional system prompt and the
    /// messages array (Anthropic carries system outside messages).
    fn build_messages(request: &ChatRequest) -> (Option<String>, Vec<serde_json::Value>) {
        let mut system = None;
        let mut messages = Vec::new();

        for m in &request.messages {
            if m.role == "system" {
                system = Some(m.content.clone());
            } else {
                messages.push(json!({
                    "role": m.role,
                    "content": m.content,
                }));
            }
        }

        (system, messages)
    }
}

impl LlmProvider for AnthropicLlm {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let (system, messages) = Self::build_messages(&request);

        let max_tokens = request.max_tokens.unwrap_or(4096);

        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": messages,
        });

        if let Some(sys) = system {
            body.as_object_mut()
                .unwrap()
                .insert("system".to_string(), json!(sys));
        }

        if let Some(temp) = request.temperature {
            body.as_object_mut()
                .unwrap()
                .insert("temperature".to_string(), json!(temp));
        }

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ValetError::Llm {
                provider: "anthropic".to_string(),
                message: format!("request failed: {e}"),
            })?;

        let status = response.status().as_u16();
        let response_text = response.text().await.map_err(|e| ValetError::Llm {
            provider: "anthropic".to_string(),
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
                provider: "anthropic".to_string(),
                message: format!("failed to parse response JSON: {e}"),
            })?;

        let content = parsed["content"]
            .as_array()
            .and_then(|arr| arr.iter().find(|b| b["type"] == "text"))
            .and_then(|b| b["text"].as_str())
            .ok_or_else(|| ValetError::Llm {
                provider: "anthropic".to_string(),
                message: "missing text content block in response".to_string(),
            })?
            .to_string();

        let usage = match (
            parsed["usage"]["input_tokens"].as_u64(),
            parsed["usage"]["output_tokens"].as_u64(),
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
        "anthropic"
    }
}
