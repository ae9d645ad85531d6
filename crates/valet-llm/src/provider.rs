use valet_core::error::Result;
use valet_core::types::{ChatRequest, ChatResponse};

/// Trait for LLM chat completion providers.
///
/// The core depends on exactly two behaviors: "give me structured JSON
/// back" (entity extraction) and "give me a conversational paragraph
/// back" (response generation). Both go through `chat`.
pub trait LlmProvider: Send + Sync {
    /// Send a chat request and receive a completion response.
    fn chat(
        &self,
        request: ChatRequest,
    ) -> impl std::future::Future<Output = Result<ChatResponse>> + Send;

    /// Return the provider name (e.g. "anthropic", "openai").
    fn name(&self) -> &str;
}
