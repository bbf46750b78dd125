use async_trait::async_trait;

use crate::errors::AndroidUseResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Unified LLM provider trait. New providers only need to implement this
/// trait and register in config.toml.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Send a chat completion request and return the full response content.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig)
        -> AndroidUseResult<LlmResponse>;
}
