//! Streaming language model abstraction

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{LlmBackend, LlmConfig};
use crate::error::Result;

use super::ollama::OllamaClient;
use super::openai::OpenAiCompatibleClient;

/// Raw model output: text fragments of arbitrary size, in order
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for streaming completion backends
///
/// Implementations:
/// - `OpenAiCompatibleClient`: any `/v1/chat/completions` server (LM Studio, vLLM, OpenAI)
/// - `OllamaClient`: Ollama `/api/generate`
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start a completion. Resolves once the backend has accepted the request;
    /// fragments then arrive on the returned stream. Dropping the stream
    /// aborts the upstream request.
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;

    /// Whether the backend answers at all
    async fn health_check(&self) -> Result<bool>;

    /// Backend name for logs
    fn name(&self) -> &str;

    /// Model identifier sent upstream
    fn model(&self) -> &str;
}

/// Construct the configured provider
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::OpenAi => Arc::new(OpenAiCompatibleClient::new(config)?),
        LlmBackend::Ollama => Arc::new(OllamaClient::new(config)?),
    };
    tracing::info!(
        "LLM provider: {} ({}) at {}",
        provider.name(),
        provider.model(),
        config.base_url
    );
    Ok(provider)
}
