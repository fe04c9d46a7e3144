//! Answer generation: prompt assembly, streaming model clients, line re-chunking

pub mod line_buffer;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod provider;
mod retry;
pub mod service;

pub use line_buffer::LineBuffer;
pub use ollama::OllamaClient;
pub use openai::OpenAiCompatibleClient;
pub use prompt::PromptBuilder;
pub use provider::{LlmProvider, TokenStream};
pub use service::{Fragment, FragmentStream, GenerationService, NO_CONTEXT_FALLBACK};
