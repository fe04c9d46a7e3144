//! Text embedding backends
//!
//! The same embedder instance must embed both the corpus pages and incoming
//! queries; vectors from different models are not comparable.

mod ollama;
mod onnx_embedder;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::Result;

pub use ollama::OllamaEmbedder;
pub use onnx_embedder::OnnxEmbedder;

/// Text used to measure a model's output dimension
pub const DIMENSION_PROBE: &str = "Sample text";

/// Trait for generating text embeddings
///
/// Implementations:
/// - `OnnxEmbedder`: local sentence-transformers model via ONNX Runtime
/// - `OllamaEmbedder`: Ollama server (`/api/embeddings`)
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Output dimension, measured from a probe embedding at construction
    fn dimensions(&self) -> usize;

    /// Stable identifier of the model, recorded in the persisted index
    fn name(&self) -> &str;
}

/// Construct the configured embedder. Loads the model once; callers share the
/// returned handle for the lifetime of the process.
pub async fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.backend {
        EmbeddingBackend::Onnx => Arc::new(OnnxEmbedder::new(config).await?),
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(config).await?),
    };

    tracing::info!(
        "Embedder ready: {} ({} dimensions)",
        embedder.name(),
        embedder.dimensions()
    );

    Ok(embedder)
}
