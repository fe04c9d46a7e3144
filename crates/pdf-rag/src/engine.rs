//! Query engine: retrieval pipeline plus generation service

use std::sync::Arc;

use crate::config::RagConfig;
use crate::embeddings;
use crate::error::Result;
use crate::generation::{provider, FragmentStream, GenerationService};
use crate::ingestion::CorpusLoader;
use crate::retrieval::{BuildReport, RetrievalPipeline};

/// Explicitly constructed query service handed to request handlers.
///
/// `init` prepares the index, `ask` answers one question, `shutdown` releases
/// the index.
pub struct RagEngine {
    pipeline: Arc<RetrievalPipeline>,
    generation: GenerationService,
    top_k: usize,
}

impl RagEngine {
    pub fn new(pipeline: Arc<RetrievalPipeline>, generation: GenerationService, top_k: usize) -> Self {
        Self {
            pipeline,
            generation,
            top_k: top_k.max(1),
        }
    }

    /// Load the embedding model and connect the configured providers.
    /// Does not touch the index; call [`RagEngine::init`] for that.
    pub async fn from_config(config: &RagConfig) -> Result<Self> {
        let embedder = embeddings::from_config(&config.embeddings).await?;
        let llm = provider::from_config(&config.llm)?;

        let pipeline = Arc::new(RetrievalPipeline::new(
            embedder,
            CorpusLoader::from_config(&config.corpus),
            config.index.directory.clone(),
        ));
        let generation = GenerationService::from_config(llm, &config.llm, &config.generation);

        Ok(Self::new(pipeline, generation, config.generation.top_k))
    }

    /// Load or build the index
    pub async fn init(&self) -> Result<BuildReport> {
        self.pipeline.init().await
    }

    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
    }

    /// Retrieve the nearest page(s) for `query` and stream an answer grounded
    /// in them
    pub async fn ask(&self, query: &str) -> Result<FragmentStream> {
        let hits = self.pipeline.search(query, self.top_k).await?;
        let pages: Vec<_> = hits.into_iter().map(|hit| hit.document).collect();
        self.generation.generate(query, &pages).await
    }

    pub fn pipeline(&self) -> &Arc<RetrievalPipeline> {
        &self.pipeline
    }

    pub fn generation(&self) -> &GenerationService {
        &self.generation
    }
}
