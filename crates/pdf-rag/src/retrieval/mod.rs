//! Retrieval: corpus → embeddings → index, then nearest-page search

mod pipeline;

pub use pipeline::{BuildReport, PipelineState, RetrievalPipeline};
