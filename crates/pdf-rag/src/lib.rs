//! pdf-rag: question answering over a directory of PDFs
//!
//! Every page of every PDF in the corpus directory becomes one document. Pages
//! are embedded into a flat L2 index that is persisted next to the server and
//! reloaded on restart. A question retrieves its nearest page, which grounds
//! a streamed LLM answer delivered to the client line by line over SSE.

pub mod auth;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod retrieval;
pub mod server;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::RagConfig;
pub use engine::RagEngine;
pub use error::{Error, Result};
pub use generation::{Fragment, FragmentStream};
pub use retrieval::{BuildReport, PipelineState, RetrievalPipeline};
pub use types::{
    document::{PageDocument, PageMetadata},
    query::{QueryRequest, SearchHit},
};
