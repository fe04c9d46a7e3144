//! Core types for the RAG backend

pub mod auth;
pub mod document;
pub mod query;

pub use document::{PageDocument, PageMetadata};
pub use query::{QueryRequest, SearchHit};
