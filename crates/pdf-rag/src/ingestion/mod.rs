//! Corpus ingestion: PDF directory scan and per-page text extraction

mod loader;
mod pdf;

pub use loader::{CorpusLoader, LoadReport};
pub use pdf::{cleanup_pdf_text, extract_pages};
