//! Page-level documents produced by corpus ingestion

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a page came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PageMetadata {
    /// Path of the originating PDF, as seen when the corpus was scanned
    pub source_path: String,
    /// Page index within the PDF (0-based)
    pub page_number: u32,
}

/// Text of one PDF page plus its origin. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageDocument {
    /// Extracted plain text
    pub content: String,
    /// Origin metadata
    pub metadata: PageMetadata,
}

impl PageDocument {
    /// Create a page document
    pub fn new(content: impl Into<String>, source_path: impl Into<String>, page_number: u32) -> Self {
        Self {
            content: content.into(),
            metadata: PageMetadata {
                source_path: source_path.into(),
                page_number,
            },
        }
    }

    /// File name portion of the source path
    pub fn filename(&self) -> &str {
        let path = self.metadata.source_path.as_str();
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }

    /// Whether the page carries any non-whitespace text
    pub fn has_text(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

impl fmt::Display for PageDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (page {})", self.filename(), self.metadata.page_number)
    }
}
