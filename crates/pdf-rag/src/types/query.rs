//! Query request and retrieval result types

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::PageDocument;

/// Body of `POST /api/pdf/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The natural-language question
    #[serde(default)]
    pub query: String,
}

impl QueryRequest {
    /// Return the trimmed query, rejecting missing or blank input
    pub fn validated(&self) -> Result<&str> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(Error::validation("Query is required"));
        }
        Ok(query)
    }
}

/// One retrieved page and its squared L2 distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matched page
    pub document: PageDocument,
    /// Squared Euclidean distance (lower is closer)
    pub distance: f32,
}
