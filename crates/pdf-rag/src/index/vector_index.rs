//! Geometric index plus slot → page docstore

use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::types::{PageDocument, SearchHit};

use super::flat::FlatL2Index;
use super::persist::{self, DocstoreFile, Manifest};

/// Pages embedded per call to the embedder during a build
const BUILD_BATCH: usize = 32;

/// A flat L2 index whose slot `i` always refers to `index_to_docstore_id[i]`.
///
/// Built once, then only read. Every mutation goes through [`VectorIndex::add`]
/// which keeps both sides in lockstep.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    embedder_name: String,
    flat: FlatL2Index,
    index_to_docstore_id: Vec<String>,
    docstore: HashMap<String, PageDocument>,
}

impl VectorIndex {
    /// Empty index for vectors produced by `embedder_name`
    pub fn new(embedder_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            embedder_name: embedder_name.into(),
            flat: FlatL2Index::new(dimension),
            index_to_docstore_id: Vec::new(),
            docstore: HashMap::new(),
        }
    }

    /// Embed every page and index it, in input order.
    ///
    /// Either every page is indexed or an error is returned; nothing is
    /// written to disk here.
    pub async fn build(documents: Vec<PageDocument>, embedder: &dyn Embedder) -> Result<Self> {
        let mut index = Self::new(embedder.name(), embedder.dimensions());

        for batch in documents.chunks(BUILD_BATCH) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "embedder returned {} vectors for {} pages",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (doc, vector) in batch.iter().zip(vectors) {
                index.add(doc.clone(), &vector)?;
            }
            tracing::debug!("Indexed {}/{} pages", index.len(), documents.len());
        }

        Ok(index)
    }

    /// Append one page with its embedding, returning the assigned slot
    pub fn add(&mut self, document: PageDocument, vector: &[f32]) -> Result<usize> {
        // Vector first: if it is rejected the docstore is untouched.
        let slot = self.flat.add(vector)?;
        let id = Uuid::new_v4().to_string();
        self.index_to_docstore_id.push(id.clone());
        self.docstore.insert(id, document);
        Ok(slot)
    }

    /// The `k` pages nearest to `query`, nearest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.flat
            .search(query, k)?
            .into_iter()
            .map(|(slot, distance)| {
                let document = self.document(slot).cloned().ok_or_else(|| {
                    Error::index(format!("slot {} has no docstore entry", slot))
                })?;
                Ok(SearchHit { document, distance })
            })
            .collect()
    }

    /// Page stored at `slot`
    pub fn document(&self, slot: usize) -> Option<&PageDocument> {
        self.index_to_docstore_id
            .get(slot)
            .and_then(|id| self.docstore.get(id))
    }

    /// Pages in slot order
    pub fn documents(&self) -> impl Iterator<Item = &PageDocument> {
        self.index_to_docstore_id
            .iter()
            .filter_map(|id| self.docstore.get(id))
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.flat.dimension()
    }

    pub fn embedder_name(&self) -> &str {
        &self.embedder_name
    }

    /// Persist into `dir`, replacing any previous index there
    pub fn save(&self, dir: &Path) -> Result<Manifest> {
        let docstore = DocstoreFile {
            index_to_docstore_id: self.index_to_docstore_id.clone(),
            docstore: self.docstore.clone(),
        };
        persist::save(dir, &self.embedder_name, &self.flat, &docstore)
    }

    /// Load and verify an index previously written by [`VectorIndex::save`]
    pub fn load(dir: &Path, embedder: &dyn Embedder) -> Result<Self> {
        let parts = persist::load(dir, embedder.name())?;
        if parts.manifest.count > 0 && parts.manifest.dimension != embedder.dimensions() {
            return Err(Error::unsafe_index(format!(
                "persisted vectors have {} dimensions, embedder produces {}",
                parts.manifest.dimension,
                embedder.dimensions()
            )));
        }

        tracing::info!(
            "Loaded index from {} ({} vectors, built {})",
            dir.display(),
            parts.manifest.count,
            parts.manifest.created_at
        );

        Ok(Self {
            embedder_name: parts.manifest.embedder,
            flat: parts.flat,
            index_to_docstore_id: parts.docstore.index_to_docstore_id,
            docstore: parts.docstore.docstore,
        })
    }

    /// Whether a persisted index is present at `dir`
    pub fn exists(dir: &Path) -> bool {
        persist::exists(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::KeywordEmbedder;

    fn pages() -> Vec<PageDocument> {
        vec![
            PageDocument::new("Mountain pose builds posture and balance", "a.pdf", 0),
            PageDocument::new("Downward Dog stretches the spine.", "b.pdf", 0),
            PageDocument::new("Breathing exercises calm the mind", "b.pdf", 1),
        ]
    }

    #[test]
    fn test_nearest_of_two_known_vectors() {
        let mut index = VectorIndex::new("manual", 2);
        index.add(PageDocument::new("first", "a.pdf", 0), &[0.0, 0.0]).unwrap();
        index.add(PageDocument::new("second", "a.pdf", 1), &[10.0, 10.0]).unwrap();

        let hits = index.search(&[1.0, 1.0], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.content, "first");
        assert_eq!(hits[0].distance, 2.0);
    }

    #[test]
    fn test_rejected_vector_keeps_lockstep() {
        let mut index = VectorIndex::new("manual", 2);
        assert!(index.add(PageDocument::new("bad", "a.pdf", 0), &[1.0]).is_err());
        assert!(index.is_empty());
        assert_eq!(index.documents().count(), 0);
    }

    #[test]
    fn test_empty_index_search() {
        let index = VectorIndex::new("manual", 3);
        assert!(index.search(&[0.0, 0.0, 0.0], 1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_preserves_order() {
        let embedder = KeywordEmbedder::new();
        let index = VectorIndex::build(pages(), &embedder).await.unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.embedder_name(), embedder.name());
        let contents: Vec<&str> = index.documents().map(|d| d.content.as_str()).collect();
        assert!(contents[1].starts_with("Downward Dog"));
        assert_eq!(index.document(2).unwrap().metadata.page_number, 1);
    }

    #[tokio::test]
    async fn test_build_fails_atomically() {
        let embedder = KeywordEmbedder::new().failing();
        assert!(VectorIndex::build(pages(), &embedder).await.is_err());
    }

    #[tokio::test]
    async fn test_round_trip_answers_identically() {
        let embedder = KeywordEmbedder::new();
        let index = VectorIndex::build(pages(), &embedder).await.unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vector_index");
        index.save(&dir).unwrap();
        assert!(VectorIndex::exists(&dir));

        let loaded = VectorIndex::load(&dir, &embedder).unwrap();
        for query in ["stretch my spine", "calm breathing", "balance"] {
            let vector = embedder.embed(query).await.unwrap();
            assert_eq!(
                index.search(&vector, 3).unwrap(),
                loaded.search(&vector, 3).unwrap()
            );
        }
    }
}
