//! Build-or-load orchestration for the page index

use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::ingestion::CorpusLoader;
use crate::types::SearchHit;

/// Lifecycle of the pipeline's index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Uninitialized,
    LoadingExisting,
    Building,
    Ready,
}

/// Summary of the most recent load or build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Pages in the index
    pub documents: usize,
    /// PDFs parsed (0 when loaded from disk)
    pub files_loaded: usize,
    /// PDFs skipped because they could not be parsed
    pub files_failed: usize,
    /// Whether the index came from the persisted directory
    pub loaded_from_disk: bool,
}

type BuildTask = JoinHandle<Result<(Arc<VectorIndex>, BuildReport)>>;

/// Corpus loader + embedder + vector index, built at most once at a time.
///
/// The first caller of [`RetrievalPipeline::ready`] starts a background task
/// that loads the persisted index or, failing that, builds and persists a new
/// one. Every caller, including ones arriving after the first gave up, awaits
/// that same task. Once ready the index is shared read-only.
pub struct RetrievalPipeline {
    inner: Arc<PipelineInner>,
    /// The in-flight load or build. Outlives whichever caller started it.
    build: Mutex<Option<BuildTask>>,
}

struct PipelineInner {
    embedder: Arc<dyn Embedder>,
    loader: CorpusLoader,
    index_dir: PathBuf,
    state: RwLock<PipelineState>,
    index: RwLock<Option<Arc<VectorIndex>>>,
    builds: AtomicUsize,
    last_report: RwLock<Option<BuildReport>>,
}

impl RetrievalPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        loader: CorpusLoader,
        index_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                embedder,
                loader,
                index_dir: index_dir.into(),
                state: RwLock::new(PipelineState::Uninitialized),
                index: RwLock::new(None),
                builds: AtomicUsize::new(0),
                last_report: RwLock::new(None),
            }),
            build: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.inner.state.read()
    }

    /// Whether an index is available for search
    pub fn is_ready(&self) -> bool {
        self.inner.current().is_some()
    }

    /// Number of full builds (not loads) this pipeline has run
    pub fn builds_performed(&self) -> usize {
        self.inner.builds.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<BuildReport> {
        self.inner.last_report.read().clone()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.inner.embedder
    }

    pub fn index_dir(&self) -> &Path {
        &self.inner.index_dir
    }

    fn spawn_build(&self, force_rebuild: bool) -> BuildTask {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.initialize(force_rebuild).await })
    }

    /// The index, loading or building it first if necessary
    pub async fn ready(&self) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.inner.current() {
            return Ok(index);
        }

        let mut build = self.build.lock().await;
        // Whoever held the lock before us may have finished the job.
        if let Some(index) = self.inner.current() {
            return Ok(index);
        }

        let task = build.get_or_insert_with(|| self.spawn_build(false));
        let outcome = join(task).await;
        *build = None;
        outcome.map(|(index, _)| index)
    }

    /// Bring the pipeline to `Ready` and report how
    pub async fn init(&self) -> Result<BuildReport> {
        self.ready().await?;
        Ok(self.last_report().unwrap_or_default())
    }

    /// Discard any persisted index and rebuild from the corpus directory.
    /// Searches keep using the previous index until the new one is in place.
    pub async fn rebuild(&self) -> Result<BuildReport> {
        let mut build = self.build.lock().await;
        if let Some(task) = build.as_mut() {
            // A load started by `ready` would otherwise race the rebuild.
            let _ = join(task).await;
        }

        tracing::info!(
            "Re-indexing corpus at {}",
            self.inner.loader.directory().display()
        );
        let task = build.insert(self.spawn_build(true));
        let outcome = join(task).await;
        *build = None;
        outcome.map(|(_, report)| report)
    }

    /// Release the index. Waits for an in-flight build to finish first.
    pub async fn shutdown(&self) {
        let mut build = self.build.lock().await;
        if let Some(task) = build.as_mut() {
            let _ = join(task).await;
        }
        *build = None;

        self.inner.index.write().take();
        self.inner.set_state(PipelineState::Uninitialized);
        tracing::info!("Retrieval pipeline shut down");
    }

    /// The `k` pages nearest to `query`, nearest first. Empty when the corpus
    /// had no pages.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::validation("k must be at least 1"));
        }
        if query.trim().is_empty() {
            return Err(Error::validation("Query is required"));
        }

        let index = self.ready().await?;
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.inner.embedder.embed(query).await?;
        let hits = index.search(&vector, k)?;
        if let Some(best) = hits.first() {
            tracing::debug!("Nearest page {} at distance {:.4}", best.document, best.distance);
        }
        Ok(hits)
    }
}

/// Await a build task without consuming it, so a caller dropped mid-await
/// leaves the task for the next one
async fn join(task: &mut BuildTask) -> Result<(Arc<VectorIndex>, BuildReport)> {
    task.await
        .map_err(|e| Error::internal(format!("Index build task failed: {}", e)))?
}

impl PipelineInner {
    fn set_state(&self, state: PipelineState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!("Retrieval pipeline {:?} -> {:?}", previous, state);
        }
    }

    fn current(&self) -> Option<Arc<VectorIndex>> {
        self.index.read().clone()
    }

    /// Runs on the build task; publishes the result itself so it lands even
    /// when no caller is left waiting
    async fn initialize(&self, force_rebuild: bool) -> Result<(Arc<VectorIndex>, BuildReport)> {
        match self.load_or_build(force_rebuild).await {
            Ok((index, report)) => {
                let index = Arc::new(index);
                *self.index.write() = Some(Arc::clone(&index));
                *self.last_report.write() = Some(report.clone());
                self.set_state(PipelineState::Ready);
                tracing::info!(
                    "Retrieval pipeline ready: {} page(s){}",
                    report.documents,
                    if report.loaded_from_disk { " (from disk)" } else { "" }
                );
                Ok((index, report))
            }
            Err(e) => {
                let fallback = if self.current().is_some() {
                    PipelineState::Ready
                } else {
                    PipelineState::Uninitialized
                };
                self.set_state(fallback);
                tracing::error!("Failed to prepare index: {}", e);
                Err(e)
            }
        }
    }

    async fn load_or_build(&self, force_rebuild: bool) -> Result<(VectorIndex, BuildReport)> {
        if !force_rebuild && VectorIndex::exists(&self.index_dir) {
            self.set_state(PipelineState::LoadingExisting);
            let dir = self.index_dir.clone();
            let embedder = Arc::clone(&self.embedder);
            let index = tokio::task::spawn_blocking(move || VectorIndex::load(&dir, embedder.as_ref()))
                .await
                .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;

            let report = BuildReport {
                documents: index.len(),
                loaded_from_disk: true,
                ..BuildReport::default()
            };
            return Ok((index, report));
        }

        self.set_state(PipelineState::Building);
        self.builds.fetch_add(1, Ordering::SeqCst);

        let loader = self.loader.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;

        let report = BuildReport {
            documents: loaded.pages.len(),
            files_loaded: loaded.files_loaded,
            files_failed: loaded.failures.len(),
            loaded_from_disk: false,
        };

        if loaded.pages.is_empty() {
            tracing::warn!(
                "Corpus at {} produced zero pages ({} file(s) failed); every query will get the fallback answer",
                self.loader.directory().display(),
                report.files_failed
            );
        }

        let index = VectorIndex::build(loaded.pages, self.embedder.as_ref()).await?;

        let dir = self.index_dir.clone();
        if index.is_empty() {
            // Persisting nothing would pin the empty result across restarts.
            if VectorIndex::exists(&dir) {
                tokio::fs::remove_dir_all(&dir).await?;
            }
            return Ok((index, report));
        }

        let index = tokio::task::spawn_blocking(move || index.save(&dir).map(|_| index))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;

        Ok((index, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_pdf, KeywordEmbedder};
    use std::time::Duration;

    struct Fixture {
        _tmp: tempfile::TempDir,
        corpus: PathBuf,
        index_dir: PathBuf,
        embedder: Arc<KeywordEmbedder>,
    }

    impl Fixture {
        fn new(embedder: KeywordEmbedder) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let corpus = tmp.path().join("uploads");
            std::fs::create_dir_all(&corpus).unwrap();
            Self {
                corpus,
                index_dir: tmp.path().join("vector_index"),
                embedder: Arc::new(embedder),
                _tmp: tmp,
            }
        }

        fn pipeline(&self) -> RetrievalPipeline {
            RetrievalPipeline::new(
                self.embedder.clone(),
                CorpusLoader::new(&self.corpus, Duration::from_secs(30)),
                &self.index_dir,
            )
        }
    }

    #[tokio::test]
    async fn test_spine_page_is_nearest() {
        let fx = Fixture::new(KeywordEmbedder::new());
        write_pdf(&fx.corpus.join("yoga.pdf"), &["Downward Dog stretches the spine."]);
        let pipeline = fx.pipeline();

        let hits = pipeline.search("How do I stretch my spine?", 1).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert!(hits[0].document.content.contains("Downward Dog"));
        assert_eq!(hits[0].document.filename(), "yoga.pdf");
        assert_eq!(pipeline.state(), PipelineState::Ready);
    }

    #[tokio::test]
    async fn test_nearest_of_several_pages() {
        let fx = Fixture::new(KeywordEmbedder::new());
        write_pdf(
            &fx.corpus.join("yoga.pdf"),
            &[
                "Mountain pose improves posture",
                "Downward Dog stretches the spine",
                "Breathing exercises calm the mind",
            ],
        );
        let pipeline = fx.pipeline();

        let hits = pipeline.search("calm breathing for the mind", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.metadata.page_number, 2);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let fx = Fixture::new(KeywordEmbedder::new().with_delay(Duration::from_millis(20)));
        write_pdf(&fx.corpus.join("a.pdf"), &["Tree pose", "Warrior pose"]);
        let pipeline = Arc::new(fx.pipeline());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { pipeline.ready().await.unwrap() })
            })
            .collect();

        let mut indexes = Vec::new();
        for handle in handles {
            indexes.push(handle.await.unwrap());
        }

        assert_eq!(pipeline.builds_performed(), 1);
        assert_eq!(fx.embedder.calls(), 2);
        assert!(indexes.iter().all(|i| Arc::ptr_eq(i, &indexes[0])));
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_restart_build() {
        let fx = Fixture::new(KeywordEmbedder::new().with_delay(Duration::from_millis(200)));
        write_pdf(&fx.corpus.join("a.pdf"), &["Tree pose"]);
        let pipeline = Arc::new(fx.pipeline());

        let first = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.ready().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.ready().await })
        };
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        let index = second.await.unwrap().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(pipeline.builds_performed(), 1);
        assert_eq!(fx.embedder.calls(), 1);
        assert_eq!(pipeline.state(), PipelineState::Ready);
    }

    #[tokio::test]
    async fn test_build_completes_without_any_waiter() {
        let fx = Fixture::new(KeywordEmbedder::new().with_delay(Duration::from_millis(50)));
        write_pdf(&fx.corpus.join("a.pdf"), &["Tree pose"]);
        let pipeline = Arc::new(fx.pipeline());

        let caller = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.ready().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();

        for _ in 0..50 {
            if pipeline.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(pipeline.is_ready());
        assert!(VectorIndex::exists(&fx.index_dir));

        pipeline.ready().await.unwrap();
        assert_eq!(pipeline.builds_performed(), 1);
    }

    #[tokio::test]
    async fn test_second_process_loads_persisted_index() {
        let fx = Fixture::new(KeywordEmbedder::new());
        write_pdf(&fx.corpus.join("a.pdf"), &["Child pose rests the back"]);

        let first = fx.pipeline();
        let report = first.init().await.unwrap();
        assert!(!report.loaded_from_disk);
        assert!(VectorIndex::exists(&fx.index_dir));
        let before = first.search("rest my back", 1).await.unwrap();

        let second = fx.pipeline();
        let report = second.init().await.unwrap();
        assert!(report.loaded_from_disk);
        assert_eq!(report.documents, 1);
        assert_eq!(second.builds_performed(), 0);

        let after = second.search("rest my back", 1).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_empty_corpus_searches_empty_and_is_not_persisted() {
        let fx = Fixture::new(KeywordEmbedder::new());
        let pipeline = fx.pipeline();

        let report = pipeline.init().await.unwrap();
        assert_eq!(report.documents, 0);
        assert!(pipeline.search("anything", 1).await.unwrap().is_empty());
        assert!(!VectorIndex::exists(&fx.index_dir));
        assert_eq!(fx.embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_build_returns_to_uninitialized() {
        let fx = Fixture::new(KeywordEmbedder::new());
        std::fs::remove_dir_all(&fx.corpus).unwrap();
        let pipeline = fx.pipeline();

        let err = pipeline.ready().await.unwrap_err();
        assert!(matches!(err, Error::IngestionFailure { .. }));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);

        std::fs::create_dir_all(&fx.corpus).unwrap();
        write_pdf(&fx.corpus.join("a.pdf"), &["Cobra pose"]);
        assert_eq!(pipeline.init().await.unwrap().documents, 1);
    }

    #[tokio::test]
    async fn test_failed_embedding_persists_nothing() {
        let fx = Fixture::new(KeywordEmbedder::new().failing());
        write_pdf(&fx.corpus.join("a.pdf"), &["Cobra pose"]);
        let pipeline = fx.pipeline();

        assert!(pipeline.ready().await.is_err());
        assert!(!VectorIndex::exists(&fx.index_dir));
        assert!(!pipeline.is_ready());
    }

    #[tokio::test]
    async fn test_rebuild_picks_up_new_files() {
        let fx = Fixture::new(KeywordEmbedder::new());
        write_pdf(&fx.corpus.join("a.pdf"), &["Cobra pose"]);
        let pipeline = fx.pipeline();
        assert_eq!(pipeline.init().await.unwrap().documents, 1);

        write_pdf(&fx.corpus.join("b.pdf"), &["Bridge pose", "Camel pose"]);
        assert_eq!(pipeline.init().await.unwrap().documents, 1);

        let report = pipeline.rebuild().await.unwrap();
        assert_eq!(report.documents, 3);
        assert_eq!(pipeline.builds_performed(), 2);
        assert_eq!(fx.pipeline().init().await.unwrap().documents, 3);
    }

    #[tokio::test]
    async fn test_invalid_search_arguments() {
        let fx = Fixture::new(KeywordEmbedder::new());
        let pipeline = fx.pipeline();

        assert!(matches!(pipeline.search("q", 0).await, Err(Error::Validation(_))));
        assert!(matches!(pipeline.search(" ", 1).await, Err(Error::Validation(_))));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }

    #[tokio::test]
    async fn test_shutdown_releases_index() {
        let fx = Fixture::new(KeywordEmbedder::new());
        write_pdf(&fx.corpus.join("a.pdf"), &["Cobra pose"]);
        let pipeline = fx.pipeline();
        pipeline.init().await.unwrap();

        pipeline.shutdown().await;
        assert!(!pipeline.is_ready());
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }
}
