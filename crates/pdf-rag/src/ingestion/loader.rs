//! Corpus directory scanning

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::CorpusConfig;
use crate::error::{Error, Result};
use crate::types::PageDocument;

use super::pdf::extract_pages;

/// Outcome of one corpus scan
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Pages in file order, then page order
    pub pages: Vec<PageDocument>,
    /// PDFs that parsed
    pub files_loaded: usize,
    /// One `IngestionFailure` per skipped file
    pub failures: Vec<Error>,
}

/// Reads every PDF directly inside a directory, one [`PageDocument`] per page.
///
/// Files that fail to parse are logged and skipped; the rest of the corpus
/// still loads.
#[derive(Debug, Clone)]
pub struct CorpusLoader {
    directory: PathBuf,
    extract_timeout: Duration,
}

impl CorpusLoader {
    /// Create a loader for `directory`
    pub fn new(directory: impl Into<PathBuf>, extract_timeout: Duration) -> Self {
        Self {
            directory: directory.into(),
            extract_timeout,
        }
    }

    pub fn from_config(config: &CorpusConfig) -> Self {
        Self::new(
            config.directory.clone(),
            Duration::from_secs(config.extract_timeout_secs),
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// PDF files in the directory (non-recursive), sorted by file name so
    /// slot assignment is stable between builds.
    pub fn pdf_files(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            Error::ingestion(
                self.directory.display().to_string(),
                format!("cannot read corpus directory: {}", e),
            )
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_pdf = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if is_pdf && path.is_file() {
                files.push(path);
            } else {
                tracing::debug!("Skipping non-PDF entry {}", path.display());
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Scan the directory and extract every page. Blocking; run it off the
    /// async executor.
    pub fn load(&self) -> Result<LoadReport> {
        let files = self.pdf_files()?;
        tracing::info!(
            "Loading {} PDF file(s) from {}",
            files.len(),
            self.directory.display()
        );

        let mut report = LoadReport::default();
        for path in files {
            match self.load_file(&path) {
                Ok(pages) => {
                    tracing::debug!("{}: {} page(s)", path.display(), pages.len());
                    report.files_loaded += 1;
                    report.pages.extend(pages);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable PDF: {}", e);
                    report.failures.push(e);
                }
            }
        }

        Ok(report)
    }

    /// Extract one PDF into page documents
    pub fn load_file(&self, path: &Path) -> Result<Vec<PageDocument>> {
        let display = path.display().to_string();
        let data = std::fs::read(path).map_err(|e| Error::ingestion(&display, e.to_string()))?;
        let pages = extract_pages(&data, self.extract_timeout)
            .map_err(|message| Error::ingestion(&display, message))?;

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageDocument::new(text, display.clone(), i as u32))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_pdf;

    fn loader(dir: &Path) -> CorpusLoader {
        CorpusLoader::new(dir, Duration::from_secs(30))
    }

    #[test]
    fn test_loads_pages_in_file_then_page_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_pdf(&tmp.path().join("b.pdf"), &["Warrior pose"]);
        write_pdf(&tmp.path().join("a.PDF"), &["Mountain pose", "Tree pose"]);
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let report = loader(tmp.path()).load().unwrap();

        assert_eq!(report.files_loaded, 2);
        assert!(report.failures.is_empty());
        let origins: Vec<(String, u32)> = report
            .pages
            .iter()
            .map(|p| (p.filename().to_string(), p.metadata.page_number))
            .collect();
        assert_eq!(
            origins,
            vec![
                ("a.PDF".to_string(), 0),
                ("a.PDF".to_string(), 1),
                ("b.pdf".to_string(), 0)
            ]
        );
        assert!(report.pages[1].content.contains("Tree"));
    }

    #[test]
    fn test_bad_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_pdf(&tmp.path().join("good.pdf"), &["Child pose"]);
        std::fs::write(tmp.path().join("broken.pdf"), b"not a pdf").unwrap();

        let report = loader(tmp.path()).load().unwrap();

        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            Error::IngestionFailure { file, .. } if file.ends_with("broken.pdf")
        ));
    }

    #[test]
    fn test_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let report = loader(tmp.path()).load().unwrap();
        assert!(report.pages.is_empty());
        assert_eq!(report.files_loaded, 0);
    }

    #[test]
    fn test_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = loader(&tmp.path().join("uploads")).load().unwrap_err();
        assert!(matches!(err, Error::IngestionFailure { .. }));
    }
}
