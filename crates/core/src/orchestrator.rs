use crate::embeddings::Embedder;
use crate::error::{SearchError, StoreError};
use crate::extractor::PdfExtractor;
use crate::ingest::{IndexBuilder, ProcessOutcome};
use crate::models::{PipelineConfig, SearchHit, DEFAULT_TOP_K};
use crate::store::{BundleStatus, IndexStore, LoadedIndex};
use crate::traits::VectorIndex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lifecycle of the on-disk bundle as seen by a [`Retriever`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Absent,
    Building,
    Ready,
    Corrupt(String),
}

impl From<BundleStatus> for IndexState {
    fn from(status: BundleStatus) -> Self {
        match status {
            BundleStatus::Absent => IndexState::Absent,
            BundleStatus::Ready => IndexState::Ready,
            BundleStatus::Corrupt(reason) => IndexState::Corrupt(reason),
        }
    }
}

/// Answers queries against the persisted bundle, building it from the source
/// directory the first time it is missing or unreadable.
pub struct Retriever<X, E> {
    builder: IndexBuilder<X, E>,
    store: IndexStore,
    source_dir: PathBuf,
    top_k: usize,
    state: IndexState,
    loaded: Option<LoadedIndex>,
}

impl<X: PdfExtractor, E: Embedder> Retriever<X, E> {
    pub fn new(builder: IndexBuilder<X, E>, store: IndexStore, source_dir: impl Into<PathBuf>) -> Self {
        let (status, loaded) = store.open();
        Self {
            builder,
            store,
            source_dir: source_dir.into(),
            top_k: DEFAULT_TOP_K,
            state: status.into(),
            loaded,
        }
    }

    pub fn from_config(builder: IndexBuilder<X, E>, config: &PipelineConfig) -> Self {
        Self::new(builder, IndexStore::new(&config.index_dir), &config.source_dir).with_top_k(config.top_k)
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Rebuilds the bundle from `pdf_dir` and reopens it.
    pub fn process_documents(&mut self, pdf_dir: &Path) -> Result<ProcessOutcome, SearchError> {
        self.state = IndexState::Building;
        self.loaded = None;

        let outcome = self.builder.process_documents(pdf_dir, &self.store);
        let (status, loaded) = self.store.open();
        self.state = status.into();
        self.loaded = loaded;
        Ok(outcome?)
    }

    /// Loads the bundle, building it once from the source directory when it
    /// is absent or corrupt.
    pub fn ensure_ready(&mut self) -> Result<&LoadedIndex, SearchError> {
        if self.loaded.is_none() {
            self.load_or_build()?;
        }

        self.loaded
            .as_ref()
            .ok_or_else(|| SearchError::NotReady(self.store.dir().display().to_string()))
    }

    fn load_or_build(&mut self) -> Result<(), SearchError> {
        match self.store.load() {
            Ok(loaded) => {
                self.loaded = Some(loaded);
                self.state = IndexState::Ready;
                return Ok(());
            }
            Err(StoreError::MissingIndex(missing)) => {
                info!(%missing, "no index bundle yet, building");
                self.state = IndexState::Absent;
            }
            Err(StoreError::CorruptIndex(reason)) => {
                warn!(dir = %self.store.dir().display(), %reason, "index bundle corrupt, rebuilding");
                self.state = IndexState::Corrupt(reason);
            }
            Err(error) => return Err(error.into()),
        }

        let source_dir = self.source_dir.clone();
        match self.process_documents(&source_dir)? {
            ProcessOutcome::NoPdfFiles => Err(SearchError::NotReady(format!(
                "no pdf files found in {}",
                source_dir.display()
            ))),
            ProcessOutcome::Built { .. } => match &self.state {
                IndexState::Corrupt(reason) => Err(StoreError::CorruptIndex(reason.clone()).into()),
                _ => Ok(()),
            },
        }
    }

    pub fn search(&mut self, query: &str, k: usize) -> Result<Vec<SearchHit>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        self.ensure_ready()?;
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| SearchError::NotReady(self.store.dir().display().to_string()))?;

        let embedder = self.builder.embedder();
        if let Some(manifest) = &loaded.manifest {
            if manifest.model != embedder.model() {
                warn!(
                    built_with = %manifest.model,
                    querying_with = %embedder.model(),
                    "query embedder differs from the one used to build the index"
                );
            }
        }

        let vector = embedder.embed(query)?;
        let neighbors = loaded.index.search(&vector, k)?;
        debug!(query, hits = neighbors.len(), "search complete");

        neighbors
            .into_iter()
            .map(|neighbor| -> Result<SearchHit, SearchError> {
                let document = loaded.documents.get(neighbor.ordinal).ok_or_else(|| {
                    StoreError::CorruptIndex(format!("no document for ordinal {}", neighbor.ordinal))
                })?;
                Ok(SearchHit {
                    ordinal: neighbor.ordinal,
                    distance: neighbor.distance,
                    content: document.content.clone(),
                    source: document.metadata.source.clone(),
                    page: document.metadata.page,
                })
            })
            .collect()
    }

    /// Rendered hits with their source trailer, or a single `ERROR:` entry.
    pub fn search_documents(&mut self, query: &str) -> Vec<String> {
        match self.search(query, self.top_k) {
            Ok(hits) => hits.iter().map(SearchHit::render).collect(),
            Err(error) => {
                warn!(%error, "search failed");
                vec![format!("ERROR: Failed to search: {error}")]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::IndexError;
    use crate::extractor::fixtures::{write_pdf, FixturePage};
    use crate::extractor::LopdfExtractor;
    use crate::links::NoopLinkScraper;
    use crate::store::DOCUMENTS_FILE;
    use std::fs;
    use tempfile::tempdir;

    type TestRetriever = Retriever<LopdfExtractor<NoopLinkScraper>, CharacterNgramEmbedder>;

    fn retriever(root: &Path) -> TestRetriever {
        let builder = IndexBuilder::new(
            LopdfExtractor::new(NoopLinkScraper),
            CharacterNgramEmbedder { dimensions: 64 },
        );
        Retriever::new(builder, IndexStore::new(root.join("faiss_index")), root.join("data"))
    }

    fn write_statement(root: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let data = root.join("data");
        fs::create_dir_all(&data)?;
        let path = data.join("march.pdf");
        write_pdf(
            &path,
            &[
                FixturePage {
                    lines: &["Statement for March"],
                    with_table: false,
                    link: None,
                },
                FixturePage {
                    lines: &["Order history"],
                    with_table: true,
                    link: None,
                },
            ],
        )?;
        Ok(path)
    }

    #[test]
    fn first_query_builds_the_bundle() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdf = write_statement(dir.path())?;
        let mut retriever = retriever(dir.path());
        assert_eq!(retriever.state(), &IndexState::Absent);

        let results = retriever.search_documents("Paneer Tikka 249.00");

        assert_eq!(retriever.state(), &IndexState::Ready);
        assert_eq!(results.len(), 2);
        let trailer = format!("\n[Source: {}]", pdf.display());
        assert!(results.iter().all(|result| result.ends_with(&trailer)));
        assert!(retriever.store().dir().join(DOCUMENTS_FILE).is_file());
        Ok(())
    }

    #[test]
    fn hits_are_ordered_and_joined_to_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_statement(dir.path())?;
        let mut retriever = retriever(dir.path());

        let hits = retriever.search("Paneer Tikka", 5)?;

        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance <= hits[1].distance);
        let mut pages = hits.iter().map(|hit| hit.page).collect::<Vec<_>>();
        pages.sort_unstable();
        assert_eq!(pages, vec![0, 1]);

        assert_eq!(retriever.search("Paneer Tikka", 1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn existing_bundle_is_loaded_without_sources() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_statement(dir.path())?;
        retriever(dir.path()).ensure_ready()?;
        fs::remove_dir_all(dir.path().join("data"))?;

        let mut reopened = retriever(dir.path());
        assert_eq!(reopened.state(), &IndexState::Ready);
        assert_eq!(reopened.search("March", 5)?.len(), 2);
        Ok(())
    }

    #[test]
    fn ready_bundle_is_read_once_when_opened() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_statement(dir.path())?;
        retriever(dir.path()).ensure_ready()?;
        fs::remove_dir_all(dir.path().join("data"))?;

        let mut reopened = retriever(dir.path());
        assert_eq!(reopened.state(), &IndexState::Ready);
        fs::remove_dir_all(dir.path().join("faiss_index"))?;

        assert_eq!(reopened.search("March", 5)?.len(), 2);
        assert_eq!(reopened.state(), &IndexState::Ready);
        Ok(())
    }

    #[test]
    fn corrupt_bundle_is_rebuilt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_statement(dir.path())?;
        retriever(dir.path()).ensure_ready()?;
        fs::write(
            dir.path().join("faiss_index").join(DOCUMENTS_FILE),
            b"not json",
        )?;

        let mut reopened = retriever(dir.path());
        assert!(matches!(reopened.state(), IndexState::Corrupt(_)));

        assert_eq!(reopened.ensure_ready()?.documents.len(), 2);
        assert_eq!(reopened.state(), &IndexState::Ready);
        Ok(())
    }

    #[test]
    fn missing_sources_become_an_error_entry() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut retriever = retriever(dir.path());

        let results = retriever.search_documents("refund");

        assert_eq!(results.len(), 1);
        assert!(results[0].starts_with("ERROR: Failed to search: "));
        assert_eq!(retriever.state(), &IndexState::Absent);
        Ok(())
    }

    #[test]
    fn empty_index_reports_empty_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let data = dir.path().join("data");
        fs::create_dir_all(&data)?;
        fs::write(data.join("broken.pdf"), b"%PDF-1.4\n%broken")?;
        let mut retriever = retriever(dir.path());

        let result = retriever.search("refund", 5);

        assert!(matches!(
            result,
            Err(SearchError::Index(IndexError::EmptyIndex))
        ));
        assert_eq!(retriever.state(), &IndexState::Ready);
        let rendered = retriever.search_documents("refund");
        assert_eq!(rendered, vec!["ERROR: Failed to search: index is empty".to_string()]);
        Ok(())
    }

    #[test]
    fn blank_query_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut retriever = retriever(dir.path());
        assert!(matches!(
            retriever.search("   ", 5),
            Err(SearchError::Request(_))
        ));
        Ok(())
    }
}
