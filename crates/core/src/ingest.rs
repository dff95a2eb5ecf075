use crate::chunking::{chunk_words, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, IngestError};
use crate::extractor::PdfExtractor;
use crate::models::{Document, PipelineConfig};
use crate::store::{BundleManifest, IndexStore};
use crate::stores::FlatL2Index;
use crate::traits::VectorIndex;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// PDFs directly inside `folder`, matched case-insensitively and sorted by path.
///
/// A folder that cannot be read is an error; an unreadable entry inside it is
/// logged and skipped.
pub fn discover_pdf_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();

    for item in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = match item {
            Ok(entry) => entry,
            Err(error) if error.depth() == 0 => return Err(io::Error::from(error).into()),
            Err(error) => {
                warn!(dir = %folder.display(), %error, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

/// A page (or window) whose embedding could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUnit {
    pub source: String,
    pub page: u32,
    pub chunk: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub files_processed: usize,
    pub documents_indexed: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub skipped_units: Vec<SkippedUnit>,
}

/// Documents, their embeddings and the index, aligned by ordinal.
#[derive(Debug)]
pub struct BuiltIndex {
    pub documents: Vec<Document>,
    pub embeddings: Vec<Vec<f32>>,
    pub index: FlatL2Index,
    pub report: BuildReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    NoPdfFiles,
    Built {
        report: BuildReport,
        manifest: BundleManifest,
    },
}

pub struct IndexBuilder<X, E> {
    extractor: X,
    embedder: E,
    chunking: Option<ChunkingConfig>,
}

impl<X: PdfExtractor, E: Embedder> IndexBuilder<X, E> {
    pub fn new(extractor: X, embedder: E) -> Self {
        Self {
            extractor,
            embedder,
            chunking: None,
        }
    }

    pub fn from_config(extractor: X, embedder: E, config: &PipelineConfig) -> Result<Self, IngestError> {
        let builder = Self::new(extractor, embedder);
        if config.chunk_on_build {
            builder.with_chunking(ChunkingConfig {
                size: config.chunk_size,
                overlap: config.chunk_overlap,
            })
        } else {
            Ok(builder)
        }
    }

    /// Embed overlapping word windows of each page instead of whole pages.
    pub fn with_chunking(mut self, config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        self.chunking = Some(config);
        Ok(self)
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn build(&self, paths: &[PathBuf]) -> Result<BuiltIndex, IngestError> {
        let mut report = BuildReport::default();
        let mut documents = Vec::new();
        let mut embeddings = Vec::new();
        let dimension = self.embedder.dimensions();

        for path in paths {
            let pages = match self.extractor.extract(path) {
                Ok(pages) => pages,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable pdf");
                    report.skipped_files.push(SkippedPdf {
                        path: path.clone(),
                        reason: error.to_string(),
                    });
                    continue;
                }
            };
            report.files_processed += 1;

            for unit in self.units(pages)? {
                let embedded = self.embedder.embed(&unit.content).and_then(|vector| {
                    if vector.len() == dimension {
                        Ok(vector)
                    } else {
                        Err(EmbeddingError::DimensionMismatch {
                            expected: dimension,
                            actual: vector.len(),
                        })
                    }
                });

                match embedded {
                    Ok(vector) => {
                        embeddings.push(vector);
                        documents.push(unit);
                    }
                    Err(error) => {
                        warn!(
                            path = %unit.metadata.source,
                            page = unit.metadata.page,
                            %error,
                            "embedding failed, unit left out of the index"
                        );
                        report.skipped_units.push(SkippedUnit {
                            source: unit.metadata.source,
                            page: unit.metadata.page,
                            chunk: unit.metadata.chunk,
                            reason: error.to_string(),
                        });
                    }
                }
            }
        }

        let mut index = FlatL2Index::new(dimension);
        if !embeddings.is_empty() {
            index
                .add(&embeddings)
                .map_err(|error| IngestError::InvalidArgument(error.to_string()))?;
        }
        report.documents_indexed = documents.len();

        info!(
            files = report.files_processed,
            documents = report.documents_indexed,
            skipped_files = report.skipped_files.len(),
            skipped_units = report.skipped_units.len(),
            "index built"
        );

        Ok(BuiltIndex {
            documents,
            embeddings,
            index,
            report,
        })
    }

    fn units(&self, pages: Vec<Document>) -> Result<Vec<Document>, IngestError> {
        let Some(config) = self.chunking else {
            return Ok(pages);
        };

        let mut units = Vec::new();
        for page in pages {
            for (position, window) in chunk_words(&page.content, config)?.enumerate() {
                let mut metadata = page.metadata.clone();
                metadata.chunk = Some(position);
                units.push(Document {
                    content: window,
                    metadata,
                });
            }
        }
        Ok(units)
    }

    /// Builds from every PDF in `pdf_dir` and publishes the bundle to `store`.
    pub fn process_documents(
        &self,
        pdf_dir: &Path,
        store: &IndexStore,
    ) -> Result<ProcessOutcome, IngestError> {
        let files = discover_pdf_files(pdf_dir)?;
        if files.is_empty() {
            warn!(dir = %pdf_dir.display(), "no pdf files found");
            return Ok(ProcessOutcome::NoPdfFiles);
        }
        info!(dir = %pdf_dir.display(), files = files.len(), "building index");

        let built = self.build(&files)?;
        let manifest = store.save(
            &built.documents,
            &built.embeddings,
            &built.index,
            self.embedder.model(),
        )?;

        Ok(ProcessOutcome::Built {
            report: built.report,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::fixtures::{write_pdf, FixturePage};
    use crate::extractor::LopdfExtractor;
    use crate::links::NoopLinkScraper;
    use std::fs;
    use tempfile::tempdir;

    fn page<'a>(lines: &'a [&'a str], with_table: bool) -> FixturePage<'a> {
        FixturePage {
            lines,
            with_table,
            link: None,
        }
    }

    fn builder() -> IndexBuilder<LopdfExtractor<NoopLinkScraper>, CharacterNgramEmbedder> {
        IndexBuilder::new(
            LopdfExtractor::new(NoopLinkScraper),
            CharacterNgramEmbedder { dimensions: 64 },
        )
    }

    struct RefusingEmbedder;

    impl Embedder for RefusingEmbedder {
        fn dimensions(&self) -> usize {
            64
        }

        fn model(&self) -> &str {
            "refusing"
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Malformed("service unavailable".to_string()))
        }
    }

    #[test]
    fn discovery_is_flat_sorted_and_case_insensitive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("b.PDF"), b"%PDF-1.4\n%fake")?;
        fs::write(base.join("a.pdf"), b"%PDF-1.4\n%fake")?;
        fs::write(base.join("notes.txt"), b"not a pdf")?;
        fs::write(nested.join("c.pdf"), b"%PDF-1.4\n%fake")?;

        let names = discover_pdf_files(base)?
            .iter()
            .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
        Ok(())
    }

    #[test]
    fn unreadable_pdf_folder_is_an_io_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let missing = dir.path().join("missing");

        assert!(matches!(discover_pdf_files(&missing), Err(IngestError::Io(_))));

        let store = IndexStore::new(dir.path().join("faiss_index"));
        assert!(matches!(
            builder().process_documents(&missing, &store),
            Err(IngestError::Io(_))
        ));
        assert!(!store.dir().exists());
        Ok(())
    }

    #[test]
    fn builds_one_document_per_page_aligned_with_the_index() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let path = dir.path().join("march.pdf");
        write_pdf(
            &path,
            &[
                page(&["Statement for March"], false),
                page(&["Order history"], true),
            ],
        )?;

        let built = builder().build(&[path])?;

        assert_eq!(built.documents.len(), 2);
        assert_eq!(built.embeddings.len(), 2);
        assert_eq!(built.index.len(), 2);
        assert_eq!(built.report.documents_indexed, 2);
        assert!(built.documents[1].metadata.has_tables);

        let hits = built.index.search(&built.embeddings[1], 1)?;
        assert_eq!(hits[0].ordinal, 1);
        Ok(())
    }

    #[test]
    fn unreadable_pdfs_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = dir.path().join("good.pdf");
        let broken = dir.path().join("broken.pdf");
        write_pdf(&good, &[page(&["Statement"], false)])?;
        fs::write(&broken, b"%PDF-1.4\n%broken")?;

        let built = builder().build(&[broken.clone(), good])?;

        assert_eq!(built.documents.len(), 1);
        assert_eq!(built.report.files_processed, 1);
        assert_eq!(built.report.skipped_files.len(), 1);
        assert_eq!(built.report.skipped_files[0].path, broken);
        Ok(())
    }

    #[test]
    fn failed_embeddings_drop_only_that_unit() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("march.pdf");
        write_pdf(&path, &[page(&["Statement"], false), page(&["Orders"], true)])?;

        let builder = IndexBuilder::new(LopdfExtractor::new(NoopLinkScraper), RefusingEmbedder);
        let built = builder.build(&[path])?;

        assert!(built.documents.is_empty());
        assert!(built.index.is_empty());
        assert_eq!(built.index.dimension(), 64);
        assert_eq!(built.report.skipped_units.len(), 2);
        assert_eq!(built.report.skipped_units[1].page, 1);
        Ok(())
    }

    #[test]
    fn chunking_splits_pages_into_tagged_windows() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("march.pdf");
        write_pdf(&path, &[page(&["Statement"], true)])?;

        let built = builder()
            .with_chunking(ChunkingConfig { size: 4, overlap: 1 })?
            .build(&[path])?;

        assert!(built.documents.len() > 1);
        for (position, document) in built.documents.iter().enumerate() {
            assert_eq!(document.metadata.chunk, Some(position));
            assert_eq!(document.metadata.page, 0);
            assert!(document.content.split_whitespace().count() <= 4);
        }
        Ok(())
    }

    #[test]
    fn invalid_chunking_is_rejected() {
        let result = builder().with_chunking(ChunkingConfig { size: 4, overlap: 4 });
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn process_documents_publishes_a_loadable_bundle() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdfs = dir.path().join("data");
        fs::create_dir(&pdfs)?;
        write_pdf(&pdfs.join("march.pdf"), &[page(&["Statement"], true)])?;
        let store = IndexStore::new(dir.path().join("faiss_index"));

        let outcome = builder().process_documents(&pdfs, &store)?;
        let ProcessOutcome::Built { report, manifest } = outcome else {
            panic!("expected a build");
        };
        assert_eq!(report.documents_indexed, 1);
        assert_eq!(manifest.model, "char-trigram");

        let loaded = store.load()?;
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.index.dimension(), 64);
        Ok(())
    }

    #[test]
    fn process_documents_without_pdfs_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("faiss_index"));

        let outcome = builder().process_documents(dir.path(), &store)?;

        assert_eq!(outcome, ProcessOutcome::NoPdfFiles);
        assert!(!store.dir().exists());
        Ok(())
    }
}
