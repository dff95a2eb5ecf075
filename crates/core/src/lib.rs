pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod links;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod stores;
pub mod tables;
pub mod traits;

pub use chunking::{chunk_words, ChunkingConfig, WordWindows};
pub use embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    EmbeddingError, IndexError, IngestError, ScrapeError, SearchError, StoreError, TableError,
};
pub use extractor::{compose_content, LopdfExtractor, PdfExtractor};
pub use ingest::{
    discover_pdf_files, BuildReport, BuiltIndex, IndexBuilder, ProcessOutcome, SkippedPdf,
    SkippedUnit,
};
pub use links::{html_to_text, HttpLinkScraper, LinkScraper, NoopLinkScraper};
pub use models::{
    Document, DocumentMetadata, PipelineConfig, SearchHit, TableShape, DEFAULT_EMBEDDING_ENDPOINT,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_TOP_K,
};
pub use orchestrator::{IndexState, Retriever};
pub use store::{BundleManifest, BundleStatus, IndexStore, LoadedIndex};
pub use stores::{FlatL2Index, Metric};
pub use tables::{format_tables, parse_to_unicode, FontDecoder, PageFonts, Table, TableSettings};
pub use traits::{Neighbor, VectorIndex};
