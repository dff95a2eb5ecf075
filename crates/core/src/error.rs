use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raised while detecting tables on a single page. Never fatal for the page.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("page content could not be read: {0}")]
    Content(String),

    #[error("malformed operand for `{operator}`")]
    Operand { operator: String },
}

/// Raised while fetching or sanitizing a linked page. Never fatal for the page.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("unsupported link target: {0}")]
    UnsupportedUri(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{uri} returned {status}")]
    Status { uri: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding service unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding request to {endpoint} returned {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("index is empty")]
    EmptyIndex,

    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("index bundle is missing {0}")]
    MissingIndex(String),

    #[error("index bundle is corrupt: {0}")]
    CorruptIndex(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("index not available yet: {0}")]
    NotReady(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
