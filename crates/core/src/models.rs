use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_EMBEDDING_ENDPOINT: &str = "http://localhost:11434/api/embeddings";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_TOP_K: usize = 5;

pub const DOCUMENT_TYPE_STATEMENT: &str = "statement";

/// Row and column count of one detected table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableShape {
    pub row_count: usize,
    pub col_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub source: String,
    pub page: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub has_tables: bool,
    pub table_count: usize,
    pub link_count: usize,
    #[serde(default)]
    pub tables: Vec<TableShape>,
    /// Window ordinal within the page when build-time chunking is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
}

/// One page of extracted content, the unit that gets embedded and indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// A search result joined back to its document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub ordinal: usize,
    pub distance: f32,
    pub content: String,
    pub source: String,
    pub page: u32,
}

impl SearchHit {
    pub fn render(&self) -> String {
        format!("{}\n[Source: {}]", self.content, self.source)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub embedding_endpoint: String,
    pub model: String,
    pub dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Embed word windows instead of whole pages.
    pub chunk_on_build: bool,
    pub top_k: usize,
    pub index_dir: PathBuf,
    pub source_dir: PathBuf,
    /// No timeout when `None`; a hung service blocks the caller.
    pub request_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_endpoint: DEFAULT_EMBEDDING_ENDPOINT.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: 768,
            chunk_size: 256,
            chunk_overlap: 40,
            chunk_on_build: false,
            top_k: DEFAULT_TOP_K,
            index_dir: PathBuf::from("faiss_index"),
            source_dir: PathBuf::from("data"),
            request_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_serializes_type_field_and_omits_missing_chunk() -> Result<(), serde_json::Error> {
        let metadata = DocumentMetadata {
            source: "data/march.pdf".to_string(),
            page: 1,
            kind: DOCUMENT_TYPE_STATEMENT.to_string(),
            has_tables: true,
            table_count: 1,
            link_count: 0,
            tables: vec![TableShape {
                row_count: 3,
                col_count: 2,
            }],
            chunk: None,
        };

        let value = serde_json::to_value(&metadata)?;
        assert_eq!(value["type"], "statement");
        assert_eq!(value["tables"][0]["row_count"], 3);
        assert!(value.get("chunk").is_none());
        Ok(())
    }

    #[test]
    fn hit_renders_source_trailer() {
        let hit = SearchHit {
            ordinal: 0,
            distance: 0.0,
            content: "Order #42 total 310.00".to_string(),
            source: "data/march.pdf".to_string(),
            page: 2,
        };
        assert_eq!(hit.render(), "Order #42 total 310.00\n[Source: data/march.pdf]");
    }
}
