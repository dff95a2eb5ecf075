use crate::error::EmbeddingError;
use crate::models::PipelineConfig;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT: usize = 768;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

pub trait Embedder {
    fn dimensions(&self) -> usize;
    fn model(&self) -> &str;
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

impl<T: Embedder + ?Sized> Embedder for &T {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text)
    }
}

/// Offline embedder hashing character trigrams into buckets. Deterministic,
/// so the same text always lands on the same vector.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        "char-trigram"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Option<Vec<f32>>,
}

/// Blocking client for an Ollama-style `/api/embeddings` endpoint.
/// One request per text; no batching, caching or retry.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(None::<Duration>).build()?;
        Ok(Self::with_client(client, endpoint, model, dimensions))
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(
            client,
            config.embedding_endpoint.clone(),
            config.model.clone(),
            config.dimension,
        ))
    }

    fn with_client(
        client: Client,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            dimensions,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Status {
                endpoint: self.endpoint.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text()?;
        let payload: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|error| EmbeddingError::Malformed(error.to_string()))?;
        let embedding = payload
            .embedding
            .ok_or_else(|| EmbeddingError::Malformed("response has no `embedding` field".to_string()))?;

        if embedding.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }
}
