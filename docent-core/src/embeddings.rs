//! Pluggable embedding providers.
//!
//! Provides a trait-based abstraction over embedding models, with an
//! implementation for the Ollama embed API and a local hashed
//! term-frequency embedder that needs no service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{ConfigError, EmbeddingError};

/// Converts text into fixed-dimension vectors.
///
/// Every vector returned by one call has the same length, and the length is
/// stable across calls for a given provider configuration.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of document texts, one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// The dimension, when known without calling the model.
    fn dimensions(&self) -> Option<usize>;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Check the shape of a provider response against its request.
pub fn validate_batch(expected: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: vectors.len(),
        });
    }
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    if first.is_empty() {
        return Err(EmbeddingError::Empty);
    }
    if let Some(other) = vectors.iter().find(|v| v.len() != first.len()) {
        return Err(EmbeddingError::InconsistentDimensions {
            first: first.len(),
            other: other.len(),
        });
    }
    Ok(())
}

/// Local hashed term-frequency embedder, L2 normalized.
///
/// Deterministic and dependency-free; useful for tests and offline indexes.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed(text))
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    base_url: String,
    query_prefix: String,
    document_prefix: String,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build embedding HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            query_prefix: config.query_prefix.clone(),
            document_prefix: config.document_prefix.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn embed_api_call(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = input.len();
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input,
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), model = %self.model, "Ollama embedding request rejected");
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::ResponseParse {
                message: e.to_string(),
            })?;
        validate_batch(expected, &parsed.embeddings)?;
        debug!(count = expected, model = %self.model, "Embedded batch");
        Ok(parsed.embeddings)
    }

    fn request_error(&self, e: reqwest::Error) -> EmbeddingError {
        if e.is_timeout() {
            EmbeddingError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            EmbeddingError::Request {
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input = texts
            .iter()
            .map(|t| format!("{}{}", self.document_prefix, t))
            .collect();
        self.embed_api_call(input).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = vec![format!("{}{}", self.query_prefix, text)];
        self.embed_api_call(input)
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::Empty)
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

/// Build the embedding provider named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    config.validate()?;
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalEmbedder::new(config.dimensions))),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => Err(ConfigError::Invalid {
            message: format!("unknown embedding provider '{other}'"),
        }),
    }
}
