//! Embedder backed by an Ollama-compatible `/api/embed` endpoint.
//!
//! Use [`EmbedderConfig::stub`] for tests and offline runs.

use std::sync::Arc;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingGateway;
use crate::embedding::config::EmbedderConfig;
use crate::embedding::error::EmbeddingError;
use crate::hashing::{hash_text, hash_to_u64};

enum EmbedderBackend {
    Ollama {
        client: reqwest::Client,
        endpoint: String,
    },
    Stub,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Text embedder with a small in-memory cache.
pub struct Embedder {
    backend: EmbedderBackend,
    cache: Option<Cache<u64, Arc<Vec<f32>>>>,
    config: EmbedderConfig,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field(
                "backend",
                &match &self.backend {
                    EmbedderBackend::Ollama { endpoint, .. } => format!("Ollama({endpoint})"),
                    EmbedderBackend::Stub => "Stub".to_string(),
                },
            )
            .field("model", &self.config.model)
            .field("embedding_dim", &self.config.embedding_dim)
            .finish()
    }
}

impl Embedder {
    /// Builds the embedder from a config (stub mode is supported).
    pub fn load(config: EmbedderConfig) -> Result<Self, EmbeddingError> {
        config.validate()?;

        let cache = (config.cache_capacity > 0)
            .then(|| Cache::builder().max_capacity(config.cache_capacity).build());

        if config.testing_stub {
            warn!("Embedder running in STUB mode (hashed bag-of-words vectors)");
            return Ok(Self {
                backend: EmbedderBackend::Stub,
                cache,
                config,
            });
        }

        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig {
                reason: format!("failed to build http client: {e}"),
            })?;
        let endpoint = config.endpoint();

        info!(
            endpoint = %endpoint,
            model = %config.model,
            embedding_dim = config.embedding_dim,
            "Embedder configured"
        );

        Ok(Self {
            backend: EmbedderBackend::Ollama { client, endpoint },
            cache,
            config,
        })
    }

    /// Returns `true` if running in stub mode.
    pub fn is_stub(&self) -> bool {
        matches!(self.backend, EmbedderBackend::Stub)
    }

    /// Returns the embedder configuration.
    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }

    async fn embed_uncached(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match &self.backend {
            EmbedderBackend::Ollama { client, endpoint } => {
                self.embed_remote(client, endpoint, text).await
            }
            EmbedderBackend::Stub => Ok(hashed_bag_of_words(text, self.config.embedding_dim)),
        }
    }

    async fn embed_remote(
        &self,
        client: &reqwest::Client,
        endpoint: &str,
        text: &str,
    ) -> Result<Vec<f32>, EmbeddingError> {
        debug!(text_len = text.len(), "Requesting embedding");

        let request_failed = |e: reqwest::Error| EmbeddingError::RequestFailed {
            url: endpoint.to_string(),
            reason: e.to_string(),
        };

        let response = client
            .post(endpoint)
            .json(&EmbedRequest {
                model: &self.config.model,
                input: text,
            })
            .send()
            .await
            .map_err(request_failed)?
            .error_for_status()
            .map_err(request_failed)?;

        let body: EmbedResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        let embedding =
            body.embeddings
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::InvalidResponse {
                    reason: "response contained no embeddings".to_string(),
                })?;

        if embedding.len() != self.config.embedding_dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.config.embedding_dim,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }
}

impl EmbeddingGateway for Embedder {
    fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let key = hash_text(text);

        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key)
        {
            return Ok(hit.as_ref().clone());
        }

        let embedding = self.embed_uncached(text).await?;

        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::new(embedding.clone()));
        }

        Ok(embedding)
    }
}

/// Deterministic feature-hashing embedding.
///
/// Each lowercase alphanumeric token is hashed to a signed bucket, so texts
/// sharing vocabulary score a positive cosine similarity. The result is
/// L2-normalised. Text without tokens maps to a single hashed bucket.
pub fn hashed_bag_of_words(text: &str, dim: usize) -> Vec<f32> {
    let mut embedding = vec![0.0f32; dim];
    if dim == 0 {
        return embedding;
    }

    let mut any_token = false;
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        let hash = hash_to_u64(token.as_bytes());
        let bucket = (hash % dim as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign;
        any_token = true;
    }

    if !any_token {
        let bucket = (hash_text(text) % dim as u64) as usize;
        embedding[bucket] = 1.0;
    }

    normalize(&mut embedding);
    embedding
}

fn normalize(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in embedding.iter_mut() {
            *x /= norm;
        }
    }
}
