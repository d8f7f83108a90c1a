use crate::config::{Config, DEFAULT_EMBEDDING_URL};
use crate::constants::DEFAULT_EMBEDDING_DIM;
use crate::embedding::error::EmbeddingError;

/// Default number of cached text embeddings.
pub const DEFAULT_EMBEDDING_CACHE_CAPACITY: u64 = 1_024;

#[derive(Debug, Clone)]
/// Configuration for [`Embedder`](super::Embedder).
pub struct EmbedderConfig {
    /// Ollama base URL (the `/api/embed` path is appended).
    pub url: String,
    /// Embedding model name.
    pub model: String,
    /// Expected output dimension.
    pub embedding_dim: usize,
    /// Entries kept in the in-memory embedding cache (0 disables it).
    pub cache_capacity: u64,
    /// If true, use the deterministic hashing backend (no model server required).
    pub testing_stub: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_EMBEDDING_URL.to_string(),
            model: "nomic-embed-text".to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            cache_capacity: DEFAULT_EMBEDDING_CACHE_CAPACITY,
            testing_stub: false,
        }
    }
}

impl EmbedderConfig {
    /// Builds the embedder settings from the server config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.embedding_url.clone(),
            model: config.embedding_model.clone(),
            embedding_dim: config.embedding_dim,
            testing_stub: config.embedding_stub,
            ..Default::default()
        }
    }

    /// Creates a stub config with the given dimension.
    pub fn stub(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            testing_stub: true,
            ..Default::default()
        }
    }

    /// Full URL of the embed endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/api/embed", self.url.trim_end_matches('/'))
    }

    /// Validates required fields for the selected backend.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.embedding_dim == 0 {
            return Err(EmbeddingError::InvalidConfig {
                reason: "embedding_dim must be greater than zero".to_string(),
            });
        }

        if self.testing_stub {
            return Ok(());
        }

        if self.url.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig {
                reason: "embedding url is required (stubbing is disabled)".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig {
                reason: "embedding model is required (stubbing is disabled)".to_string(),
            });
        }

        Ok(())
    }
}
