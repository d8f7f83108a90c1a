//! Text embedding.
//!
//! - [`Embedder`] talks to an Ollama-compatible model server (or a stub).
//! - [`embed_with_retry`] applies the per-call timeout and the single retry.

/// Embedder configuration.
pub mod config;
mod embedder;
mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use config::{DEFAULT_EMBEDDING_CACHE_CAPACITY, EmbedderConfig};
pub use embedder::{Embedder, hashed_bag_of_words};
pub use error::EmbeddingError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbedder;

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Converts text into a fixed-size vector.
pub trait EmbeddingGateway: Send + Sync {
    /// Output dimension of every vector this gateway returns.
    fn embedding_dim(&self) -> usize;

    /// Embeds a single string.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EmbeddingError>> + Send;
}

/// Embeds `text` under `timeout`, retrying once after `backoff` if the first
/// attempt times out. Other errors are returned as-is.
pub async fn embed_with_retry<E: EmbeddingGateway>(
    gateway: &E,
    text: &str,
    timeout: Duration,
    backoff: Duration,
) -> Result<Vec<f32>, EmbeddingError> {
    match embed_once(gateway, text, timeout).await {
        Err(e) if e.is_timeout() => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Embedding timed out, retrying once"
            );
            tokio::time::sleep(backoff).await;
            embed_once(gateway, text, timeout).await
        }
        other => other,
    }
}

async fn embed_once<E: EmbeddingGateway>(
    gateway: &E,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>, EmbeddingError> {
    let embedding = tokio::time::timeout(timeout, gateway.embed(text))
        .await
        .map_err(|_| EmbeddingError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })??;

    if embedding.len() != gateway.embedding_dim() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: gateway.embedding_dim(),
            actual: embedding.len(),
        });
    }

    Ok(embedding)
}
