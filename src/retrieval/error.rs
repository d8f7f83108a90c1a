use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::vectordb::VectorDbError;

/// Retrieval is all-or-nothing: any of these means no evidence was returned.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid retrieval request: {reason}")]
    InvalidRequest { reason: String },

    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector query failed: {0}")]
    VectorDb(#[from] VectorDbError),

    #[error("vector query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl RetrievalError {
    /// Returns `true` if an external call exceeded its deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            RetrievalError::Timeout { .. } => true,
            RetrievalError::Embedding(e) => e.is_timeout(),
            _ => false,
        }
    }
}
