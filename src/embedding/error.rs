use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("embedding request to '{url}' failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("invalid embedding response: {reason}")]
    InvalidResponse { reason: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid embedding configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl EmbeddingError {
    /// Returns `true` for errors worth one more attempt.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EmbeddingError::Timeout { .. })
    }
}
