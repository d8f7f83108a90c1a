use thiserror::Error;

use crate::retrieval::RetrievalError;

/// Language-model call failures.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat request to model '{model}' failed: {reason}")]
    RequestFailed { model: String, reason: String },

    #[error("model '{model}' returned no text")]
    EmptyResponse { model: String },
}

/// Errors from [`AdversarialReasoner::challenge`](super::AdversarialReasoner::challenge).
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("invalid challenge request: {reason}")]
    InvalidRequest { reason: String },

    #[error("evidence retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Generation exceeded its deadline. Not retried.
    #[error("generation timed out after {timeout_ms}ms")]
    GatewayTimeout { timeout_ms: u64 },

    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    /// The model's output could not be parsed, even after a reformat request.
    #[error("model output did not follow the critique format: {reason}")]
    Format { reason: String },
}

impl ReasoningError {
    /// Returns `true` if any external call exceeded its deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            ReasoningError::GatewayTimeout { .. } => true,
            ReasoningError::Retrieval(e) => e.is_timeout(),
            _ => false,
        }
    }
}
