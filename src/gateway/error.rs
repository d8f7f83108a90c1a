use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use super::OPPONENT_STATUS_HEADER;
use crate::indexer::IndexError;
use crate::reasoning::ReasoningError;
use crate::retrieval::RetrievalError;

/// Message returned when the model never produced a parseable critique.
pub const FORMAT_FAILURE_MESSAGE: &str =
    "could not produce a grounded critique for this claim; please try again";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("indexing failed: {0}")]
    Index(#[from] IndexError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("challenge failed: {0}")]
    Reasoning(#[from] ReasoningError),
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

fn classify_retrieval(err: &RetrievalError) -> (StatusCode, &'static str) {
    match err {
        RetrievalError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
        e if e.is_timeout() => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        RetrievalError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_error"),
        RetrievalError::VectorDb(_) | RetrievalError::Timeout { .. } => {
            (StatusCode::BAD_GATEWAY, "vectordb_error")
        }
    }
}

impl GatewayError {
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            GatewayError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request", self.to_string())
            }
            GatewayError::Index(IndexError::Config(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_vault", self.to_string())
            }
            GatewayError::Index(IndexError::VectorDb(_)) => {
                (StatusCode::BAD_GATEWAY, "vectordb_error", self.to_string())
            }
            GatewayError::Index(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "index_error",
                self.to_string(),
            ),
            GatewayError::Retrieval(e) | GatewayError::Reasoning(ReasoningError::Retrieval(e)) => {
                let (status, tag) = classify_retrieval(e);
                (status, tag, self.to_string())
            }
            GatewayError::Reasoning(ReasoningError::InvalidRequest { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_request", self.to_string())
            }
            GatewayError::Reasoning(ReasoningError::GatewayTimeout { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
            }
            GatewayError::Reasoning(ReasoningError::Generation(_)) => {
                (StatusCode::BAD_GATEWAY, "generation_error", self.to_string())
            }
            GatewayError::Reasoning(ReasoningError::Format { .. }) => (
                StatusCode::BAD_GATEWAY,
                "format_error",
                FORMAT_FAILURE_MESSAGE.to_string(),
            ),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, opponent_status, error_message) = self.classify();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            OPPONENT_STATUS_HEADER,
            HeaderValue::from_static(opponent_status),
        );

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, headers, body).into_response()
    }
}
