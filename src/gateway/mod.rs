//! HTTP gateway (Axum) over [`OpponentService`](crate::service::OpponentService).
//!
//! This module is primarily used by the `opponent` server binary.

pub mod error;
pub mod handler;
pub mod payload;
pub mod state;


use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header, header::HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::GatewayError;
pub use handler::{
    challenge_handler, find_links_handler, index_handler, reconcile_handler, remove_handler,
};
pub use state::AppState;

use crate::embedding::EmbeddingGateway;
use crate::reasoning::LanguageModel;
use crate::vault::DocumentSource;
use crate::vectordb::VectorDbClient;

pub const OPPONENT_STATUS_HEADER: &str = "X-Opponent-Status";
pub const OPPONENT_STATUS_OK: &str = "ok";
pub const OPPONENT_STATUS_HEALTHY: &str = "healthy";
pub const OPPONENT_STATUS_READY: &str = "ready";
pub const OPPONENT_STATUS_NOT_READY: &str = "not_ready";

pub fn create_router_with_state<E, V, L, D>(
    state: AppState<E, V, L, D>,
    cors_origins: &[String],
) -> Router
where
    E: EmbeddingGateway + 'static,
    V: VectorDbClient + 'static,
    L: LanguageModel + 'static,
    D: DocumentSource,
{
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/api/vault/index", post(index_handler))
        .route("/api/vault/remove", post(remove_handler))
        .route("/api/vault/reconcile", post(reconcile_handler))
        .route("/api/links/find", post(find_links_handler))
        .route("/api/opponent/challenge", post(challenge_handler))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` allows any origin; unparseable origins are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct ReadyResponse {
    pub status: String,
    pub vectordb: String,
    pub model: String,
}

#[tracing::instrument]
pub async fn health_handler() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        OPPONENT_STATUS_HEADER,
        HeaderValue::from_static(OPPONENT_STATUS_HEALTHY),
    );

    (
        StatusCode::OK,
        headers,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
        .into_response()
}

#[tracing::instrument(skip(state))]
pub async fn ready_handler<E, V, L, D>(State(state): State<AppState<E, V, L, D>>) -> Response
where
    E: EmbeddingGateway + 'static,
    V: VectorDbClient + 'static,
    L: LanguageModel + 'static,
    D: DocumentSource,
{
    let is_ready = state.service.is_ready();
    let (status_code, status) = if is_ready {
        (StatusCode::OK, OPPONENT_STATUS_READY)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, OPPONENT_STATUS_NOT_READY)
    };

    let mut headers = HeaderMap::new();
    headers.insert(OPPONENT_STATUS_HEADER, HeaderValue::from_static(status));

    (
        status_code,
        headers,
        Json(ReadyResponse {
            status: status.to_string(),
            vectordb: if is_ready { "ready" } else { "pending" }.to_string(),
            model: state.service.model_name().to_string(),
        }),
    )
        .into_response()
}
