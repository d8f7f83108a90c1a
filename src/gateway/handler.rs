use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::error::GatewayError;
use super::payload::{
    ChallengeRequest, LinkRequest, LinkResponse, RemoveRequest, RemoveResponse, VaultRequest,
};
use super::state::AppState;
use super::{OPPONENT_STATUS_HEADER, OPPONENT_STATUS_OK};
use crate::embedding::EmbeddingGateway;
use crate::linking::{SuggestedLink, summarize_links};
use crate::reasoning::LanguageModel;
use crate::vault::DocumentSource;
use crate::vectordb::VectorDbClient;

fn parse_request<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, GatewayError> {
    serde_json::from_value(value)
        .map_err(|e| GatewayError::InvalidRequest(format!("Invalid request schema: {e}")))
}

fn make_response<T: Serialize>(body: T) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        OPPONENT_STATUS_HEADER,
        HeaderValue::from_static(OPPONENT_STATUS_OK),
    );
    (StatusCode::OK, headers, Json(body)).into_response()
}

#[instrument(skip(state, request))]
pub async fn index_handler<E, V, L, D>(
    State(state): State<AppState<E, V, L, D>>,
    Json(request): Json<serde_json::Value>,
) -> Result<Response, GatewayError>
where
    E: EmbeddingGateway + 'static,
    V: VectorDbClient + 'static,
    L: LanguageModel + 'static,
    D: DocumentSource,
{
    let request: VaultRequest = parse_request(request)?;
    let root = request
        .vault_path
        .unwrap_or_else(|| state.service.vault_path().to_path_buf());

    let report = state.service.index_corpus(&root).await?;
    Ok(make_response(report))
}

#[instrument(skip(state, request))]
pub async fn reconcile_handler<E, V, L, D>(
    State(state): State<AppState<E, V, L, D>>,
    Json(request): Json<serde_json::Value>,
) -> Result<Response, GatewayError>
where
    E: EmbeddingGateway + 'static,
    V: VectorDbClient + 'static,
    L: LanguageModel + 'static,
    D: DocumentSource,
{
    let request: VaultRequest = parse_request(request)?;
    let root = request
        .vault_path
        .unwrap_or_else(|| state.service.vault_path().to_path_buf());

    let report = state.service.reconcile(&root).await?;
    Ok(make_response(report))
}

#[instrument(skip(state, request))]
pub async fn remove_handler<E, V, L, D>(
    State(state): State<AppState<E, V, L, D>>,
    Json(request): Json<serde_json::Value>,
) -> Result<Response, GatewayError>
where
    E: EmbeddingGateway + 'static,
    V: VectorDbClient + 'static,
    L: LanguageModel + 'static,
    D: DocumentSource,
{
    let request: RemoveRequest = parse_request(request)?;
    if request.document_id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "document_id must not be empty".to_string(),
        ));
    }

    let removed = state.service.remove_document(&request.document_id).await?;
    Ok(make_response(RemoveResponse {
        document_id: request.document_id,
        removed,
    }))
}

#[instrument(skip(state, request))]
pub async fn find_links_handler<E, V, L, D>(
    State(state): State<AppState<E, V, L, D>>,
    Json(request): Json<serde_json::Value>,
) -> Result<Response, GatewayError>
where
    E: EmbeddingGateway + 'static,
    V: VectorDbClient + 'static,
    L: LanguageModel + 'static,
    D: DocumentSource,
{
    let request: LinkRequest = parse_request(request)?;
    let max_links = request.validate(state.service.default_max_results())?;

    let items = state
        .service
        .find_links(&request.note_content, &request.note_path, max_links)
        .await?;
    debug!(links = items.len(), "Links found");

    Ok(make_response(LinkResponse {
        summary: summarize_links(&items),
        count: items.len(),
        suggested_links: items.iter().map(SuggestedLink::from).collect(),
        note_path: request.note_path,
    }))
}

#[instrument(skip(state, request))]
pub async fn challenge_handler<E, V, L, D>(
    State(state): State<AppState<E, V, L, D>>,
    Json(request): Json<serde_json::Value>,
) -> Result<Response, GatewayError>
where
    E: EmbeddingGateway + 'static,
    V: VectorDbClient + 'static,
    L: LanguageModel + 'static,
    D: DocumentSource,
{
    let request: ChallengeRequest = parse_request(request)?;
    let max_evidence = request.validate(state.service.default_max_results())?;
    let context = request.context.as_deref();

    let critique = match request.note_path() {
        Some(note_path) => {
            state
                .service
                .challenge_note(&request.note_content, context, max_evidence, note_path)
                .await?
        }
        None => {
            state
                .service
                .challenge(&request.note_content, context, max_evidence)
                .await?
        }
    };

    Ok(make_response(critique))
}
