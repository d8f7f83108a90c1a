//! HTTP client helpers for tests.

use std::time::Duration;

use opponent::gateway::payload::{LinkResponse, RemoveResponse};
use opponent::gateway::{HealthResponse, OPPONENT_STATUS_HEADER, ReadyResponse};
use opponent::indexer::{IndexReport, ReconcileReport};
use opponent::reasoning::Critique;
use serde::de::DeserializeOwned;
use serde_json::Value;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestClient {
    client: reqwest::Client,
    base_url: String,
}

/// A response whose body has not been interpreted yet.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub status_header: String,
    pub body: String,
}

impl RawResponse {
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("unexpected body ({e}): {}", self.body))
    }
}

impl TestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url, path)
    }

    async fn read(resp: reqwest::Response) -> Result<RawResponse, TestClientError> {
        let status = resp.status().as_u16();
        let status_header = resp
            .headers()
            .get(OPPONENT_STATUS_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let body = resp.text().await?;
        Ok(RawResponse {
            status,
            status_header,
            body,
        })
    }

    pub async fn get(&self, path: &str) -> Result<RawResponse, TestClientError> {
        let resp = self.client.get(self.url(path)).send().await?;
        Self::read(resp).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<RawResponse, TestClientError> {
        let resp = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn post_ok<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, TestClientError> {
        let resp = self.post(path, body).await?;
        match resp.status {
            200 => Ok(resp.json()),
            400 => Err(TestClientError::BadRequest(resp.body)),
            status => Err(TestClientError::UnexpectedStatus(status, resp.body)),
        }
    }

    pub async fn health(&self) -> Result<HealthResponse, TestClientError> {
        let resp = self.get("/healthz").await?;
        match resp.status {
            200 => Ok(resp.json()),
            status => Err(TestClientError::UnexpectedStatus(status, resp.body)),
        }
    }

    /// Returns the readiness body for both 200 and 503.
    pub async fn ready(&self) -> Result<(u16, ReadyResponse), TestClientError> {
        let resp = self.get("/ready").await?;
        Ok((resp.status, resp.json()))
    }

    pub async fn index(&self) -> Result<IndexReport, TestClientError> {
        self.post_ok("/api/vault/index", &serde_json::json!({})).await
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, TestClientError> {
        self.post_ok("/api/vault/reconcile", &serde_json::json!({}))
            .await
    }

    pub async fn remove(&self, document_id: &str) -> Result<RemoveResponse, TestClientError> {
        self.post_ok(
            "/api/vault/remove",
            &serde_json::json!({ "document_id": document_id }),
        )
        .await
    }

    pub async fn find_links(
        &self,
        note_path: &str,
        note_content: &str,
        max_links: usize,
    ) -> Result<LinkResponse, TestClientError> {
        self.post_ok(
            "/api/links/find",
            &serde_json::json!({
                "note_path": note_path,
                "note_content": note_content,
                "max_links": max_links,
            }),
        )
        .await
    }

    pub async fn challenge(&self, body: &Value) -> Result<Critique, TestClientError> {
        self.post_ok("/api/opponent/challenge", body).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TestClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0} - Body: {1}")]
    UnexpectedStatus(u16, String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}
