//! Test server harness.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use opponent::embedding::MockEmbedder;
use opponent::gateway::{AppState, create_router_with_state};
use opponent::reasoning::MockLanguageModel;
use opponent::vectordb::MockVectorDbClient;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::fixtures::{VaultFixture, mock_service, test_config};

const STARTUP_WAIT_TIMEOUT_SECS: u64 = 5;
const STARTUP_POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, Default)]
pub struct TestServerConfig {
    /// Scripted model replies, consumed in order.
    pub responses: Vec<String>,
    /// Seed the vault with the standard notes.
    pub seeded: bool,
}

impl TestServerConfig {
    pub fn seeded() -> Self {
        Self {
            seeded: true,
            ..Self::default()
        }
    }

    pub fn with_responses<I, S>(mut self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses = responses.into_iter().map(Into::into).collect();
        self
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub vault: VaultFixture,
    pub db: Arc<MockVectorDbClient>,
    pub embedder: Arc<MockEmbedder>,
    pub model: Arc<MockLanguageModel>,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerStartupError {
    #[error("Server failed to start within timeout")]
    Timeout,
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

pub async fn wait_for_server_ready(
    addr: SocketAddr,
    timeout: Duration,
    interval: Duration,
) -> Result<(), ServerStartupError> {
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(ServerStartupError::Timeout);
        }

        match tokio::net::TcpStream::connect(addr).await {
            Ok(_) => return Ok(()),
            Err(_) => tokio::time::sleep(interval).await,
        }
    }
}

/// Spawns a server on an ephemeral port with every external dependency mocked:
/// the vector index, the embedder and the language model.
pub async fn spawn_test_server(config: TestServerConfig) -> Result<TestServer, ServerStartupError> {
    let vault = if config.seeded {
        VaultFixture::seeded()
    } else {
        VaultFixture::new()
    };

    let service_config = test_config(vault.path());

    let responses: Vec<&str> = config.responses.iter().map(String::as_str).collect();
    let fixture = mock_service(&service_config, &responses);

    let app = create_router_with_state(
        AppState::new(Arc::clone(&fixture.service)),
        &service_config.cors_origins,
    );

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    wait_for_server_ready(
        local_addr,
        Duration::from_secs(STARTUP_WAIT_TIMEOUT_SECS),
        Duration::from_millis(STARTUP_POLL_INTERVAL_MS),
    )
    .await?;

    Ok(TestServer {
        addr: local_addr,
        vault,
        db: fixture.db,
        embedder: fixture.embedder,
        model: fixture.model,
        _server_handle: server_handle,
        shutdown_tx: Some(shutdown_tx),
    })
}
