//! Opponent HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use opponent::config::Config;
use opponent::embedding::{Embedder, EmbedderConfig};
use opponent::gateway::{AppState, create_router_with_state};
use opponent::reasoning::GenaiModel;
use opponent::service::OpponentService;
use opponent::vault::MarkdownVault;
use opponent::vectordb::QdrantClient;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check().await);
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        vault = %config.vault_path.display(),
        collection = %config.collection_name,
        model = %config.llm_model,
        "Opponent starting"
    );

    let embedder = Embedder::load(EmbedderConfig::from_config(&config))?;
    if embedder.is_stub() {
        tracing::warn!("Retrieval quality is meaningless with the stub embedder");
    }

    let vectordb = QdrantClient::new(&config.qdrant_url).await?;
    let model = GenaiModel::from_config(&config);

    let service = Arc::new(OpponentService::new(
        Arc::new(embedder),
        Arc::new(vectordb),
        Arc::new(model),
        Arc::new(MarkdownVault::new()),
        &config,
    )?);

    if let Err(e) = service.initialize().await {
        tracing::warn!(error = %e, "Vector index not ready yet; /ready will report pending");
    }

    if config.index_on_startup {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let root = service.vault_path().to_path_buf();
            match service.index_corpus(&root).await {
                Ok(report) => tracing::info!(
                    indexed = report.documents_indexed,
                    unchanged = report.documents_unchanged,
                    failed = report.documents_failed,
                    "Startup indexing complete"
                ),
                Err(e) => tracing::error!(error = %e, "Startup indexing failed"),
            }
        });
    }

    let app = create_router_with_state(AppState::new(service), &config.cors_origins);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Opponent shutdown complete");
    Ok(())
}

async fn run_health_check() -> i32 {
    let port = std::env::var("OPPONENT_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8000);

    let url = format!("http://127.0.0.1:{port}/healthz");

    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
    else {
        return 1;
    };

    match client.get(&url).send().await {
        Ok(res) if res.status().is_success() => 0,
        _ => 1,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
