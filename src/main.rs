//! newswire — Binary Entrypoint
//! Boots the Axum HTTP server, wiring config, connectors, and shared state.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newswire::api::{create_router, AppState};
use newswire::config;
use newswire::coordinator::RunCoordinator;
use newswire::metrics::Metrics;
use newswire::store::ItemStore;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newswire=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = config::load_default()?;
    let registry = Arc::new(config::build_registry(&cfg)?);
    let store = Arc::new(ItemStore::new());
    let coordinator = Arc::new(RunCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        Duration::from_secs(cfg.ingest.fetch_timeout_secs),
    ));

    let metrics = Metrics::init(cfg.ingest.fetch_timeout_secs);

    let state = AppState { store, coordinator };
    let router = create_router(state).merge(metrics.router());

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, connectors = registry.len(), "newswire listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
