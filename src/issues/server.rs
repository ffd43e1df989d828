use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::api::{self, AppState, StatusPolicy};
use super::service::IssueService;
use super::store::{self, SharedStore};
use crate::config::TrackerConfig;

/// Build the application router over `store`.
pub fn build_router(store: SharedStore, config: &TrackerConfig) -> Router {
    let state = Arc::new(AppState {
        service: IssueService::new(store),
        status_policy: StatusPolicy::from_legacy_flag(config.api.legacy_status_codes),
    });

    let app = api::api_router().with_state(state);
    if config.server.cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Open the configured store and serve until Ctrl-C.
pub async fn start_server(config: TrackerConfig) -> Result<()> {
    let store = store::open_store(config.storage.backend, &config.storage.path)
        .context("Failed to initialize issue store")?;
    info!(
        backend = %config.storage.backend,
        path = %config.storage.path.display(),
        "Issue store ready"
    );

    let app = build_router(store, &config);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, "Issue tracker listening");
    println!("Issue tracker running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
