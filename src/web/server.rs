use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::api::{self, AppState};
use super::ws;
use crate::config::VibeConfig;
use crate::db::{DbHandle, VibeDb};
use crate::workflow::{WorkflowDeps, WorkflowRunner};

/// Configuration for the HTTP server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
}

impl From<&VibeConfig> for ServerConfig {
    fn from(config: &VibeConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            dev_mode: config.server.dev_mode,
        }
    }
}

/// Build the full application router: REST API plus the `/ws` feed.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_tx = state.ws_tx.clone();

    api::api_router()
        .route(
            "/ws",
            get(move |ws_upgrade| ws::ws_handler_with_sender(ws_upgrade, ws_tx)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the database, wire the workflow runner and serve until Ctrl+C.
pub async fn start_server(config: &VibeConfig) -> Result<()> {
    let server = ServerConfig::from(config);
    let db_path = &config.database.path;
    let db = DbHandle::new(VibeDb::open(db_path).context("Failed to initialize database")?);
    let deps = WorkflowDeps::from_config(config, db.clone())?;
    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    let runner = WorkflowRunner::new(deps, ws_tx.clone(), &config.workflow);

    let state = Arc::new(AppState {
        db,
        ws_tx,
        runner: runner.clone(),
    });
    let mut app = build_router(state);

    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, db = %db_path.display(), "vibe server listening");

    // Runs interrupted by a crash or restart pick up from their journal.
    runner.resume_unfinished().await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
