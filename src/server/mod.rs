//! HTTP server assembly and lifecycle.

pub mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::executor::{ExecutorConfig, PhasedExecutor, WorkflowEngine};
use crate::store::CheckpointStore;
use crate::webhook::{ProcessorConfig, WebhookProcessor, WebhookSecurity};

pub use api::{ApiError, AppState, DEFAULT_CHECKPOINTS, SharedState, api_router};

/// Configuration for the orchestrator server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: crate::config::DEFAULT_HOST.to_string(),
            port: crate::config::DEFAULT_PORT,
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            dev_mode: false,
        }
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }
}

/// Wire the store, executor, and webhook processor into shared state.
pub fn build_state(config: &Config, engine: Arc<dyn WorkflowEngine>) -> SharedState {
    let store = Arc::new(CheckpointStore::new());
    let executor = Arc::new(PhasedExecutor::new(
        Arc::clone(&store),
        engine,
        ExecutorConfig::from_config(config),
    ));
    let processor = Arc::new(WebhookProcessor::new(ProcessorConfig::from_config(config)));
    Arc::new(AppState {
        store,
        executor,
        processor,
        security: WebhookSecurity::from_config(config),
    })
}

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api_router().with_state(state)
}

/// Start the orchestrator server and serve until Ctrl+C.
pub async fn start_server(config: ServerConfig, state: SharedState) -> Result<()> {
    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, "greenlight listening");
    println!("greenlight running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    println!("\nShutting down...");
}
