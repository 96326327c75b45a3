//! Web server module.

mod assets;
mod handlers;

pub use assets::*;
pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::scheduler::Monitor;

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub monitor: Arc<Monitor>,
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        // Dashboard
        .route("/", get(handlers::handle_dashboard))
        .route("/assets/{*path}", get(assets::handle_asset))
        // Read-only API
        .route("/api/stats", get(handlers::handle_stats))
        .route("/api/results", get(handlers::handle_results))
        .route("/api/group-hierarchy", get(handlers::handle_group_hierarchy))
        .route("/api/failed-requests", get(handlers::handle_failed_requests))
        .route("/health", get(handlers::handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Web server for the dashboard.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, monitor: Arc<Monitor>) -> Self {
        Self {
            config,
            state: AppState { store, monitor },
        }
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = router(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
