//! Web server module: JSON command/query API over the scheduler.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::scheduler::Scheduler;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub scheduler: Scheduler,
}

/// Web server for pynk.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, scheduler: Scheduler) -> Self {
        Self {
            state: AppState { config, scheduler },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/api/hosts", get(handlers::handle_list_hosts).post(handlers::handle_create_host))
            .route(
                "/api/hosts/{id}",
                get(handlers::handle_get_host).delete(handlers::handle_delete_host),
            )
            .route("/api/hosts/{id}/toggle", post(handlers::handle_toggle_host))
            .route("/api/hosts/{id}/results", get(handlers::handle_get_results))
            .route("/api/hosts/{id}/statistics", get(handlers::handle_get_statistics))
            .route("/api/events", get(handlers::handle_get_events))
            .route("/api/traceroute", get(handlers::handle_traceroute))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
