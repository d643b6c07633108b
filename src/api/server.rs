//! HTTP server

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

/// HTTP API Server
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Create a new server
    pub fn new(manager: AppState, addr: SocketAddr) -> Self {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = Router::new()
            // Health
            .route("/health", get(handlers::health))
            // Pool
            .route("/api/v1/pool", get(handlers::pool_stat))
            .route("/api/v1/resources", get(handlers::list_resources))
            // Acquire/Release
            .route("/api/v1/acquire", post(handlers::acquire))
            .route("/api/v1/release/:id", post(handlers::release))
            // GC
            .route("/api/v1/gc", post(handlers::garbage_collect))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(manager);

        Self { router, addr }
    }

    /// Run the server
    pub async fn run(self) -> Result<(), std::io::Error> {
        tracing::info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.router).await
    }
}
