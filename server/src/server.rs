//! Axum-based vote API server.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::ServerError;
use crate::handlers::{self, AppState};

pub struct ApiServer {
    pub port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    /// The axum router; exposed so tests can drive it directly.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/votes", post(handlers::submit_vote))
            .route("/api/nonce", post(handlers::issue_nonce))
            .route("/api/polls/:id", get(handlers::poll_snapshot))
            .route("/health", get(handlers::health))
            .layer(tower_http::cors::CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until the shutdown channel fires.
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let addr = format!("0.0.0.0:{}", self.port);
        info!("vote API listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
        Ok(())
    }
}
