//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, tracing, timeout)
//! - Serve until the shutdown signal fires

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::SignerConfig;
use crate::http::handlers;
use crate::session::OrchestratorHandle;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handle: OrchestratorHandle,
}

/// HTTP server exposing the orchestrator.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &SignerConfig, handle: OrchestratorHandle) -> Self {
        let state = AppState { handle };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &SignerConfig, state: AppState) -> Router {
        Router::new()
            .route("/api/v1/sign", post(handlers::sign))
            .route("/api/v1/acknowledge", post(handlers::acknowledge))
            .route("/api/v1/agree", post(handlers::agree))
            .route("/api/v1/cancel", post(handlers::cancel))
            .route("/api/v1/restart", post(handlers::restart))
            .route("/api/v1/account", post(handlers::set_account))
            .route("/api/v1/sign-out", post(handlers::sign_out))
            .route("/api/v1/session", get(handlers::session))
            .route("/api/v1/events", get(handlers::events))
            .route("/return", get(handlers::return_redirect))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.listener.request_timeout_secs,
                    ))),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
