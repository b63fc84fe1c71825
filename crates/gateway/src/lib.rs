//! HTTP status gateway for markwright.
//!
//! Exposes a health check plus the v1 queue status API (snapshot and SSE
//! stream) so dashboards can watch grading jobs move through the queue.
//! Jobs themselves are submitted in-process through the shared
//! [`TaskQueue`] handle in [`GatewayState`].
//!
//! Built on Axum.

pub mod api_v1;

use axum::{Router, http::Method, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use markwright_config::{GatewayConfig, QueueConfig};
use markwright_queue::{QueueOptions, StatusBroadcaster, TaskQueue};

/// Shared application state for the gateway.
pub struct GatewayState {
    /// The process-wide job queue
    pub queue: TaskQueue,

    /// Publishes the queue's status changes
    pub broadcaster: Arc<StatusBroadcaster>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Build a queue wired to a fresh broadcaster.
    pub fn new(config: &QueueConfig) -> Self {
        let broadcaster = Arc::new(StatusBroadcaster::new(config.status_channel_capacity));
        let queue = TaskQueue::with_observer(QueueOptions::from(config), broadcaster.clone());
        Self { queue, broadcaster }
    }

    pub fn shared(config: &QueueConfig) -> SharedState {
        Arc::new(Self::new(config))
    }
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: &GatewayConfig, state: SharedState) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
