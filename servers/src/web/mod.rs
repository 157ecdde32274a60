//! # Dashboard HTTP Surface
//!
//! Per-recipient views over the reading store plus the sink endpoint the
//! distributor topology posts to:
//!
//! - `GET  /health`
//! - `GET  /api/recipients`
//! - `GET  /api/readings/{key}`
//! - `GET  /api/{recipient}/recent?limit=N`
//! - `GET  /api/{recipient}/events` (Server-Sent Events)
//! - `POST /api/{recipient}/data`

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use lib_telemetry::RecipientRegistry;
use lib_telemetry::core::ReadingStore;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::AppError;

/// Default and maximum page size of `/recent`.
pub const DEFAULT_RECENT: usize = 10;
pub const MAX_RECENT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: ReadingStore,
    pub registry: Arc<RecipientRegistry>,
    /// Parent of every SSE subscription; cancelling it ends open streams.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/recipients", get(handlers::recipients))
        .route("/api/readings/{key}", get(handlers::reading))
        .route("/api/{recipient}/recent", get(handlers::recent))
        .route("/api/{recipient}/events", get(handlers::events))
        .route("/api/{recipient}/data", post(handlers::sink))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
