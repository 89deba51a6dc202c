//! Eventline HTTP server library logic.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /events` | [`api_events::post_event_handler`] |
//! | `POST /events/bulk` | [`api_events::post_event_bulk_handler`] |
//! | `GET /metrics` | [`api_metrics::get_metrics_handler`] |
//! | `GET /health` | [`health::health`] |
//! | `GET /ready` | [`health::ready`] |

pub mod api;
pub mod api_events;
pub mod api_metrics;
pub mod config;
pub mod health;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use eventline_ingest::IngestionService;
use eventline_metrics::MetricsAggregationService;
use health::ReadinessCheck;
use tower_http::trace::TraceLayer;

/// Default maximum request body size (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Write path.
    pub ingestion: Arc<IngestionService>,
    /// Read path.
    pub metrics: Arc<MetricsAggregationService>,
    /// Dependencies checked by `/ready`, in order.
    pub readiness: Vec<Arc<dyn ReadinessCheck>>,
    /// Most events accepted by one bulk request.
    pub max_batch_size: usize,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/events", post(api_events::post_event_handler))
        .route("/events/bulk", post(api_events::post_event_bulk_handler))
        .route("/metrics", get(api_metrics::get_metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
