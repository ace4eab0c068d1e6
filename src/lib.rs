pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod rate_limit;
pub mod state;
pub mod styles;
pub mod watcher;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{health_handler, metrics_handler, personalize_handler};
use crate::state::AppState;

// Photo payloads are base64, so allow some headroom over the decoded limit
const BODY_OVERHEAD: usize = 64 * 1024;

pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.max_photo_bytes / 3 * 4 + BODY_OVERHEAD;

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/personalize", post(personalize_handler))
        .route("/metrics", get(metrics_handler))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
