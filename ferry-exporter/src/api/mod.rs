//! API Module
//!
//! Read-only HTTP status surface over the store.

pub mod error;
pub mod health;
pub mod status;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::repository::Store;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
}

/// Create the status router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/status/exports", get(status::list_exports))
        .route("/status/exports/{export_id}", get(status::get_export))
        .route(
            "/status/exports/{export_id}/history",
            get(status::get_export_history),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
