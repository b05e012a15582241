//! Health Check API Handler
//!
//! Serves the most recent collaborator health sample.

use axum::{Json, extract::State};
use ferry_core::dto::status::HealthReport;

use super::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::reporting;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthReport>> {
    reporting::latest_health(&state.store)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::Unavailable("No health check has run yet".to_string()))
}
