//! Export Status API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use ferry_core::domain::{JobDefinition, JobType};
use ferry_core::dto::status::{ExportStatusRecord, ExportsSummaryRecord};
use serde::Deserialize;

use super::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::repository;
use crate::service::reporting;

/// Most history records one request may ask for
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub show_skipped: bool,
}

/// GET /status/exports
pub async fn list_exports(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ExportsSummaryRecord>>> {
    tracing::debug!("Listing export summaries");

    let summary = reporting::all_exports_summary(&state.store, &state.config).await?;
    Ok(Json(summary))
}

/// GET /status/exports/{export_id}
pub async fn get_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> ApiResult<Json<ExportStatusRecord>> {
    tracing::debug!("Getting export status: {}", export_id);

    let job = find_export_job(&state, &export_id).await?;
    let record = reporting::export_status_latest(&state.store, &job).await?;
    Ok(Json(record))
}

/// GET /status/exports/{export_id}/history?limit=N
pub async fn get_export_history(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<ExportStatusRecord>>> {
    let limit = query
        .limit
        .unwrap_or(state.config.sync_log_max_records)
        .min(MAX_HISTORY_LIMIT);
    tracing::debug!("Getting export history: {} (limit {})", export_id, limit);

    let job = find_export_job(&state, &export_id).await?;
    let records =
        reporting::export_status_history(&state.store, &job, limit, query.show_skipped).await?;
    Ok(Json(records))
}

async fn find_export_job(state: &AppState, export_id: &str) -> ApiResult<JobDefinition> {
    repository::job::find_by_export_id(&state.store, export_id)
        .await?
        .filter(|job| job.job_type == JobType::ProjectExport)
        .ok_or_else(|| ApiError::NotFound(format!("Export {} not found", export_id)))
}
