//! Per-project sync log
//!
//! Writes the project's recent export history next to the exported files.
//! Runs after the files and image exports of the same cycle, and only when
//! one of them recorded new output since the last report.

use async_trait::async_trait;
use ferry_core::domain::{StatusCode, TaskKind, TaskStateUpdate};
use serde_json::{Map, Value};
use tracing::info;

use super::files_export::STATUS_SAVED;
use super::{Task, TaskResult};
use crate::service::{ExecutionContext, reporting};
use crate::template::ExportLocations;

pub struct ProjectExportReport;

#[async_trait]
impl Task for ProjectExportReport {
    async fn execute(&self, ctx: &mut ExecutionContext) -> TaskResult {
        let job = ctx.job().clone();
        let task = TaskKind::ProjectExportReport;

        if job.details.task_flag(task, STATUS_SAVED) && !ctx.force_run() {
            info!("Skipping sync log for job {}: nothing new exported", job.export_id);
            ctx.update_execution_details(status_saved(false)).await?;
            ctx.update_job_run(job.details.last_completed_execution_id(task))
                .await?;
            return Ok(Some(StatusCode::Skipped));
        }

        ctx.update_execution_details(status_saved(true)).await?;
        ctx.update_job_run(None).await?;

        let history = reporting::export_status_history(
            ctx.store(),
            &job,
            ctx.config().sync_log_max_records,
            false,
        )
        .await?;

        let locations =
            ExportLocations::resolve(&ctx.config().templates, &ctx.config().export_bucket, &job)?;
        let body = serde_json::to_vec_pretty(&history)?;
        ctx.collaborators()
            .storage
            .put(&locations.sync_log, body)
            .await?;

        info!(
            "Saved {} sync log records for job {} to {}",
            history.len(),
            job.export_id,
            locations.sync_log
        );

        let execution_id = ctx.execution().id;
        ctx.update_job_task_states(&[TaskStateUpdate::new(task)
            .completed_by(execution_id)
            .field(STATUS_SAVED, true)])
            .await?;

        Ok(None)
    }
}

fn status_saved(saved: bool) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(STATUS_SAVED.to_string(), Value::Bool(saved));
    patch
}
