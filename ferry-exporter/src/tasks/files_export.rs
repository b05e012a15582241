//! Project files export
//!
//! Mirrors a project's head file tree into `<export>/latest`, keeping the
//! previous export under `<export>/prior`. Skipped while the newest commit
//! id matches the one last exported.

use async_trait::async_trait;
use ferry_core::domain::{StatusCode, TaskKind, TaskStateUpdate};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{Task, TaskError, TaskResult};
use crate::service::ExecutionContext;
use crate::template::ExportLocations;

pub const COMMIT_ID: &str = "commitId";
pub const STATUS_SAVED: &str = "statusSaved";

pub struct ProjectFilesExport;

#[async_trait]
impl Task for ProjectFilesExport {
    async fn execute(&self, ctx: &mut ExecutionContext) -> TaskResult {
        ctx.update_execution_details(details(Value::Null, Value::Null, Value::Null))
            .await?;

        let job = ctx.job().clone();
        let (owner, project) = job
            .project_ref()
            .ok_or_else(|| TaskError::Config(format!("Job {} has no project", job.export_id)))?;

        let platform = ctx.platform()?;
        let project_info = platform.find_project(owner, project).await?;
        let files = platform.list_latest_files(&project_info.id).await?;
        let commit_id = platform.latest_commit_id(&project_info.id).await?;

        let mut fingerprint = Map::new();
        fingerprint.insert(COMMIT_ID.to_string(), json!(commit_id));

        let task = TaskKind::ProjectFilesExport;
        if !ctx.force_run() && job.details.fingerprint_matches(task, &fingerprint) {
            info!(
                "Skipping files export for job {}: commit {:?} already exported",
                job.export_id, commit_id
            );
            ctx.update_job_run(job.details.last_completed_execution_id(task))
                .await?;
            return Ok(Some(StatusCode::Skipped));
        }

        let locations =
            ExportLocations::resolve(&ctx.config().templates, &ctx.config().export_bucket, &job)?;
        let storage = ctx.collaborators().storage.clone();

        ctx.set_status(StatusCode::ProjectFileExportInitiated).await?;

        ctx.set_status(StatusCode::ProjectFileDeletePriorStarted).await?;
        storage.delete_prefix(&locations.prior).await?;
        ctx.set_status(StatusCode::ProjectFileDeletePriorEnded).await?;

        ctx.set_status(StatusCode::ProjectFileMoveLatestToPriorStarted).await?;
        storage.move_prefix(&locations.latest, &locations.prior).await?;
        ctx.set_status(StatusCode::ProjectFileMoveLatestToPriorEnded).await?;

        ctx.set_status(StatusCode::ProjectFileTransferStarted).await?;
        for file in &files {
            let key = format!(
                "{}/{}",
                locations.latest,
                file.path.canonicalized_path_string.trim_start_matches('/')
            );
            let body = platform.file_contents(owner, project, &file.key).await?;
            debug!("Exporting {} ({} bytes) to {}", file.path.canonicalized_path_string, body.len(), key);
            storage.put(&key, body).await?;
        }
        ctx.set_status(StatusCode::ProjectFileTransferEnded).await?;

        info!(
            "Exported {} files of {}/{} at commit {:?} to {}",
            files.len(),
            owner,
            project,
            commit_id,
            locations.latest
        );

        ctx.update_execution_details(details(
            json!(commit_id),
            json!(locations.latest),
            json!(locations.prior),
        ))
        .await?;
        ctx.update_job_run(None).await?;

        let execution_id = ctx.execution().id;
        ctx.update_job_task_states(&[
            TaskStateUpdate::new(task)
                .completed_by(execution_id)
                .fingerprint(&fingerprint),
            TaskStateUpdate::new(TaskKind::ProjectExportReport).field(STATUS_SAVED, false),
        ])
        .await?;

        Ok(None)
    }
}

fn details(commit_id: Value, latest: Value, prior: Value) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(COMMIT_ID.to_string(), commit_id);
    patch.insert("paths".to_string(), json!({ "latest": latest, "prior": prior }));
    patch
}
