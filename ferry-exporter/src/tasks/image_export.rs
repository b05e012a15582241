//! Project container image export
//!
//! Rebuilds the project's compute environment image on top of a Dockerfile
//! template and pushes it to the export registry under a `latest` and a
//! versioned tag. Skipped while the environment id and revision match the
//! ones last exported.

use async_trait::async_trait;
use ferry_core::domain::{StatusCode, TaskKind, TaskStateUpdate};
use serde_json::{Map, Value, json};
use tracing::info;

use super::files_export::STATUS_SAVED;
use super::{Task, TaskError, TaskResult};
use crate::service::ExecutionContext;
use crate::template::ImageNames;

pub const COMPUTE_ENVIRONMENT_ID: &str = "computeEnvironmentId";
pub const COMPUTE_ENVIRONMENT_REVISION: &str = "computeEnvironmentRevision";

/// Job setting naming the Dockerfile template under the template directory
pub const TEMPLATE_FILE_KEY: &str = "dockerBuildTemplateFile";
pub const DEFAULT_TEMPLATE_FILE: &str = "default.Dockerfile";

/// Replaced with the environment image in the Dockerfile template
pub const BASE_IMAGE_PLACEHOLDER: &str = "{BASE_IMAGE}";

pub struct ProjectImageExport;

#[async_trait]
impl Task for ProjectImageExport {
    async fn execute(&self, ctx: &mut ExecutionContext) -> TaskResult {
        let job = ctx.job().clone();
        let (owner, project) = job
            .project_ref()
            .ok_or_else(|| TaskError::Config(format!("Job {} has no project", job.export_id)))?;

        let platform = ctx.platform()?;
        let environment = platform.compute_environment_revision(owner, project).await?;
        let environment_name = platform.environment_name(&environment.id).await?;
        let base_image = platform
            .environment_image(&environment.id, environment.revision)
            .await?;

        let mut fingerprint = Map::new();
        fingerprint.insert(COMPUTE_ENVIRONMENT_ID.to_string(), json!(environment.id));
        fingerprint.insert(
            COMPUTE_ENVIRONMENT_REVISION.to_string(),
            json!(environment.revision),
        );

        let task = TaskKind::ProjectImageExport;
        if !ctx.force_run() && job.details.fingerprint_matches(task, &fingerprint) {
            info!(
                "Skipping image export for job {}: environment {} v{} already exported",
                job.export_id, environment.id, environment.revision
            );
            ctx.update_execution_details(details(
                json!({ "id": null, "revision": null, "name": null }),
                Value::Null,
                Value::Null,
            ))
            .await?;
            ctx.update_job_run(job.details.last_completed_execution_id(task))
                .await?;
            return Ok(Some(StatusCode::Skipped));
        }

        let registry_url = ctx
            .config()
            .export_registry
            .url
            .clone()
            .ok_or_else(|| TaskError::Config("No export registry configured".to_string()))?;
        let images = ImageNames::resolve(
            &ctx.config().templates,
            &registry_url,
            &job,
            &environment.id,
            environment.revision,
        )?;
        let dockerfile = render_dockerfile(ctx, &base_image).await?;
        let registry = ctx.collaborators().registry.clone();

        ctx.set_status(StatusCode::ImageExportInitiated).await?;

        ctx.set_status(StatusCode::ImageExportPullStarted).await?;
        registry.pull(&base_image).await?;
        ctx.set_status(StatusCode::ImageExportPullEnded).await?;

        ctx.set_status(StatusCode::ImageExportBuildStarted).await?;
        registry
            .build(&dockerfile, &[images.latest.clone(), images.version.clone()])
            .await?;
        ctx.set_status(StatusCode::ImageExportBuildEnded).await?;

        registry.cleanup().await?;

        ctx.set_status(StatusCode::ImageExportPushStarted).await?;
        registry.push(&images.version).await?;
        registry.push(&images.latest).await?;
        ctx.set_status(StatusCode::ImageExportPushEnded).await?;

        info!(
            "Exported environment {} v{} of {}/{} as {}",
            environment.id, environment.revision, owner, project, images.version
        );

        ctx.update_execution_details(details(
            json!({
                "id": environment.id,
                "revision": environment.revision,
                "name": environment_name,
            }),
            json!(images.latest),
            json!(images.version),
        ))
        .await?;

        let execution_id = ctx.execution().id;
        ctx.update_job_task_states(&[
            TaskStateUpdate::new(task)
                .completed_by(execution_id)
                .fingerprint(&fingerprint),
            TaskStateUpdate::new(TaskKind::ProjectExportReport).field(STATUS_SAVED, false),
        ])
        .await?;
        ctx.update_job_run(None).await?;

        Ok(None)
    }
}

/// Reads the job's Dockerfile template and fills in the base image
async fn render_dockerfile(ctx: &ExecutionContext, base_image: &str) -> Result<String, TaskError> {
    let file = ctx
        .job()
        .details
        .get_str(TEMPLATE_FILE_KEY)
        .unwrap_or(DEFAULT_TEMPLATE_FILE);
    if file.contains('/') || file.contains('\\') || file == ".." {
        return Err(TaskError::Config(format!(
            "Dockerfile template name '{}' must be a plain file name",
            file
        )));
    }
    let path = ctx.config().docker_build_template_path.join(file);

    let template = tokio::fs::read_to_string(&path).await.map_err(|e| {
        TaskError::Config(format!(
            "Failed to read Dockerfile template {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(template.replace(BASE_IMAGE_PLACEHOLDER, base_image))
}

fn details(environment: Value, latest: Value, version: Value) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert("exportedComputeEnvironment".to_string(), environment);
    patch.insert(
        "exportedImages".to_string(),
        json!({ "latest": latest, "version": version }),
    );
    patch
}
