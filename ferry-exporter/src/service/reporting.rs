//! Read-only status projections
//!
//! Derives export status records from executions, run links and jobs. These
//! back the report tasks and the status API; nothing here writes.

use ferry_core::domain::{Execution, JobDefinition, JobRunLink, JobType, StatusCode, TaskKind};
use ferry_core::dto::status::{ExportState, ExportStatusRecord, ExportsSummaryRecord, HealthReport};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::repository::{self, Store, StoreError};
use crate::template::{ExportLocations, TemplateError};

/// States a summary walks back to; running and skipped cycles are passed over
const SUMMARY_STATES: [ExportState; 4] = [
    ExportState::Scheduled,
    ExportState::Success,
    ExportState::Error,
    ExportState::Disabled,
];

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Status of one run cycle of a project export job
///
/// Cycle 0 means the job never ran. A negative cycle id is reported as an
/// error record rather than failing.
pub async fn export_status(
    store: &Store,
    job: &JobDefinition,
    run_cycle_id: i64,
) -> Result<ExportStatusRecord, StoreError> {
    let mut record = base_record(job, run_cycle_id);

    if run_cycle_id == 0 {
        record.status = ExportState::Scheduled;
        return Ok(record);
    }
    if run_cycle_id < 0 {
        let code = StatusCode::InvalidJobRunId;
        record.status = ExportState::Error;
        record.error_code = code.code();
        record.error_message = Some(code.render_message(None));
        return Ok(record);
    }

    let links = repository::job_run::for_run(store, job.id, run_cycle_id).await?;
    let files_link = find_link(&links, TaskKind::ProjectFilesExport);
    let image_link = find_link(&links, TaskKind::ProjectImageExport);

    let files = associated_execution(store, files_link).await?;
    let image = associated_execution(store, image_link).await?;

    record.project_export_status = files.as_ref().map(|e| e.status.name().to_string());
    record.image_export_status = image.as_ref().map(|e| e.status.name().to_string());

    let exports = [files.as_ref(), image.as_ref()];

    if exports.iter().flatten().any(|e| e.status.is_active()) {
        record.status = ExportState::Running;
    } else if let Some(failed) = exports.iter().flatten().find(|e| e.status.is_error()) {
        let exception = failed.exception().unwrap_or_default();
        record.status = ExportState::Error;
        record.error_code = failed.status.code();
        record.error_message = Some(
            failed
                .status
                .render_message(exception.exception_type.as_deref()),
        );
    } else {
        record.status = if exports
            .iter()
            .all(|e| e.is_some_and(|e| e.status.is_skip()))
        {
            ExportState::Skipped
        } else if exports.iter().flatten().any(|e| e.status.is_disabled()) {
            ExportState::Disabled
        } else {
            ExportState::Success
        };

        if let Some(link) = files_link {
            let (runtime, source) = authoritative(store, link, files).await?;
            record.project_export_runtime_seconds = runtime;
            if let Some(details) = source.as_ref().map(|e| &e.details) {
                record.project_export_location = string_at(details, &["paths", "latest"]);
                record.project_commit_id = string_at(details, &["commitId"]);
            }
        }

        if let Some(link) = image_link {
            let (runtime, source) = authoritative(store, link, image).await?;
            record.image_export_runtime_seconds = runtime;
            if let Some(details) = source.as_ref().map(|e| &e.details) {
                record.image_export_location = ["latest", "version"]
                    .iter()
                    .filter_map(|tag| string_at(details, &["exportedImages", *tag]))
                    .collect();
                record.image_environment_name = environment_label(details);
            }
        }
    }

    if let Some(started) = links.iter().map(|l| l.started_at).min() {
        record.timestamp = started;
    }

    Ok(record)
}

/// Status of the job's most recent cycle
pub async fn export_status_latest(
    store: &Store,
    job: &JobDefinition,
) -> Result<ExportStatusRecord, StoreError> {
    let last = repository::job_run::last_run_cycle_id(store, job.id).await?;
    export_status(store, job, last).await
}

/// Up to `max_records` most recent cycles, newest first
pub async fn export_status_history(
    store: &Store,
    job: &JobDefinition,
    max_records: usize,
    show_skipped: bool,
) -> Result<Vec<ExportStatusRecord>, StoreError> {
    let mut records = Vec::new();
    let mut run_cycle_id = repository::job_run::last_run_cycle_id(store, job.id).await?;

    while records.len() < max_records && run_cycle_id > 0 {
        let record = export_status(store, job, run_cycle_id).await?;
        if show_skipped || record.status != ExportState::Skipped {
            records.push(record);
        }
        run_cycle_id -= 1;
    }

    Ok(records)
}

/// Latest meaningful state of every project export job
pub async fn all_exports_summary(
    store: &Store,
    config: &Config,
) -> Result<Vec<ExportsSummaryRecord>, ReportingError> {
    let mut summary = Vec::new();

    for job in repository::job::list_by_type(store, JobType::ProjectExport).await? {
        let mut run_cycle_id = repository::job_run::last_run_cycle_id(store, job.id).await?;
        let mut record = export_status(store, &job, run_cycle_id).await?;

        while run_cycle_id > 1 && !SUMMARY_STATES.contains(&record.status) {
            run_cycle_id -= 1;
            record = export_status(store, &job, run_cycle_id).await?;
        }

        let sync_log_path = if record.status == ExportState::Scheduled {
            None
        } else {
            Some(ExportLocations::resolve(&config.templates, &config.export_bucket, &job)?.sync_log)
        };

        summary.push(ExportsSummaryRecord {
            timestamp: record.timestamp,
            export_id: record.export_id,
            status: record.status,
            sync_log_path,
        });
    }

    Ok(summary)
}

/// Most recent health metric, if one was ever collected
pub async fn latest_health(store: &Store) -> Result<Option<HealthReport>, StoreError> {
    let metric = repository::metric::latest(store).await?;

    Ok(metric.map(|m| HealthReport {
        overall_healthy: Some(m.overall_healthy()),
        api_version: env!("CARGO_PKG_VERSION").to_string(),
        health_check_timestamp: m.collected_at,
        platform_connection_healthy: Some(m.platform_api_healthy),
        platform_registry_connection_healthy: Some(m.platform_registry_healthy),
        object_store_connection_healthy: Some(m.object_store_healthy),
        export_registry_connection_healthy: Some(m.export_registry_healthy),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn base_record(job: &JobDefinition, run_cycle_id: i64) -> ExportStatusRecord {
    ExportStatusRecord {
        timestamp: job.updated_at,
        export_id: job.export_id.clone(),
        run_cycle_id,
        status: ExportState::Scheduled,
        error_code: 0,
        error_message: None,
        export_frequency_seconds: job.run_frequency_seconds,
        owner: job.owner.clone(),
        project: job.project.clone(),
        export_group: job.export_group.clone(),
        export_project: job.export_project.clone(),
        project_export_runtime_seconds: 0.0,
        project_export_location: None,
        project_commit_id: None,
        project_export_status: None,
        image_export_runtime_seconds: 0.0,
        image_export_location: Vec::new(),
        image_export_status: None,
        image_environment_name: None,
    }
}

fn find_link(links: &[JobRunLink], task: TaskKind) -> Option<&JobRunLink> {
    links.iter().find(|l| l.task == task)
}

async fn associated_execution(
    store: &Store,
    link: Option<&JobRunLink>,
) -> Result<Option<Execution>, StoreError> {
    match link {
        Some(link) => repository::execution::find_by_id(store, link.associated_execution_id).await,
        None => Ok(None),
    }
}

/// Runtime this cycle spent on the task and the execution whose output stands
///
/// Runtime only counts when the cycle did the work itself; a skipped cycle
/// reports the earlier execution's output with zero runtime.
async fn authoritative(
    store: &Store,
    link: &JobRunLink,
    associated: Option<Execution>,
) -> Result<(f64, Option<Execution>), StoreError> {
    if link.ran_this_cycle() {
        let runtime = associated
            .as_ref()
            .and_then(Execution::runtime_seconds)
            .unwrap_or(0.0);
        return Ok((runtime, associated));
    }

    let source = match link.last_successful_execution_id {
        Some(id) => repository::execution::find_by_id(store, id).await?,
        None => None,
    };
    Ok((0.0, source))
}

fn string_at(details: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(details, |value, key| value.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn environment_label(details: &Value) -> Option<String> {
    let environment = details.get("exportedComputeEnvironment")?;
    let id = environment.get("id").and_then(Value::as_str)?;
    let revision = environment.get("revision").and_then(Value::as_i64)?;
    let name = environment
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    Some(format!("{} v{} [{}]", name, revision, id))
}
