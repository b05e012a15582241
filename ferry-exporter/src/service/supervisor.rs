//! Job supervisor
//!
//! Drives one run cycle of a job: claims the cycle, creates one execution
//! per task of each task group, hands them to the scheduler, and waits for
//! the group to settle before starting the next one.
//!
//! A cycle is skipped when another cycle of the same job holds the claim or
//! still has executions in flight.

use chrono::Utc;
use ferry_core::domain::{ExceptionDetails, Execution, JobDefinition, StatusCode, TaskKind};
use std::pin::pin;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::repository::{self, Store, StoreError};
use crate::scheduler::{Scheduler, SchedulerError};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every task group ran; executions carry the individual outcomes
    Completed { run_cycle_id: i64 },
    /// Another cycle of the same job is still in flight
    AlreadyRunning,
}

/// Run one cycle of a job
pub async fn run_job_cycle(
    scheduler: &Scheduler,
    job_id: i64,
) -> Result<CycleOutcome, SupervisorError> {
    let store = &scheduler.services().store;
    let job = repository::job::get(store, job_id).await?;

    let Some(run_cycle_id) = repository::claim::try_claim(store, job_id).await? else {
        info!(
            "Skipping {} job {}: a cycle is already running",
            job.job_type, job.export_id
        );
        return Ok(CycleOutcome::AlreadyRunning);
    };

    let result = supervise(scheduler, &job, run_cycle_id).await;

    if let Err(e) = repository::claim::release(store, job_id, run_cycle_id).await {
        warn!(
            "Failed to release claim on job {} cycle {}: {}",
            job.export_id, run_cycle_id, e
        );
    }

    result
}

async fn supervise(
    scheduler: &Scheduler,
    job: &JobDefinition,
    run_cycle_id: i64,
) -> Result<CycleOutcome, SupervisorError> {
    let store = &scheduler.services().store;

    let in_flight = repository::execution::active_for_job(store, job.id).await?;
    if !in_flight.is_empty() {
        info!(
            "Skipping {} job {}: {} executions still in flight",
            job.job_type,
            job.export_id,
            in_flight.len()
        );
        return Ok(CycleOutcome::AlreadyRunning);
    }

    info!(
        "Starting {} job {} cycle {}",
        job.job_type, job.export_id, run_cycle_id
    );

    for group in job.job_type.task_groups() {
        let executions = add_sub_tasks(store, job, run_cycle_id, group).await?;

        for (scheduled, execution) in executions.iter().enumerate() {
            if let Err(e) = scheduler.add_execution(execution.id).await {
                abandon(scheduler, &executions[scheduled..]).await;
                return Err(e.into());
            }
        }

        wait_for_run(scheduler, job.id, run_cycle_id).await?;
        debug!(
            "Job {} cycle {} finished group {:?}",
            job.export_id, run_cycle_id, group
        );
    }

    info!(
        "Finished {} job {} cycle {}",
        job.job_type, job.export_id, run_cycle_id
    );
    Ok(CycleOutcome::Completed { run_cycle_id })
}

/// Create one scheduled execution and its run link per task
///
/// When a link is rejected the executions created so far are closed out.
async fn add_sub_tasks(
    store: &Store,
    job: &JobDefinition,
    run_cycle_id: i64,
    tasks: &[TaskKind],
) -> Result<Vec<Execution>, StoreError> {
    let mut executions = Vec::with_capacity(tasks.len());

    for &task in tasks {
        let created = repository::execution::create_scheduled(
            store,
            job.id,
            run_cycle_id,
            task,
            ExceptionDetails::initial_details(),
        )
        .await;

        match created {
            Ok(execution) => executions.push(execution),
            Err(e) => {
                close_out(store, &executions).await;
                return Err(e);
            }
        }
    }

    Ok(executions)
}

/// Executions that will never be handed to the scheduler
async fn abandon(scheduler: &Scheduler, executions: &[Execution]) {
    close_out(&scheduler.services().store, executions).await;
    scheduler.execution_stopped().notify_waiters();
}

async fn close_out(store: &Store, executions: &[Execution]) {
    for execution in executions {
        let result = async {
            repository::execution::set_status(store, execution.id, StatusCode::ExecutionNotComplete)
                .await?;
            repository::execution::set_ended(store, execution.id, Utc::now()).await
        }
        .await;

        if let Err(e) = result {
            warn!(
                "Execution {} could not be closed out: {}",
                execution.external_id, e
            );
        }
    }
}

/// Wait until no execution of the cycle is active
///
/// Wakes on every finished execution, and polls as a fallback.
async fn wait_for_run(
    scheduler: &Scheduler,
    job_id: i64,
    run_cycle_id: i64,
) -> Result<(), StoreError> {
    let store = &scheduler.services().store;
    let interval = scheduler.services().config.wait_check_interval;

    loop {
        let mut stopped = pin!(scheduler.execution_stopped().notified());
        stopped.as_mut().enable();

        if repository::execution::active_for_run(store, job_id, run_cycle_id)
            .await?
            .is_empty()
        {
            return Ok(());
        }

        tokio::select! {
            _ = &mut stopped => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use ferry_core::domain::JobType;
    use ferry_core::dto::job::NewJob;
    use ferry_core::dto::status::{ExportState, ExportStatusRecord};
    use ferry_platform::PlatformError;
    use std::time::Duration;

    use crate::service::reporting;

    const LATEST: &str = "exports/analytics/churn/latest";
    const SYNC_LOG: &str = "exports/analytics/churn/sync-log.json";

    async fn statuses(harness: &Harness, job_id: i64, run_cycle_id: i64) -> Vec<(TaskKind, StatusCode)> {
        repository::execution::for_run(harness.store(), job_id, run_cycle_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.task, e.status))
            .collect()
    }

    #[tokio::test]
    async fn test_project_export_cycle_runs_every_group() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;

        let outcome = harness.run_cycle(job.id).await;
        assert_eq!(outcome, CycleOutcome::Completed { run_cycle_id: 1 });

        assert_eq!(
            statuses(&harness, job.id, 1).await,
            vec![
                (TaskKind::ProjectFilesExport, StatusCode::Completed),
                (TaskKind::ProjectImageExport, StatusCode::Completed),
                (TaskKind::ProjectExportReport, StatusCode::Completed),
            ]
        );

        let train = harness.object(&format!("{}/src/train.py", LATEST)).await;
        assert_eq!(train.as_deref(), Some(&b"print('train')"[..]));

        assert_eq!(
            harness.registry.calls(),
            vec![
                "pull platform.test/env1:1",
                "build registry.test/analytics/churn:latest,registry.test/analytics/churn:env1-v1",
                "cleanup",
                "push registry.test/analytics/churn:env1-v1",
                "push registry.test/analytics/churn:latest",
            ]
        );

        let sync_log = harness.object(SYNC_LOG).await.unwrap();
        let history: Vec<ExportStatusRecord> = serde_json::from_slice(&sync_log).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExportState::Success);
        assert_eq!(history[0].project_commit_id.as_deref(), Some("c1"));

        let job = repository::job::get(harness.store(), job.id).await.unwrap();
        assert!(job.details.task_flag(TaskKind::ProjectExportReport, "statusSaved"));
    }

    #[tokio::test]
    async fn test_unchanged_project_skips_and_points_at_prior_output() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;

        harness.run_cycle(job.id).await;
        let first_files = repository::execution::for_run(harness.store(), job.id, 1)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.task == TaskKind::ProjectFilesExport)
            .unwrap();

        let outcome = harness.run_cycle(job.id).await;
        assert_eq!(outcome, CycleOutcome::Completed { run_cycle_id: 2 });

        assert!(
            statuses(&harness, job.id, 2)
                .await
                .iter()
                .all(|(_, status)| *status == StatusCode::Skipped)
        );
        assert_eq!(harness.registry.calls().len(), 5);

        let link = repository::job_run::find(harness.store(), job.id, 2, TaskKind::ProjectFilesExport)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link.last_successful_execution_id, Some(first_files.id));
        assert!(!link.ran_this_cycle());

        let job = repository::job::get(harness.store(), job.id).await.unwrap();
        let record = reporting::export_status(harness.store(), &job, 2).await.unwrap();
        assert_eq!(record.status, ExportState::Skipped);
        assert_eq!(record.project_commit_id.as_deref(), Some("c1"));
        assert_eq!(record.project_export_runtime_seconds, 0.0);
        assert_eq!(record.image_export_location.len(), 2);
    }

    #[tokio::test]
    async fn test_new_commit_reexports_files_only() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;

        harness.run_cycle(job.id).await;
        harness.platform.set_commit("c2");
        harness.run_cycle(job.id).await;

        assert_eq!(
            statuses(&harness, job.id, 2).await,
            vec![
                (TaskKind::ProjectFilesExport, StatusCode::Completed),
                (TaskKind::ProjectImageExport, StatusCode::Skipped),
                (TaskKind::ProjectExportReport, StatusCode::Completed),
            ]
        );
        assert!(
            harness
                .object("exports/analytics/churn/prior/README.md")
                .await
                .is_some()
        );

        let sync_log = harness.object(SYNC_LOG).await.unwrap();
        let history: Vec<ExportStatusRecord> = serde_json::from_slice(&sync_log).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].run_cycle_id, 2);
        assert_eq!(history[0].project_commit_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_new_revision_rebuilds_image() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;

        harness.run_cycle(job.id).await;
        harness.platform.set_revision(2);
        harness.run_cycle(job.id).await;

        let calls = harness.registry.calls();
        assert_eq!(calls.len(), 10);
        assert_eq!(calls[5], "pull platform.test/env1:2");
        assert_eq!(calls[8], "push registry.test/analytics/churn:env1-v2");
    }

    #[tokio::test]
    async fn test_disabled_job_marks_executions_disabled() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;
        repository::job::set_active(harness.store(), job.id, false)
            .await
            .unwrap();

        harness.run_cycle(job.id).await;

        assert!(
            statuses(&harness, job.id, 1)
                .await
                .iter()
                .all(|(_, status)| *status == StatusCode::Disabled)
        );
        assert!(harness.registry.calls().is_empty());

        let record = reporting::export_status_latest(harness.store(), &job).await.unwrap();
        assert_eq!(record.status, ExportState::Disabled);
    }

    #[tokio::test]
    async fn test_claimed_job_is_not_run_twice() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;
        assert_eq!(
            repository::claim::try_claim(harness.store(), job.id).await.unwrap(),
            Some(1)
        );

        let outcome = harness.run_cycle(job.id).await;

        assert_eq!(outcome, CycleOutcome::AlreadyRunning);
        assert!(statuses(&harness, job.id, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_execution_blocks_new_cycle() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;
        repository::execution::create(
            harness.store(),
            job.id,
            7,
            TaskKind::ProjectFilesExport,
            StatusCode::ProjectFileTransferStarted,
            ExceptionDetails::initial_details(),
        )
        .await
        .unwrap();

        let outcome = harness.run_cycle(job.id).await;
        assert_eq!(outcome, CycleOutcome::AlreadyRunning);

        // The claim was released on the way out
        assert_eq!(
            repository::claim::try_claim(harness.store(), job.id).await.unwrap(),
            Some(8)
        );
    }

    #[tokio::test]
    async fn test_rejected_fan_out_leaves_nothing_active() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;
        harness.run_cycle(job.id).await;

        // Cycle 1 already has its links, so the first link insert is rejected
        let result = supervise(&harness.scheduler, &job, 1).await;
        assert!(matches!(result, Err(SupervisorError::Store(_))));

        assert!(
            repository::execution::active_for_job(harness.store(), job.id)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(statuses(&harness, job.id, 1).await.len(), 3);

        let outcome = harness.run_cycle(job.id).await;
        assert_eq!(outcome, CycleOutcome::Completed { run_cycle_id: 2 });
    }

    #[tokio::test]
    async fn test_unscheduled_executions_are_closed_out() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;
        harness.scheduler.shutdown();

        let result = run_job_cycle(&harness.scheduler, job.id).await;
        assert!(matches!(
            result,
            Err(SupervisorError::Scheduler(SchedulerError::ShutDown))
        ));

        let executions = repository::execution::for_run(harness.store(), job.id, 1)
            .await
            .unwrap();
        assert_eq!(executions.len(), 2);
        for execution in &executions {
            assert_eq!(execution.status, StatusCode::ExecutionNotComplete);
            assert!(execution.ended_at.is_some());
        }

        // The claim is free again
        assert_eq!(
            repository::claim::try_claim(harness.store(), job.id).await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_concurrent_cycles_run_once() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;

        let (a, b) = tokio::join!(
            supervisor_cycle(&harness, job.id),
            supervisor_cycle(&harness, job.id)
        );

        let completed = [a, b]
            .iter()
            .filter(|o| matches!(o, CycleOutcome::Completed { .. }))
            .count();
        assert_eq!(completed, 1);
        assert_eq!(statuses(&harness, job.id, 1).await.len(), 3);
    }

    async fn supervisor_cycle(harness: &Harness, job_id: i64) -> CycleOutcome {
        run_job_cycle(&harness.scheduler, job_id).await.unwrap()
    }

    #[tokio::test]
    async fn test_registry_failure_keeps_its_code() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;
        harness.registry.fail_builds("no space left on device");

        harness.run_cycle(job.id).await;

        let executions = repository::execution::for_run(harness.store(), job.id, 1)
            .await
            .unwrap();
        let image = executions
            .iter()
            .find(|e| e.task == TaskKind::ProjectImageExport)
            .unwrap();
        assert_eq!(image.status, StatusCode::ContainerBuildError);
        assert!(image.ended_at.is_some());
        assert_eq!(
            image.exception().unwrap().exception_type.as_deref(),
            Some("ContainerBuildError")
        );

        let record = reporting::export_status(harness.store(), &job, 1).await.unwrap();
        assert_eq!(record.status, ExportState::Error);
        assert_eq!(record.error_code, 116);
    }

    #[tokio::test]
    async fn test_platform_failure_is_unknown_error() {
        let harness = Harness::new().await;
        let job = harness.project_export_job().await;
        harness.platform.fail_with(|| PlatformError::KeyInvalid);

        harness.run_cycle(job.id).await;

        let record = reporting::export_status(harness.store(), &job, 1).await.unwrap();
        assert_eq!(record.status, ExportState::Error);
        assert_eq!(record.error_code, StatusCode::UnknownError.code());
        assert_eq!(
            record.error_message.as_deref(),
            Some("An unexpected error has occurred: PlatformApiKeyInvalid")
        );
    }

    #[tokio::test]
    async fn test_slow_task_times_out() {
        let harness = Harness::with_config(|config| {
            config.task_timeout = Duration::from_millis(200);
        })
        .await;
        let job = harness.project_export_job().await;
        harness.registry.set_build_delay(Duration::from_secs(5));

        let outcome = harness.run_cycle(job.id).await;
        assert_eq!(outcome, CycleOutcome::Completed { run_cycle_id: 1 });

        let executions = repository::execution::for_run(harness.store(), job.id, 1)
            .await
            .unwrap();
        let image = executions
            .iter()
            .find(|e| e.task == TaskKind::ProjectImageExport)
            .unwrap();
        assert_eq!(image.status, StatusCode::ExecutionRunTimeout);
        assert!(image.ended_at.is_some());
        assert_eq!(
            image.exception().unwrap().exception_type.as_deref(),
            Some("ExecutionRunTimeout")
        );
        assert!(!harness.registry.calls().iter().any(|c| c.starts_with("push")));
    }

    #[tokio::test]
    async fn test_service_job_cycle() {
        let harness = Harness::new().await;
        let job = repository::job::create(
            harness.store(),
            NewJob::service(JobType::HealthMetricsCollection, 60),
        )
        .await
        .unwrap();

        harness.run_cycle(job.id).await;

        assert_eq!(
            statuses(&harness, job.id, 1).await,
            vec![(TaskKind::HealthMetricsCollection, StatusCode::Completed)]
        );
        let metric = repository::metric::latest(harness.store()).await.unwrap().unwrap();
        assert!(metric.overall_healthy());
    }
}
