//! Service start-up
//!
//! Brings the store in line with configuration before anything is
//! scheduled, then registers every job.

use ferry_core::domain::{JobType, StatusCode};
use ferry_core::dto::job::NewJob;
use tracing::{info, warn};

use crate::config::Config;
use crate::repository::{self, Store, StoreError};
use crate::scheduler::{Scheduler, SchedulerError};

/// Reconcile the store and start the scheduler
pub async fn run(scheduler: &Scheduler) -> Result<(), SchedulerError> {
    let services = scheduler.services();

    ensure_service_jobs(&services.store, &services.config).await?;
    reset_export_frequencies(&services.store, &services.config).await?;
    close_orphaned_executions(scheduler).await?;

    let released = repository::claim::release_all(&services.store).await?;
    if released > 0 {
        info!("Released {} stale run claims", released);
    }

    scheduler.start().await
}

/// Exactly one job per service job type, running at the configured frequency
pub async fn ensure_service_jobs(store: &Store, config: &Config) -> Result<(), StoreError> {
    for job_type in JobType::SERVICE {
        let frequency = service_frequency(config, job_type);
        let mut jobs = repository::job::list_by_type(store, job_type).await?.into_iter();

        match jobs.next() {
            Some(job) => {
                if job.run_frequency_seconds != frequency {
                    repository::job::update_frequency(store, job.id, frequency).await?;
                    info!(
                        "Updated {} job {} frequency to {}s",
                        job_type, job.export_id, frequency
                    );
                }
            }
            None => {
                let job = repository::job::create(store, NewJob::service(job_type, frequency)).await?;
                info!("Created {} job {}", job_type, job.export_id);
            }
        }

        for duplicate in jobs {
            warn!("Deleting duplicate {} job {}", job_type, duplicate.export_id);
            repository::job::delete(store, duplicate.id).await?;
        }
    }

    Ok(())
}

async fn reset_export_frequencies(store: &Store, config: &Config) -> Result<(), StoreError> {
    let frequency = config.export_job_frequency_seconds;

    for job in repository::job::list_by_type(store, JobType::ProjectExport).await? {
        if job.run_frequency_seconds != frequency {
            repository::job::update_frequency(store, job.id, frequency).await?;
        }
    }
    Ok(())
}

/// Executions left active by a previous process will never finish
async fn close_orphaned_executions(scheduler: &Scheduler) -> Result<(), SchedulerError> {
    let orphans = repository::execution::all_active(&scheduler.services().store).await?;

    for execution in &orphans {
        scheduler
            .remove_execution(execution.id, Some(StatusCode::ExecutionNotComplete))
            .await?;
    }

    if !orphans.is_empty() {
        warn!("Marked {} interrupted executions as not complete", orphans.len());
    }
    Ok(())
}

fn service_frequency(config: &Config, job_type: JobType) -> i64 {
    match job_type {
        JobType::AllExportStatusReport => config.status_report_frequency_seconds,
        JobType::HealthMetricsCollection => config.healthcheck_frequency_seconds,
        JobType::DatabasePrune => config.prune_frequency_seconds,
        JobType::ProjectExport => config.export_job_frequency_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use ferry_core::domain::{ExceptionDetails, TaskKind};

    #[tokio::test]
    async fn test_bootstrap_reconciles_store() {
        let harness = Harness::with_config(|config| {
            config.export_job_frequency_seconds = 120;
            config.healthcheck_frequency_seconds = 30;
        })
        .await;
        let store = harness.store();

        let export = harness.project_export_job().await;
        for _ in 0..2 {
            repository::job::create(store, NewJob::service(JobType::HealthMetricsCollection, 5))
                .await
                .unwrap();
        }
        let orphan = repository::execution::create(
            store,
            export.id,
            1,
            TaskKind::ProjectFilesExport,
            StatusCode::Running,
            ExceptionDetails::initial_details(),
        )
        .await
        .unwrap();
        assert_eq!(
            repository::claim::try_claim(store, export.id).await.unwrap(),
            Some(2)
        );

        run(&harness.scheduler).await.unwrap();

        for job_type in JobType::SERVICE {
            let jobs = repository::job::list_by_type(store, job_type).await.unwrap();
            assert_eq!(jobs.len(), 1, "{}", job_type);
            assert_eq!(
                jobs[0].run_frequency_seconds,
                service_frequency(&harness.services.config, job_type)
            );
        }
        let health = repository::job::list_by_type(store, JobType::HealthMetricsCollection)
            .await
            .unwrap();
        assert_eq!(health[0].run_frequency_seconds, 30);

        let export = repository::job::get(store, export.id).await.unwrap();
        assert_eq!(export.run_frequency_seconds, 120);

        let orphan = repository::execution::get(store, orphan.id).await.unwrap();
        assert_eq!(orphan.status, StatusCode::ExecutionNotComplete);
        assert!(orphan.ended_at.is_some());

        assert_eq!(
            repository::claim::try_claim(store, export.id).await.unwrap(),
            Some(2)
        );
        assert_eq!(harness.scheduler.registered_keys().len(), 4);
    }

    #[tokio::test]
    async fn test_service_jobs_are_created_once() {
        let harness = Harness::new().await;
        let store = harness.store();
        let config = &harness.services.config;

        ensure_service_jobs(store, config).await.unwrap();
        ensure_service_jobs(store, config).await.unwrap();

        let jobs = repository::job::list_all(store).await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.job_type.is_service() && j.active));
    }
}
