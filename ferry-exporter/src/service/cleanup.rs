//! History retention
//!
//! Deletes health metrics and executions older than the configured age.
//! Run links pointing at a deleted execution go with it.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::repository::{self, Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneSummary {
    pub cutoff: DateTime<Utc>,
    pub metrics_deleted: u64,
    pub executions_deleted: u64,
}

/// Delete everything older than `history_age_days`
pub async fn prune_history(store: &Store, history_age_days: i64) -> Result<PruneSummary, StoreError> {
    prune_before(store, Utc::now() - Duration::days(history_age_days)).await
}

pub async fn prune_before(store: &Store, cutoff: DateTime<Utc>) -> Result<PruneSummary, StoreError> {
    let metrics_deleted = repository::metric::delete_before(store, cutoff).await?;
    let executions_deleted = repository::execution::delete_started_before(store, cutoff).await?;

    info!(
        "Pruned {} metrics and {} executions older than {}",
        metrics_deleted, executions_deleted, cutoff
    );

    Ok(PruneSummary {
        cutoff,
        metrics_deleted,
        executions_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::metric::HealthSample;
    use crate::testing::temp_store;
    use ferry_core::domain::{ExceptionDetails, JobType, StatusCode, TaskKind};
    use ferry_core::dto::job::NewJob;

    #[tokio::test]
    async fn test_prune_history_removes_old_rows_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(dir.path()).await;
        let job = repository::job::create(&store, NewJob::service(JobType::DatabasePrune, 60))
            .await
            .unwrap();

        let mut executions = Vec::new();
        for (cycle, age_days) in [(1, 40), (2, 1)] {
            let execution = repository::execution::create_scheduled(
                &store,
                job.id,
                cycle,
                TaskKind::DatabasePrune,
                ExceptionDetails::initial_details(),
            )
            .await
            .unwrap();
            repository::execution::set_started(&store, execution.id, Utc::now() - Duration::days(age_days))
                .await
                .unwrap();
            repository::execution::set_status(&store, execution.id, StatusCode::Completed)
                .await
                .unwrap();
            executions.push(execution);
        }
        repository::metric::record(
            &store,
            HealthSample {
                platform_api_healthy: true,
                platform_registry_healthy: true,
                export_registry_healthy: true,
                object_store_healthy: true,
            },
        )
        .await
        .unwrap();

        let summary = prune_history(&store, 30).await.unwrap();
        assert_eq!(summary.executions_deleted, 1);
        assert_eq!(summary.metrics_deleted, 0);

        assert!(repository::execution::find_by_id(&store, executions[0].id).await.unwrap().is_none());
        assert!(repository::execution::find_by_id(&store, executions[1].id).await.unwrap().is_some());
        assert!(repository::job_run::for_run(&store, job.id, 1).await.unwrap().is_empty());
        assert_eq!(repository::job_run::for_run(&store, job.id, 2).await.unwrap().len(), 1);

        let later = prune_before(&store, Utc::now() + Duration::days(1)).await.unwrap();
        assert_eq!(later.metrics_deleted, 1);
        assert_eq!(later.executions_deleted, 1);
    }
}
