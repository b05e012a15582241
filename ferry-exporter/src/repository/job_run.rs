//! Job Run Repository
//!
//! Links between a job's run cycles and the executions that served them.

use chrono::{DateTime, Utc};
use ferry_core::domain::job_run::JobRunLink;
use ferry_core::domain::task::TaskKind;

use super::{Store, StoreError};

const LINK_COLUMNS: &str = r#"
    job_run_pk, job_id, job_run_id, execution_type, job_run_started_at,
    job_run_updated_at, associated_execution_id, last_successful_execution_id
"#;

/// Find the link of one task within one run cycle
pub async fn find(
    store: &Store,
    job_id: i64,
    run_cycle_id: i64,
    task: TaskKind,
) -> Result<Option<JobRunLink>, StoreError> {
    let query = format!(
        "SELECT {LINK_COLUMNS} FROM job_runs
         WHERE job_id = ? AND job_run_id = ? AND execution_type = ?"
    );
    let row = store
        .run("find job run", || {
            sqlx::query_as::<_, JobRunRow>(&query)
                .bind(job_id)
                .bind(run_cycle_id)
                .bind(task.as_str())
                .fetch_optional(store.pool())
        })
        .await?;

    row.map(JobRunLink::try_from).transpose()
}

/// Every link of one run cycle
pub async fn for_run(
    store: &Store,
    job_id: i64,
    run_cycle_id: i64,
) -> Result<Vec<JobRunLink>, StoreError> {
    let query = format!(
        "SELECT {LINK_COLUMNS} FROM job_runs
         WHERE job_id = ? AND job_run_id = ?
         ORDER BY job_run_pk ASC"
    );
    let rows = store
        .run("list job runs", || {
            sqlx::query_as::<_, JobRunRow>(&query)
                .bind(job_id)
                .bind(run_cycle_id)
                .fetch_all(store.pool())
        })
        .await?;

    rows.into_iter().map(JobRunLink::try_from).collect()
}

/// Highest run cycle recorded for a job, 0 when it never ran
pub async fn last_run_cycle_id(store: &Store, job_id: i64) -> Result<i64, StoreError> {
    let last: Option<i64> = store
        .run("find last job run", || {
            sqlx::query_scalar("SELECT MAX(job_run_id) FROM job_runs WHERE job_id = ?")
                .bind(job_id)
                .fetch_one(store.pool())
        })
        .await?;

    Ok(last.unwrap_or(0))
}

/// Point a link at the execution whose output is authoritative
pub async fn set_last_successful(
    store: &Store,
    link_id: i64,
    execution_id: i64,
) -> Result<(), StoreError> {
    let now = Utc::now();
    store
        .run("update job run", || {
            sqlx::query(
                r#"
                UPDATE job_runs
                SET last_successful_execution_id = ?, job_run_updated_at = ?
                WHERE job_run_pk = ?
                "#,
            )
            .bind(execution_id)
            .bind(now)
            .bind(link_id)
            .execute(store.pool())
        })
        .await?;

    Ok(())
}

// ============================================================================
// Internal Row Type
// ============================================================================

#[derive(sqlx::FromRow)]
struct JobRunRow {
    job_run_pk: i64,
    job_id: i64,
    job_run_id: i64,
    execution_type: String,
    job_run_started_at: DateTime<Utc>,
    job_run_updated_at: DateTime<Utc>,
    associated_execution_id: i64,
    last_successful_execution_id: Option<i64>,
}

impl TryFrom<JobRunRow> for JobRunLink {
    type Error = StoreError;

    fn try_from(row: JobRunRow) -> Result<Self, Self::Error> {
        let task = row
            .execution_type
            .parse::<TaskKind>()
            .map_err(|e| StoreError::Corrupt(format!("job run {}: {}", row.job_run_pk, e)))?;

        Ok(JobRunLink {
            id: row.job_run_pk,
            job_id: row.job_id,
            run_cycle_id: row.job_run_id,
            task,
            started_at: row.job_run_started_at,
            updated_at: row.job_run_updated_at,
            associated_execution_id: row.associated_execution_id,
            last_successful_execution_id: row.last_successful_execution_id,
        })
    }
}
