//! Execution Repository
//!
//! Handles all database operations related to executions.

use chrono::{DateTime, Utc};
use ferry_core::domain::execution::Execution;
use ferry_core::domain::status::StatusCode;
use ferry_core::domain::task::TaskKind;
use serde_json::Value;
use uuid::Uuid;

use super::{Store, StoreError};

const EXECUTION_COLUMNS: &str = r#"
    execution_id, external_execution_id, execution_type, execution_started_at,
    execution_ended_at, execution_status, execution_details, job_run_id, job_id
"#;

/// Active filter, kept in line with `StatusCode::is_active`
const ACTIVE_FILTER: &str = "execution_status > 210 AND execution_status != 290";

/// Create a new execution for one task of one run cycle
pub async fn create(
    store: &Store,
    job_id: i64,
    run_cycle_id: i64,
    task: TaskKind,
    status: StatusCode,
    details: Value,
) -> Result<Execution, StoreError> {
    let external_id = Uuid::new_v4().simple().to_string();
    let sealed = store.seal_json(&details)?;

    let id = store
        .run("create execution", || {
            sqlx::query(
                r#"
                INSERT INTO executions (external_execution_id, execution_type, execution_status,
                                        execution_details, job_run_id, job_id)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(external_id.as_str())
            .bind(task.as_str())
            .bind(status.code())
            .bind(sealed.as_str())
            .bind(run_cycle_id)
            .bind(job_id)
            .execute(store.pool())
        })
        .await?
        .last_insert_rowid();

    Ok(Execution {
        id,
        external_id,
        job_id,
        run_cycle_id,
        task,
        status,
        started_at: None,
        ended_at: None,
        details,
    })
}

/// Create a scheduled execution together with its run link
///
/// Both rows are written in one transaction, so a rejected link never
/// leaves an execution behind.
pub async fn create_scheduled(
    store: &Store,
    job_id: i64,
    run_cycle_id: i64,
    task: TaskKind,
    details: Value,
) -> Result<Execution, StoreError> {
    let external_id = Uuid::new_v4().simple().to_string();
    let sealed = store.seal_json(&details)?;
    let status = StatusCode::Scheduled;
    let now = Utc::now();

    let external = external_id.as_str();
    let sealed = sealed.as_str();

    let id = store
        .run("create scheduled execution", || async move {
            let mut tx = store.pool().begin().await?;

            let id = sqlx::query(
                r#"
                INSERT INTO executions (external_execution_id, execution_type, execution_status,
                                        execution_details, job_run_id, job_id)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(external)
            .bind(task.as_str())
            .bind(status.code())
            .bind(sealed)
            .bind(run_cycle_id)
            .bind(job_id)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            sqlx::query(
                r#"
                INSERT INTO job_runs (job_id, job_run_id, execution_type, job_run_started_at,
                                      job_run_updated_at, associated_execution_id)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(job_id)
            .bind(run_cycle_id)
            .bind(task.as_str())
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(id)
        })
        .await?;

    Ok(Execution {
        id,
        external_id,
        job_id,
        run_cycle_id,
        task,
        status,
        started_at: None,
        ended_at: None,
        details,
    })
}

/// Find an execution by ID
pub async fn find_by_id(store: &Store, id: i64) -> Result<Option<Execution>, StoreError> {
    let query = format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE execution_id = ?");
    let row = store
        .run("find execution", || {
            sqlx::query_as::<_, ExecutionRow>(&query)
                .bind(id)
                .fetch_optional(store.pool())
        })
        .await?;

    row.map(|r| r.into_domain(store)).transpose()
}

/// Find an execution by ID, failing when it does not exist
pub async fn get(store: &Store, id: i64) -> Result<Execution, StoreError> {
    find_by_id(store, id)
        .await?
        .ok_or_else(|| StoreError::not_found("Execution", id))
}

pub async fn set_status(store: &Store, id: i64, status: StatusCode) -> Result<(), StoreError> {
    store
        .run("update execution status", || {
            sqlx::query("UPDATE executions SET execution_status = ? WHERE execution_id = ?")
                .bind(status.code())
                .bind(id)
                .execute(store.pool())
        })
        .await?;

    Ok(())
}

pub async fn set_started(store: &Store, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
    store
        .run("update execution start", || {
            sqlx::query("UPDATE executions SET execution_started_at = ? WHERE execution_id = ?")
                .bind(at)
                .bind(id)
                .execute(store.pool())
        })
        .await?;

    Ok(())
}

pub async fn set_ended(store: &Store, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
    store
        .run("update execution end", || {
            sqlx::query("UPDATE executions SET execution_ended_at = ? WHERE execution_id = ?")
                .bind(at)
                .bind(id)
                .execute(store.pool())
        })
        .await?;

    Ok(())
}

/// Replace an execution's details document
pub async fn save_details(store: &Store, id: i64, details: &Value) -> Result<(), StoreError> {
    let sealed = store.seal_json(details)?;

    store
        .run("save execution details", || {
            sqlx::query("UPDATE executions SET execution_details = ? WHERE execution_id = ?")
                .bind(sealed.as_str())
                .bind(id)
                .execute(store.pool())
        })
        .await?;

    Ok(())
}

/// Executions of a job still in flight (not yet ended)
pub async fn active_for_job(store: &Store, job_id: i64) -> Result<Vec<Execution>, StoreError> {
    let query = format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions
         WHERE job_id = ? AND {ACTIVE_FILTER} AND execution_ended_at IS NULL
         ORDER BY execution_id ASC"
    );
    let rows = store
        .run("list active executions for job", || {
            sqlx::query_as::<_, ExecutionRow>(&query)
                .bind(job_id)
                .fetch_all(store.pool())
        })
        .await?;

    rows.into_iter().map(|r| r.into_domain(store)).collect()
}

/// Active executions of one run cycle
pub async fn active_for_run(
    store: &Store,
    job_id: i64,
    run_cycle_id: i64,
) -> Result<Vec<Execution>, StoreError> {
    let query = format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions
         WHERE job_id = ? AND job_run_id = ? AND {ACTIVE_FILTER}
         ORDER BY execution_id ASC"
    );
    let rows = store
        .run("list active executions for run", || {
            sqlx::query_as::<_, ExecutionRow>(&query)
                .bind(job_id)
                .bind(run_cycle_id)
                .fetch_all(store.pool())
        })
        .await?;

    rows.into_iter().map(|r| r.into_domain(store)).collect()
}

/// Every execution left in an active status, regardless of job
pub async fn all_active(store: &Store) -> Result<Vec<Execution>, StoreError> {
    let query = format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions WHERE {ACTIVE_FILTER} ORDER BY execution_id ASC"
    );
    let rows = store
        .run("list active executions", || {
            sqlx::query_as::<_, ExecutionRow>(&query).fetch_all(store.pool())
        })
        .await?;

    rows.into_iter().map(|r| r.into_domain(store)).collect()
}

/// Executions of a job's run cycle, in creation order
pub async fn for_run(
    store: &Store,
    job_id: i64,
    run_cycle_id: i64,
) -> Result<Vec<Execution>, StoreError> {
    let query = format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions
         WHERE job_id = ? AND job_run_id = ?
         ORDER BY execution_id ASC"
    );
    let rows = store
        .run("list executions for run", || {
            sqlx::query_as::<_, ExecutionRow>(&query)
                .bind(job_id)
                .bind(run_cycle_id)
                .fetch_all(store.pool())
        })
        .await?;

    rows.into_iter().map(|r| r.into_domain(store)).collect()
}

/// Delete executions started before `cutoff` together with their run links
///
/// Returns the number of executions removed.
pub async fn delete_started_before(
    store: &Store,
    cutoff: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let removed = store
        .run("prune executions", move || async move {
            let mut tx = store.pool().begin().await?;

            sqlx::query(
                r#"
                DELETE FROM job_runs
                WHERE associated_execution_id IN (
                    SELECT execution_id FROM executions WHERE execution_started_at < ?
                )
                "#,
            )
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

            let result = sqlx::query("DELETE FROM executions WHERE execution_started_at < ?")
                .bind(cutoff)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })
        .await?;

    Ok(removed)
}

// ============================================================================
// Internal Row Type
// ============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    execution_id: i64,
    external_execution_id: String,
    execution_type: String,
    execution_started_at: Option<DateTime<Utc>>,
    execution_ended_at: Option<DateTime<Utc>>,
    execution_status: i32,
    execution_details: String,
    job_run_id: i64,
    job_id: i64,
}

impl ExecutionRow {
    fn into_domain(self, store: &Store) -> Result<Execution, StoreError> {
        let task = self.execution_type.parse::<TaskKind>().map_err(|e| {
            StoreError::Corrupt(format!("execution {}: {}", self.execution_id, e))
        })?;
        let status = StatusCode::try_from(self.execution_status).map_err(|e| {
            StoreError::Corrupt(format!("execution {}: {}", self.execution_id, e))
        })?;

        Ok(Execution {
            id: self.execution_id,
            external_id: self.external_execution_id,
            job_id: self.job_id,
            run_cycle_id: self.job_run_id,
            task,
            status,
            started_at: self.execution_started_at,
            ended_at: self.execution_ended_at,
            details: store.open_json(&self.execution_details)?,
        })
    }
}
