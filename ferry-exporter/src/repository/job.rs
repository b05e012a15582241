//! Job Repository
//!
//! Handles all database operations related to job definitions.

use chrono::{DateTime, Utc};
use ferry_core::domain::job::{JobDefinition, Secret};
use ferry_core::domain::task::JobType;
use ferry_core::domain::task_state::{JobDetails, TaskStateUpdate};
use ferry_core::dto::job::NewJob;
use uuid::Uuid;

use super::{Store, StoreError};

const JOB_COLUMNS: &str = r#"
    job_id, export_id, job_type, job_user, job_project, job_export_group,
    job_export_project, job_active, job_created_at, job_updated_at,
    run_frequency_seconds, job_secrets, job_details
"#;

/// Create a new job definition
pub async fn create(store: &Store, req: NewJob) -> Result<JobDefinition, StoreError> {
    let export_id = Uuid::new_v4().simple().to_string();
    let now = Utc::now();

    let secrets = match &req.secrets {
        Some(secret) => Some(store.seal(secret.expose())?),
        None => None,
    };
    let details = store.seal_json(&req.details.clone().into_value())?;

    let id = store
        .run("create job", || {
            sqlx::query(
                r#"
                INSERT INTO jobs (export_id, job_type, job_user, job_project, job_export_group,
                                  job_export_project, job_active, job_created_at, job_updated_at,
                                  run_frequency_seconds, job_secrets, job_details)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(export_id.as_str())
            .bind(req.job_type.as_str())
            .bind(req.owner.as_deref())
            .bind(req.project.as_deref())
            .bind(req.export_group.as_deref())
            .bind(req.export_project.as_deref())
            .bind(req.active)
            .bind(now)
            .bind(now)
            .bind(req.run_frequency_seconds)
            .bind(secrets.as_deref())
            .bind(details.as_str())
            .execute(store.pool())
        })
        .await?
        .last_insert_rowid();

    Ok(JobDefinition {
        id,
        export_id,
        job_type: req.job_type,
        owner: req.owner,
        project: req.project,
        export_group: req.export_group,
        export_project: req.export_project,
        active: req.active,
        run_frequency_seconds: req.run_frequency_seconds,
        secrets: req.secrets,
        details: req.details,
        created_at: now,
        updated_at: now,
    })
}

/// Find a job by ID
pub async fn find_by_id(store: &Store, id: i64) -> Result<Option<JobDefinition>, StoreError> {
    let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?");
    let row = store
        .run("find job", || {
            sqlx::query_as::<_, JobRow>(&query)
                .bind(id)
                .fetch_optional(store.pool())
        })
        .await?;

    row.map(|r| r.into_domain(store)).transpose()
}

/// Find a job by ID, failing when it does not exist
pub async fn get(store: &Store, id: i64) -> Result<JobDefinition, StoreError> {
    find_by_id(store, id)
        .await?
        .ok_or_else(|| StoreError::not_found("Job", id))
}

/// Find a job by its external export ID
pub async fn find_by_export_id(
    store: &Store,
    export_id: &str,
) -> Result<Option<JobDefinition>, StoreError> {
    let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE export_id = ?");
    let row = store
        .run("find job by export id", || {
            sqlx::query_as::<_, JobRow>(&query)
                .bind(export_id)
                .fetch_optional(store.pool())
        })
        .await?;

    row.map(|r| r.into_domain(store)).transpose()
}

/// List all jobs
pub async fn list_all(store: &Store) -> Result<Vec<JobDefinition>, StoreError> {
    let query = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY job_id ASC");
    let rows = store
        .run("list jobs", || {
            sqlx::query_as::<_, JobRow>(&query).fetch_all(store.pool())
        })
        .await?;

    rows.into_iter().map(|r| r.into_domain(store)).collect()
}

/// List jobs of one type
pub async fn list_by_type(
    store: &Store,
    job_type: JobType,
) -> Result<Vec<JobDefinition>, StoreError> {
    let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_type = ? ORDER BY job_id ASC");
    let rows = store
        .run("list jobs by type", || {
            sqlx::query_as::<_, JobRow>(&query)
                .bind(job_type.as_str())
                .fetch_all(store.pool())
        })
        .await?;

    rows.into_iter().map(|r| r.into_domain(store)).collect()
}

pub async fn update_frequency(
    store: &Store,
    id: i64,
    run_frequency_seconds: i64,
) -> Result<(), StoreError> {
    let now = Utc::now();
    store
        .run("update job frequency", || {
            sqlx::query(
                "UPDATE jobs SET run_frequency_seconds = ?, job_updated_at = ? WHERE job_id = ?",
            )
            .bind(run_frequency_seconds)
            .bind(now)
            .bind(id)
            .execute(store.pool())
        })
        .await?;

    Ok(())
}

pub async fn set_active(store: &Store, id: i64, active: bool) -> Result<(), StoreError> {
    let now = Utc::now();
    store
        .run("update job active flag", || {
            sqlx::query("UPDATE jobs SET job_active = ?, job_updated_at = ? WHERE job_id = ?")
                .bind(active)
                .bind(now)
                .bind(id)
                .execute(store.pool())
        })
        .await?;

    Ok(())
}

/// Replace a job's details document
pub async fn save_details(store: &Store, id: i64, details: &JobDetails) -> Result<(), StoreError> {
    let sealed = store.seal_json(&details.clone().into_value())?;
    let now = Utc::now();

    store
        .run("save job details", || {
            sqlx::query("UPDATE jobs SET job_details = ?, job_updated_at = ? WHERE job_id = ?")
                .bind(sealed.as_str())
                .bind(now)
                .bind(id)
                .execute(store.pool())
        })
        .await?;

    Ok(())
}

/// Merge task state updates into a job's details and persist them
///
/// Returns the details as written.
pub async fn update_task_states(
    store: &Store,
    id: i64,
    updates: &[TaskStateUpdate],
) -> Result<JobDetails, StoreError> {
    let _guard = store.details_lock().lock().await;

    let mut details = get(store, id).await?.details;
    details.apply(updates);
    save_details(store, id, &details).await?;

    Ok(details)
}

/// Delete a job and, through the foreign key, its executions
pub async fn delete(store: &Store, id: i64) -> Result<bool, StoreError> {
    let result = store
        .run("delete job", || {
            sqlx::query("DELETE FROM jobs WHERE job_id = ?")
                .bind(id)
                .execute(store.pool())
        })
        .await?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Internal Row Type
// ============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: i64,
    export_id: String,
    job_type: String,
    job_user: Option<String>,
    job_project: Option<String>,
    job_export_group: Option<String>,
    job_export_project: Option<String>,
    job_active: bool,
    job_created_at: DateTime<Utc>,
    job_updated_at: DateTime<Utc>,
    run_frequency_seconds: i64,
    job_secrets: Option<String>,
    job_details: String,
}

impl JobRow {
    fn into_domain(self, store: &Store) -> Result<JobDefinition, StoreError> {
        let job_type = self
            .job_type
            .parse::<JobType>()
            .map_err(|e| StoreError::Corrupt(format!("job {}: {}", self.job_id, e)))?;

        let secrets = match self.job_secrets.as_deref() {
            Some(sealed) => Some(Secret::new(store.open(sealed)?)),
            None => None,
        };

        let details = JobDetails::from_value(store.open_json(&self.job_details)?);

        Ok(JobDefinition {
            id: self.job_id,
            export_id: self.export_id,
            job_type,
            owner: self.job_user,
            project: self.job_project,
            export_group: self.job_export_group,
            export_project: self.job_export_project,
            active: self.job_active,
            run_frequency_seconds: self.run_frequency_seconds,
            secrets,
            details,
            created_at: self.job_created_at,
            updated_at: self.job_updated_at,
        })
    }
}
