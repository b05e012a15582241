//! Active-run markers
//!
//! A job holds at most one claim. Claiming is a conditional insert, so two
//! supervisors racing for the same job cannot both win.

use chrono::Utc;

use super::{Store, StoreError};

/// Claim a job for its next run cycle
///
/// Returns the new cycle id, or `None` when another cycle holds the claim.
/// The id is derived inside the insert from every cycle recorded so far.
pub async fn try_claim(store: &Store, job_id: i64) -> Result<Option<i64>, StoreError> {
    let now = Utc::now();
    let claimed: Option<i64> = store
        .run("claim job run", || {
            sqlx::query_scalar(
                r#"
                INSERT INTO job_run_claims (job_id, job_run_id, claimed_at)
                SELECT ?, MAX(
                    COALESCE((SELECT MAX(job_run_id) FROM job_runs WHERE job_id = ?), 0),
                    COALESCE((SELECT MAX(job_run_id) FROM executions WHERE job_id = ?), 0)
                ) + 1, ?
                WHERE true
                ON CONFLICT (job_id) DO NOTHING
                RETURNING job_run_id
                "#,
            )
            .bind(job_id)
            .bind(job_id)
            .bind(job_id)
            .bind(now)
            .fetch_optional(store.pool())
        })
        .await?;

    Ok(claimed)
}

/// Release a job's claim if `run_cycle_id` still holds it
pub async fn release(store: &Store, job_id: i64, run_cycle_id: i64) -> Result<(), StoreError> {
    store
        .run("release job run", || {
            sqlx::query("DELETE FROM job_run_claims WHERE job_id = ? AND job_run_id = ?")
                .bind(job_id)
                .bind(run_cycle_id)
                .execute(store.pool())
        })
        .await?;

    Ok(())
}

/// Drop every claim; used at start-up when no cycle can be in flight
pub async fn release_all(store: &Store) -> Result<u64, StoreError> {
    let result = store
        .run("release all job runs", || {
            sqlx::query("DELETE FROM job_run_claims").execute(store.pool())
        })
        .await?;

    Ok(result.rows_affected())
}
