//! Execution runner
//!
//! Drives one execution through start, run and stop. `stop` always runs, so
//! every execution handed to the runner gets an end timestamp. A failing body is
//! recorded on the execution and returned to the caller, which only logs it:
//! supervisors observe outcomes by re-reading the store.

use chrono::Utc;
use ferry_core::domain::{ExceptionDetails, StatusCode};
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::{ExecutionContext, Services};
use crate::repository::{self, StoreError};
use crate::tasks::{self, TaskError};

/// Exception type recorded when the timeout governor fires
pub const RUN_TIMEOUT_EXCEPTION: &str = "ExecutionRunTimeout";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Task failed: {0}")]
    Task(#[source] TaskError),

    #[error("Task exceeded its {0:?} timeout")]
    Timeout(Duration),
}

/// Run one execution to a terminal status
///
/// Returns the status the execution ended with.
pub async fn run(services: Arc<Services>, execution_id: i64) -> Result<StatusCode, RunnerError> {
    let store = services.store.clone();

    let result = run_body(services, execution_id).await;

    if let Err(RunnerError::Store(e)) = &result {
        mark_store_failure(&store, execution_id, e).await;
    }

    // stop
    if let Err(e) = repository::execution::set_ended(&store, execution_id, Utc::now()).await {
        warn!("Failed to record end of execution {}: {}", execution_id, e);
        if result.is_ok() {
            return Err(e.into());
        }
    }

    result
}

async fn run_body(services: Arc<Services>, execution_id: i64) -> Result<StatusCode, RunnerError> {
    let store = services.store.clone();
    repository::execution::set_started(&store, execution_id, Utc::now()).await?;

    let execution = repository::execution::get(&store, execution_id).await?;
    let job = repository::job::get(&store, execution.job_id).await?;

    if !job.active {
        info!(
            "Job {} is disabled, skipping execution {} ({})",
            job.export_id, execution.id, execution.task
        );
        repository::execution::set_status(&store, execution_id, StatusCode::Disabled).await?;
        return Ok(StatusCode::Disabled);
    }

    repository::execution::set_status(&store, execution_id, StatusCode::Running).await?;
    info!(
        "Running execution {} ({}) for job {} cycle {}",
        execution.id, execution.task, job.export_id, execution.run_cycle_id
    );

    let task = execution.task;
    let timeout = services.config.task_timeout;
    let mut ctx = ExecutionContext::new(services, execution, job);

    let outcome = tokio::time::timeout(timeout, tasks::execute(task, &mut ctx)).await;

    match outcome {
        Ok(Ok(status)) => {
            let status = status.unwrap_or(StatusCode::Completed);
            ctx.set_status(status).await?;
            info!("Execution {} ({}) finished: {}", execution_id, task, status);
            Ok(status)
        }
        Ok(Err(e)) => {
            let status = e.status_code();
            record_exception(&mut ctx, e.kind_name(), &e.to_string()).await?;
            ctx.set_status(status).await?;
            Err(RunnerError::Task(e))
        }
        Err(_) => {
            let status = StatusCode::ExecutionRunTimeout;
            record_exception(&mut ctx, RUN_TIMEOUT_EXCEPTION, status.message()).await?;
            ctx.set_status(status).await?;
            Err(RunnerError::Timeout(timeout))
        }
    }
}

async fn record_exception(
    ctx: &mut ExecutionContext,
    exception_type: &str,
    message: &str,
) -> Result<(), StoreError> {
    let exception = ExceptionDetails::new(exception_type, message);
    let mut patch = Map::new();
    patch.insert(
        ExceptionDetails::KEY.to_string(),
        serde_json::to_value(exception)?,
    );
    ctx.update_execution_details(patch).await
}

/// Best effort: leave no execution active after the store failed under it
async fn mark_store_failure(store: &repository::Store, execution_id: i64, error: &StoreError) {
    let details = serde_json::json!({
        "exception": ExceptionDetails::new("StoreError", error.to_string())
    });

    let saved = repository::execution::save_details(store, execution_id, &details).await;
    let marked =
        repository::execution::set_status(store, execution_id, StatusCode::UnknownError).await;

    if saved.is_err() || marked.is_err() {
        warn!(
            "Execution {} could not be marked failed after a store error",
            execution_id
        );
    }
}
