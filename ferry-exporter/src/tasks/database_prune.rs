//! History retention

use async_trait::async_trait;
use serde_json::json;

use super::{Task, TaskResult};
use crate::service::{ExecutionContext, cleanup};

pub struct DatabasePrune;

#[async_trait]
impl Task for DatabasePrune {
    async fn execute(&self, ctx: &mut ExecutionContext) -> TaskResult {
        let summary = cleanup::prune_history(ctx.store(), ctx.config().history_age_days).await?;

        ctx.replace_execution_details(json!({
            "cutoff": summary.cutoff,
            "metricsDeleted": summary.metrics_deleted,
            "executionsDeleted": summary.executions_deleted,
        }))
        .await?;

        Ok(None)
    }
}
