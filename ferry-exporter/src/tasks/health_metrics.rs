//! Collaborator health sampling

use async_trait::async_trait;
use serde_json::json;

use super::{Task, TaskResult};
use crate::service::{ExecutionContext, health};

pub struct HealthMetricsCollection;

#[async_trait]
impl Task for HealthMetricsCollection {
    async fn execute(&self, ctx: &mut ExecutionContext) -> TaskResult {
        let metric = health::collect(ctx.store(), ctx.config(), ctx.collaborators()).await?;

        ctx.replace_execution_details(json!({
            "metricId": metric.id,
            "overallHealthy": metric.overall_healthy(),
        }))
        .await?;

        Ok(None)
    }
}
