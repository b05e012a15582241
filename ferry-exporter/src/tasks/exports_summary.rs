//! All-exports status summary

use async_trait::async_trait;
use tracing::info;

use super::{Task, TaskResult};
use crate::service::{ExecutionContext, reporting};
use crate::template;

pub struct AllExportsStatusReport;

#[async_trait]
impl Task for AllExportsStatusReport {
    async fn execute(&self, ctx: &mut ExecutionContext) -> TaskResult {
        let summary = reporting::all_exports_summary(ctx.store(), ctx.config()).await?;
        let key = template::exports_summary_path(&ctx.config().templates, &ctx.config().export_bucket)?;

        ctx.collaborators()
            .storage
            .put(&key, serde_json::to_vec_pretty(&summary)?)
            .await?;

        info!("Saved status of {} exports to {}", summary.len(), key);
        Ok(None)
    }
}
