//! Task bodies
//!
//! One body per [`TaskKind`]; dispatch is a closed match, so a new kind does
//! not compile until it has a body.

pub mod database_prune;
pub mod error;
pub mod export_report;
pub mod exports_summary;
pub mod files_export;
pub mod health_metrics;
pub mod image_export;

use async_trait::async_trait;
use ferry_core::domain::{StatusCode, TaskKind};

use crate::service::ExecutionContext;

pub use error::TaskError;

/// `Ok(None)` completes the execution, `Ok(Some(status))` overrides it
pub type TaskResult = Result<Option<StatusCode>, TaskError>;

#[async_trait]
pub trait Task: Send + Sync {
    async fn execute(&self, ctx: &mut ExecutionContext) -> TaskResult;
}

/// Run the body registered for `kind`
pub async fn execute(kind: TaskKind, ctx: &mut ExecutionContext) -> TaskResult {
    match kind {
        TaskKind::ProjectFilesExport => files_export::ProjectFilesExport.execute(ctx).await,
        TaskKind::ProjectImageExport => image_export::ProjectImageExport.execute(ctx).await,
        TaskKind::ProjectExportReport => export_report::ProjectExportReport.execute(ctx).await,
        TaskKind::AllExportsStatusReport => {
            exports_summary::AllExportsStatusReport.execute(ctx).await
        }
        TaskKind::HealthMetricsCollection => {
            health_metrics::HealthMetricsCollection.execute(ctx).await
        }
        TaskKind::DatabasePrune => database_prune::DatabasePrune.execute(ctx).await,
    }
}
