//! Status projections
//!
//! Pure read models computed over executions, job run links and jobs.

use serde::{Deserialize, Serialize};

/// Coarse state of one project export run cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportState {
    /// The job exists but never ran
    Scheduled,
    Running,
    Error,
    /// Every export task found nothing changed
    Skipped,
    Disabled,
    Success,
}

/// Status of one project export run cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStatusRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub export_id: String,
    pub run_cycle_id: i64,
    pub status: ExportState,
    pub error_code: i32,
    pub error_message: Option<String>,
    pub export_frequency_seconds: i64,
    pub owner: Option<String>,
    pub project: Option<String>,
    pub export_group: Option<String>,
    pub export_project: Option<String>,
    pub project_export_runtime_seconds: f64,
    pub project_export_location: Option<String>,
    pub project_commit_id: Option<String>,
    pub project_export_status: Option<String>,
    pub image_export_runtime_seconds: f64,
    pub image_export_location: Vec<String>,
    pub image_export_status: Option<String>,
    pub image_environment_name: Option<String>,
}

/// One line of the all-exports summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportsSummaryRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub export_id: String,
    pub status: ExportState,
    pub sync_log_path: Option<String>,
}

/// Latest collaborator health as served to monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_healthy: Option<bool>,
    pub api_version: String,
    pub health_check_timestamp: chrono::DateTime<chrono::Utc>,
    pub platform_connection_healthy: Option<bool>,
    pub platform_registry_connection_healthy: Option<bool>,
    pub object_store_connection_healthy: Option<bool>,
    pub export_registry_connection_healthy: Option<bool>,
}
