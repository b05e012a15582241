//! Job DTOs

use serde::Deserialize;

use crate::domain::job::Secret;
use crate::domain::task::JobType;
use crate::domain::task_state::JobDetails;

/// Request to create a job definition
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub job_type: JobType,
    pub owner: Option<String>,
    pub project: Option<String>,
    pub export_group: Option<String>,
    pub export_project: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub run_frequency_seconds: i64,
    pub secrets: Option<Secret>,
    #[serde(default)]
    pub details: JobDetails,
}

fn default_active() -> bool {
    true
}

impl NewJob {
    /// A job the service owns, with no project or credentials
    pub fn service(job_type: JobType, run_frequency_seconds: i64) -> Self {
        Self {
            job_type,
            owner: None,
            project: None,
            export_group: None,
            export_project: None,
            active: true,
            run_frequency_seconds,
            secrets: None,
            details: JobDetails::new(),
        }
    }

    /// A project export job
    pub fn project_export(
        owner: impl Into<String>,
        project: impl Into<String>,
        export_group: impl Into<String>,
        export_project: impl Into<String>,
        api_key: Secret,
        run_frequency_seconds: i64,
    ) -> Self {
        Self {
            job_type: JobType::ProjectExport,
            owner: Some(owner.into()),
            project: Some(project.into()),
            export_group: Some(export_group.into()),
            export_project: Some(export_project.into()),
            active: true,
            run_frequency_seconds,
            secrets: Some(api_key),
            details: JobDetails::new(),
        }
    }
}
