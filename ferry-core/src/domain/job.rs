//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use super::task::JobType;
use super::task_state::JobDetails;

/// A recurring unit of work
///
/// Persisted by the exporter; `details` carries the idempotency markers
/// (`taskState`) that executions read and advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: i64,
    /// Externally visible identity, also the recurring trigger key
    pub export_id: String,
    pub job_type: JobType,
    /// Owner of the hosted project on the platform
    pub owner: Option<String>,
    pub project: Option<String>,
    pub export_group: Option<String>,
    pub export_project: Option<String>,
    /// Inactive jobs stay scheduled but every execution is marked disabled
    pub active: bool,
    pub run_frequency_seconds: i64,
    #[serde(skip_serializing)]
    pub secrets: Option<Secret>,
    pub details: JobDetails,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl JobDefinition {
    /// Owner and project, when this is a project export job
    pub fn project_ref(&self) -> Option<(&str, &str)> {
        match (&self.owner, &self.project) {
            (Some(owner), Some(project)) => Some((owner, project)),
            _ => None,
        }
    }
}

/// Credential material that must not show up in logs
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}
