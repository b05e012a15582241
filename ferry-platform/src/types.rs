//! Platform API payloads
//!
//! Only the fields the exporter reads are modelled; everything else in the
//! responses is ignored.

use serde::{Deserialize, Serialize};

/// GET /version
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformVersion {
    #[serde(default)]
    pub version: Option<String>,
}

/// GET /v4/auth/principal
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    #[serde(default = "anonymous")]
    pub is_anonymous: bool,
}

fn anonymous() -> bool {
    true
}

/// A hosted project
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub allowed_operations: Vec<String>,
}

impl ProjectInfo {
    /// The key owns enough of the project to export it
    pub fn can_change_settings(&self) -> bool {
        self.allowed_operations
            .iter()
            .any(|op| op == "ChangeProjectSettings")
    }
}

/// One commit of a project's file tree
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    /// Epoch milliseconds
    pub commit_time: i64,
}

/// One file at the head commit
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    /// Blob key used to download the contents
    pub key: String,
    pub path: FilePath,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePath {
    pub canonicalized_path_string: String,
}

/// GET /v4/projects/{id}/useableEnvironments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseableEnvironments {
    #[serde(default)]
    pub currently_selected_environment: Option<SelectedEnvironment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedEnvironment {
    pub id: String,
    pub v2_environment_details: EnvironmentDetails,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDetails {
    pub selected_revision: i64,
}

/// Compute environment identity plus the revision a project uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeEnvironmentRevision {
    pub id: String,
    pub revision: i64,
}

/// GET /v1/environments
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentList {
    #[serde(default)]
    pub data: Vec<EnvironmentSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub visibility: Option<String>,
}

/// GET /environments/{id}/json
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentInfo {
    #[serde(default)]
    pub revisions: Vec<EnvironmentRevision>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRevision {
    pub number: i64,
    #[serde(default)]
    pub docker_image_name: Option<String>,
}

impl EnvironmentInfo {
    /// Image reference of one revision
    pub fn image_for_revision(&self, revision: i64) -> Option<&str> {
        self.revisions
            .iter()
            .filter(|r| r.number == revision)
            .filter_map(|r| r.docker_image_name.as_deref())
            .last()
    }
}

/// Newest commit by commit time
pub fn latest_commit(commits: &[Commit]) -> Option<&Commit> {
    commits.iter().max_by_key(|c| c.commit_time)
}
