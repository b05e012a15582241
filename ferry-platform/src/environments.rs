//! Compute environment endpoints

use crate::PlatformClient;
use crate::error::{PlatformError, Result};
use crate::types::{
    ComputeEnvironmentRevision, EnvironmentInfo, EnvironmentList, EnvironmentSummary,
    PlatformVersion, SelectedEnvironment, UseableEnvironments,
};

impl PlatformClient {
    /// GET /version
    ///
    /// Needs no valid key; used as the platform health probe.
    pub async fn version(&self) -> Result<PlatformVersion> {
        let response = self.get("/version").await?;
        self.handle_response(response, "version").await
    }

    /// Environment the project currently selects
    pub async fn project_compute_environment(&self, project_id: &str) -> Result<SelectedEnvironment> {
        self.ensure_valid_api_key().await?;

        let response = self
            .get(&format!("/v4/projects/{}/useableEnvironments", project_id))
            .await?;
        let environments: UseableEnvironments = self.handle_response(response, "project").await?;

        environments
            .currently_selected_environment
            .ok_or(PlatformError::ComputeEnvironmentRevisionNotAvailable)
    }

    /// Compute environment id and revision used by a project
    pub async fn compute_environment_revision(
        &self,
        owner: &str,
        project: &str,
    ) -> Result<ComputeEnvironmentRevision> {
        let project = self.find_project(owner, project).await?;
        let selected = self.project_compute_environment(&project.id).await?;

        Ok(ComputeEnvironmentRevision {
            id: selected.id,
            revision: selected.v2_environment_details.selected_revision,
        })
    }

    /// GET /v1/environments
    pub async fn environments(&self) -> Result<Vec<EnvironmentSummary>> {
        self.ensure_valid_api_key().await?;

        let response = self.get("/v1/environments").await?;
        let list: EnvironmentList = self
            .handle_response(response, "compute environment")
            .await?;

        Ok(list.data)
    }

    /// Summary of one environment; empty when the key cannot see it
    pub async fn environment_detail(&self, environment_id: &str) -> Result<EnvironmentSummary> {
        let detail = self
            .environments()
            .await?
            .into_iter()
            .find(|e| e.id.as_deref() == Some(environment_id))
            .unwrap_or_default();

        Ok(detail)
    }

    /// Image reference built for one environment revision
    pub async fn environment_image(&self, environment_id: &str, revision: i64) -> Result<String> {
        self.ensure_valid_api_key().await?;

        let response = self
            .get(&format!("/environments/{}/json", environment_id))
            .await?;
        let info: EnvironmentInfo = self
            .handle_response(response, "compute environment")
            .await?;

        info.image_for_revision(revision)
            .map(str::to_string)
            .ok_or(PlatformError::ComputeEnvironmentRevisionNotAvailable)
    }
}
