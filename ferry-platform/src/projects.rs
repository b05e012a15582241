//! Project endpoints

use crate::PlatformClient;
use crate::error::{PlatformError, Result};
use crate::types::{Commit, Principal, ProjectFile, ProjectInfo, latest_commit};

impl PlatformClient {
    // =============================================================================
    // Identity
    // =============================================================================

    /// GET /v4/auth/principal
    pub async fn auth_principal(&self) -> Result<Principal> {
        let response = self.get("/v4/auth/principal").await?;
        self.handle_response(response, "principal").await
    }

    /// True when the key resolves to a non-anonymous principal
    ///
    /// Any failure counts as an invalid key.
    pub async fn is_valid_api_key(&self) -> bool {
        match self.auth_principal().await {
            Ok(principal) => !principal.is_anonymous,
            Err(e) => {
                tracing::debug!("API key check failed: {}", e);
                false
            }
        }
    }

    /// Fail with `KeyInvalid` unless the key is recognised
    pub async fn ensure_valid_api_key(&self) -> Result<()> {
        if self.is_valid_api_key().await {
            Ok(())
        } else {
            Err(PlatformError::KeyInvalid)
        }
    }

    // =============================================================================
    // Projects
    // =============================================================================

    /// Look up a project by owner and name
    pub async fn find_project(&self, owner: &str, project: &str) -> Result<ProjectInfo> {
        self.ensure_valid_api_key().await?;

        let response = self
            .get_with_query(
                "/v4/gateway/projects/findProjectByOwnerAndName",
                &[("ownerName", owner), ("projectName", project)],
            )
            .await?;

        self.handle_response(response, "project").await
    }

    /// True when the key may change the project's settings
    pub async fn has_access_to_project(&self, owner: &str, project: &str) -> bool {
        self.find_project(owner, project)
            .await
            .map(|p| p.can_change_settings())
            .unwrap_or(false)
    }

    /// GET /v4/projects/{id}/commits
    pub async fn project_commits(&self, project_id: &str) -> Result<Vec<Commit>> {
        let response = self
            .get(&format!("/v4/projects/{}/commits", project_id))
            .await?;

        self.handle_response(response, "project").await
    }

    /// Id of the newest commit, or none for an empty project
    pub async fn latest_commit_id(&self, project_id: &str) -> Result<Option<String>> {
        let commits = self.project_commits(project_id).await?;
        Ok(latest_commit(&commits).map(|c| c.id.clone()))
    }

    /// Files at the head commit
    pub async fn list_latest_files(&self, project_id: &str) -> Result<Vec<ProjectFile>> {
        let response = self
            .get(&format!("/v4/projects/{}/commits/head/files//", project_id))
            .await?;

        self.handle_response(response, "project").await
    }

    /// Download one file's contents by blob key
    pub async fn file_contents(&self, owner: &str, project: &str, blob_key: &str) -> Result<Vec<u8>> {
        let path = format!("/v1/projects/{}/{}/blobs/{}", owner, project, blob_key);
        let response = self.get(&path).await?;
        let mut response = self.check_status(response, "file").await?;

        let mut contents = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            contents.extend_from_slice(&chunk);
        }

        Ok(contents)
    }
}
