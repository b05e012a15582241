//! Platform access for task bodies
//!
//! Jobs carry their own API key, so a client is built per execution through
//! a [`PlatformConnector`].

use async_trait::async_trait;
use ferry_core::domain::Secret;
use ferry_platform::types::{ComputeEnvironmentRevision, ProjectFile, ProjectInfo};
use ferry_platform::{PlatformClient, PlatformError};
use std::sync::Arc;

/// Platform operations the export tasks need
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn find_project(&self, owner: &str, project: &str)
    -> Result<ProjectInfo, PlatformError>;

    /// Id of the newest commit, `None` for a project without commits
    async fn latest_commit_id(&self, project_id: &str) -> Result<Option<String>, PlatformError>;

    async fn list_latest_files(&self, project_id: &str) -> Result<Vec<ProjectFile>, PlatformError>;

    async fn file_contents(
        &self,
        owner: &str,
        project: &str,
        blob_key: &str,
    ) -> Result<Vec<u8>, PlatformError>;

    async fn compute_environment_revision(
        &self,
        owner: &str,
        project: &str,
    ) -> Result<ComputeEnvironmentRevision, PlatformError>;

    /// Display name of an environment, `None` when the key cannot see it
    async fn environment_name(&self, environment_id: &str)
    -> Result<Option<String>, PlatformError>;

    async fn environment_image(
        &self,
        environment_id: &str,
        revision: i64,
    ) -> Result<String, PlatformError>;
}

/// Builds platform clients and probes platform availability
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    fn connect(&self, api_key: &Secret) -> Result<Arc<dyn PlatformApi>, PlatformError>;

    async fn healthy(&self) -> bool;
}

/// Connector backed by the HTTP client
pub struct HttpPlatformConnector {
    base_url: String,
    verify_tls: bool,
}

impl HttpPlatformConnector {
    pub fn new(base_url: impl Into<String>, verify_tls: bool) -> Self {
        Self {
            base_url: base_url.into(),
            verify_tls,
        }
    }
}

#[async_trait]
impl PlatformConnector for HttpPlatformConnector {
    fn connect(&self, api_key: &Secret) -> Result<Arc<dyn PlatformApi>, PlatformError> {
        let client =
            PlatformClient::with_tls_verification(&self.base_url, api_key.expose(), self.verify_tls)?;
        Ok(Arc::new(client))
    }

    async fn healthy(&self) -> bool {
        let client = match PlatformClient::with_tls_verification(&self.base_url, "", self.verify_tls)
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Failed to build platform client for health check: {}", e);
                return false;
            }
        };

        match client.version().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Platform health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn find_project(
        &self,
        owner: &str,
        project: &str,
    ) -> Result<ProjectInfo, PlatformError> {
        PlatformClient::find_project(self, owner, project).await
    }

    async fn latest_commit_id(&self, project_id: &str) -> Result<Option<String>, PlatformError> {
        PlatformClient::latest_commit_id(self, project_id).await
    }

    async fn list_latest_files(&self, project_id: &str) -> Result<Vec<ProjectFile>, PlatformError> {
        PlatformClient::list_latest_files(self, project_id).await
    }

    async fn file_contents(
        &self,
        owner: &str,
        project: &str,
        blob_key: &str,
    ) -> Result<Vec<u8>, PlatformError> {
        PlatformClient::file_contents(self, owner, project, blob_key).await
    }

    async fn compute_environment_revision(
        &self,
        owner: &str,
        project: &str,
    ) -> Result<ComputeEnvironmentRevision, PlatformError> {
        PlatformClient::compute_environment_revision(self, owner, project).await
    }

    async fn environment_name(
        &self,
        environment_id: &str,
    ) -> Result<Option<String>, PlatformError> {
        Ok(self.environment_detail(environment_id).await?.name)
    }

    async fn environment_image(
        &self,
        environment_id: &str,
        revision: i64,
    ) -> Result<String, PlatformError> {
        PlatformClient::environment_image(self, environment_id, revision).await
    }
}
