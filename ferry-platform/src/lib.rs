//! Ferry Platform Client
//!
//! A typed HTTP client for the hosted data-science platform whose projects
//! the exporter copies out.
//!
//! # Example
//!
//! ```no_run
//! use ferry_platform::PlatformClient;
//!
//! # async fn example() -> ferry_platform::Result<()> {
//! let client = PlatformClient::new("https://platform.example.com", "api-key")?;
//! let project = client.find_project("alice", "churn-model").await?;
//! let files = client.list_latest_files(&project.id).await?;
//! println!("{} files at head", files.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
mod environments;
mod projects;
pub mod types;

pub use error::{PlatformError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "X-Domino-Api-Key";

/// HTTP client for one API key
///
/// Endpoints are grouped by resource:
/// - Projects: lookup, commits, head file listing and blob download
/// - Compute environments: selected revision, names and image references
#[derive(Debug, Clone)]
pub struct PlatformClient {
    /// Base URL of the platform (e.g., "https://platform.example.com")
    base_url: String,
    api_key: String,
    client: Client,
}

impl PlatformClient {
    /// Create a client that verifies TLS certificates
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_tls_verification(base_url, api_key, true)
    }

    /// Create a client, optionally accepting invalid certificates
    pub fn with_tls_verification(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        verify_tls: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;

        Ok(Self::with_client(base_url, api_key, client))
    }

    /// Create a client around a configured reqwest Client
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Get the base URL of the platform
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Request Helpers
    // =============================================================================

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        self.get_with_query(path, &[]).await
    }

    async fn get_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?;

        Ok(response)
    }

    /// Check the status and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        resource: &str,
    ) -> Result<T> {
        let response = self.check_status(response, resource).await?;

        response
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(format!("Failed to parse {}: {}", resource, e)))
    }

    /// Turn a non-success response into a classified error
    async fn check_status(
        &self,
        response: reqwest::Response,
        resource: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PlatformError::from_response(
                status.as_u16(),
                &error_text,
                resource,
            ));
        }

        Ok(response)
    }
}
