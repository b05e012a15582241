//! Container image registry access
//!
//! Handles the image side of an export:
//! - Pulling the environment image from the platform registry
//! - Building the export image from a rendered Dockerfile
//! - Pushing tags to the export registry
//! - Pruning build cache afterwards

use async_trait::async_trait;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Container engine API error: {0}")]
    Api(String),

    #[error("Container resource not found: {0}")]
    NotFound(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Invalid repository: {0}")]
    InvalidRepository(String),

    #[error("Image build failed: {0}")]
    Build(String),

    #[error("Container engine error: {0}")]
    Engine(String),
}

impl RegistryError {
    /// Exception type recorded on a failed execution
    pub fn kind_name(&self) -> &'static str {
        match self {
            RegistryError::Api(_) => "ContainerApiError",
            RegistryError::NotFound(_) => "ContainerNotFound",
            RegistryError::ImageNotFound(_) => "ContainerImageNotFound",
            RegistryError::InvalidRepository(_) => "ContainerInvalidRepository",
            RegistryError::Build(_) => "ContainerBuildError",
            RegistryError::Engine(_) => "ContainerError",
        }
    }
}

/// Image operations the export tasks need
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Pull an image from the platform registry
    async fn pull(&self, image: &str) -> Result<(), RegistryError>;

    /// Build `dockerfile` and tag the result with every name in `tags`
    async fn build(&self, dockerfile: &str, tags: &[String]) -> Result<(), RegistryError>;

    /// Push one tag to the export registry
    async fn push(&self, image: &str) -> Result<(), RegistryError>;

    /// Release build cache left by previous builds
    async fn cleanup(&self) -> Result<(), RegistryError>;

    /// True when no platform registry is configured
    async fn platform_registry_healthy(&self) -> bool;

    async fn export_registry_healthy(&self) -> bool;
}

/// Registry access through the podman (or docker) CLI
#[derive(Clone)]
pub struct PodmanRegistry {
    cli: String,
    platform_registry: RegistryConfig,
    export_registry: RegistryConfig,
}

impl PodmanRegistry {
    pub fn new(
        cli: impl Into<String>,
        platform_registry: RegistryConfig,
        export_registry: RegistryConfig,
    ) -> Self {
        Self {
            cli: cli.into(),
            platform_registry,
            export_registry,
        }
    }

    /// Checks the container CLI is installed and answering
    pub fn check_available(&self) -> Result<(), RegistryError> {
        let output = self.command(&["--version"], None)?;
        if !output.status.success() {
            return Err(RegistryError::Engine(format!(
                "'{} --version' exited with {}",
                self.cli, output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("Container engine is available: {}", version.trim());
        Ok(())
    }

    /// Runs one CLI command, feeding `stdin` when given
    fn command(&self, args: &[&str], stdin: Option<&str>) -> Result<Output, RegistryError> {
        let mut command = Command::new(&self.cli);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|e| {
            RegistryError::Engine(format!("Failed to execute '{}': {}", self.cli, e))
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .map_err(|e| RegistryError::Engine(format!("Failed to write stdin: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| RegistryError::Engine(format!("Failed to wait for '{}': {}", self.cli, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // Always log stdout/stderr as debug
        if !stdout.trim().is_empty() {
            debug!("{} {} stdout: {}", self.cli, args[0], stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{} {} stderr: {}", self.cli, args[0], stderr.trim());
        }

        Ok(output)
    }

    /// Runs a command and maps a non-zero exit through `classify`
    fn checked(
        &self,
        args: &[&str],
        stdin: Option<&str>,
        classify: fn(&str) -> RegistryError,
    ) -> Result<(), RegistryError> {
        let output = self.command(args, stdin)?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify(stderr.trim()))
    }

    fn login(&self, registry: &RegistryConfig) -> Result<(), RegistryError> {
        let (Some(url), Some(username), Some(password)) = (
            registry.url.as_deref(),
            registry.username.as_deref(),
            registry.password.as_deref(),
        ) else {
            return Ok(());
        };

        self.checked(
            &["login", "--username", username, "--password-stdin", url],
            Some(password),
            classify_api_failure,
        )
    }

    fn pull_blocking(&self, image: &str) -> Result<(), RegistryError> {
        self.login(&self.platform_registry)?;
        info!("Pulling image {}", image);
        self.checked(&["pull", image], None, classify_pull_failure)
    }

    fn build_blocking(&self, dockerfile: &str, tags: &[String]) -> Result<(), RegistryError> {
        self.login(&self.platform_registry)?;

        let context = build_context(dockerfile)?;
        let context_path = context.path().to_string_lossy().to_string();

        let mut args = vec!["build"];
        for tag in tags {
            args.push("-t");
            args.push(tag.as_str());
        }
        args.push(context_path.as_str());

        info!("Building image {}", tags.join(", "));
        self.checked(&args, None, classify_build_failure)
    }

    fn push_blocking(&self, image: &str) -> Result<(), RegistryError> {
        self.login(&self.export_registry)?;
        info!("Pushing image {}", image);
        self.checked(&["push", image], None, classify_push_failure)
    }

    fn cleanup_blocking(&self) -> Result<(), RegistryError> {
        self.checked(&["builder", "prune", "--force"], None, classify_api_failure)
    }

    fn registry_healthy_blocking(&self, registry: &RegistryConfig) -> bool {
        if let Err(e) = self.check_available() {
            warn!("Container engine unavailable: {}", e);
            return false;
        }

        match self.login(registry) {
            Ok(()) => true,
            Err(e) => {
                warn!("Registry login failed: {}", e);
                false
            }
        }
    }
}

/// Runs blocking CLI work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T, RegistryError>
where
    F: FnOnce() -> Result<T, RegistryError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RegistryError::Engine(format!("Container task failed: {}", e)))?
}

#[async_trait]
impl ImageRegistry for PodmanRegistry {
    async fn pull(&self, image: &str) -> Result<(), RegistryError> {
        let this = self.clone();
        let image = image.to_string();
        blocking(move || this.pull_blocking(&image)).await
    }

    async fn build(&self, dockerfile: &str, tags: &[String]) -> Result<(), RegistryError> {
        let this = self.clone();
        let dockerfile = dockerfile.to_string();
        let tags = tags.to_vec();
        blocking(move || this.build_blocking(&dockerfile, &tags)).await
    }

    async fn push(&self, image: &str) -> Result<(), RegistryError> {
        let this = self.clone();
        let image = image.to_string();
        blocking(move || this.push_blocking(&image)).await
    }

    async fn cleanup(&self) -> Result<(), RegistryError> {
        let this = self.clone();
        blocking(move || this.cleanup_blocking()).await
    }

    async fn platform_registry_healthy(&self) -> bool {
        if self.platform_registry.url.is_none() {
            return true;
        }
        let this = self.clone();
        blocking(move || Ok(this.registry_healthy_blocking(&this.platform_registry)))
            .await
            .unwrap_or(false)
    }

    async fn export_registry_healthy(&self) -> bool {
        let this = self.clone();
        blocking(move || Ok(this.registry_healthy_blocking(&this.export_registry)))
            .await
            .unwrap_or(false)
    }
}

/// Scratch directory holding a rendered Dockerfile, removed on drop
fn build_context(dockerfile: &str) -> Result<TempDir, RegistryError> {
    let context = tempfile::Builder::new()
        .prefix("ferry-build-")
        .tempdir()
        .map_err(|e| RegistryError::Engine(format!("Failed to create build context: {}", e)))?;

    std::fs::write(context.path().join("Dockerfile"), dockerfile)
        .map_err(|e| RegistryError::Engine(format!("Failed to write Dockerfile: {}", e)))?;

    Ok(context)
}

// ============================================================================
// Failure classification
// ============================================================================

fn is_invalid_reference(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("invalid reference format") || lower.contains("repository name must")
}

fn classify_pull_failure(stderr: &str) -> RegistryError {
    let lower = stderr.to_lowercase();
    if is_invalid_reference(stderr) {
        RegistryError::InvalidRepository(stderr.to_string())
    } else if lower.contains("manifest unknown")
        || lower.contains("image not known")
        || lower.contains("not found")
    {
        RegistryError::ImageNotFound(stderr.to_string())
    } else {
        classify_api_failure(stderr)
    }
}

fn classify_build_failure(stderr: &str) -> RegistryError {
    if is_invalid_reference(stderr) {
        RegistryError::InvalidRepository(stderr.to_string())
    } else {
        RegistryError::Build(stderr.to_string())
    }
}

fn classify_push_failure(stderr: &str) -> RegistryError {
    let lower = stderr.to_lowercase();
    if is_invalid_reference(stderr) {
        RegistryError::InvalidRepository(stderr.to_string())
    } else if lower.contains("image not known") || lower.contains("no such image") {
        RegistryError::NotFound(stderr.to_string())
    } else {
        classify_api_failure(stderr)
    }
}

fn classify_api_failure(stderr: &str) -> RegistryError {
    RegistryError::Api(stderr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_failures_are_classified() {
        assert!(matches!(
            classify_pull_failure("Error: initializing source: manifest unknown"),
            RegistryError::ImageNotFound(_)
        ));
        assert!(matches!(
            classify_pull_failure("Error: invalid reference format"),
            RegistryError::InvalidRepository(_)
        ));
        assert!(matches!(
            classify_pull_failure("Error: unauthorized: authentication required"),
            RegistryError::Api(_)
        ));
    }

    #[test]
    fn test_build_failure_is_build_error() {
        let err = classify_build_failure("Error: building at STEP \"RUN false\": exit status 1");
        assert_eq!(err.kind_name(), "ContainerBuildError");
    }

    #[test]
    fn test_push_of_missing_image() {
        assert!(matches!(
            classify_push_failure("Error: localhost/x:latest: image not known"),
            RegistryError::NotFound(_)
        ));
    }

    #[test]
    fn test_missing_cli_is_engine_error() {
        let registry = PodmanRegistry::new(
            "ferry-no-such-container-cli",
            RegistryConfig::default(),
            RegistryConfig::default(),
        );
        let err = registry.check_available().unwrap_err();
        assert_eq!(err.kind_name(), "ContainerError");
    }

    #[test]
    fn test_build_context_is_removed_on_drop() {
        let context = build_context("FROM scratch\n").unwrap();
        let path = context.path().to_path_buf();
        assert!(path.join("Dockerfile").exists());

        drop(context);
        assert!(!path.exists());
    }
}
