//! Test support: a temporary store and scripted collaborators

use async_trait::async_trait;
use ferry_core::domain::{JobDefinition, Secret};
use ferry_core::dto::job::NewJob;
use ferry_platform::PlatformError;
use ferry_platform::types::{ComputeEnvironmentRevision, FilePath, ProjectFile, ProjectInfo};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::cipher::AesGcmCipher;
use crate::config::{Config, RegistryConfig};
use crate::db;
use crate::integrations::{
    Collaborators, FsObjectStore, ImageRegistry, ObjectStore, PlatformApi, PlatformConnector,
    RegistryError,
};
use crate::repository::{self, RetryPolicy, Store};
use crate::scheduler::Scheduler;
use crate::service::Services;
use crate::service::supervisor::{self, CycleOutcome};

pub const OWNER: &str = "alice";
pub const PROJECT: &str = "churn-model";

/// Fresh migrated SQLite store inside `dir`
pub async fn temp_store(dir: &Path) -> Store {
    let url = format!("sqlite://{}", dir.join("ferry-test.db").display());
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    Store::new(
        pool,
        RetryPolicy {
            max_attempts: 3,
            wait: Duration::from_millis(10),
        },
        Arc::new(AesGcmCipher::new(&[7u8; 32]).unwrap()),
    )
}

/// Configuration pointing every location into `dir`, with short waits
pub fn test_config(dir: &Path) -> Config {
    let templates = dir.join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    std::fs::write(
        templates.join("default.Dockerfile"),
        "FROM {BASE_IMAGE}\nLABEL exported=true\n",
    )
    .unwrap();

    Config {
        database_url: format!("sqlite://{}", dir.join("ferry-test.db").display()),
        encryption_key_file: dir.join("ferry.key"),
        max_workers: 3,
        task_timeout: Duration::from_secs(10),
        schedule_timeout: Duration::from_secs(10),
        wait_check_interval: Duration::from_millis(20),
        schedule_jitter: Duration::ZERO,
        healthcheck_timeout: Duration::from_millis(200),
        db_query_attempt_wait: Duration::from_millis(10),
        export_registry: RegistryConfig {
            url: Some("registry.test".to_string()),
            ..RegistryConfig::default()
        },
        docker_build_template_path: templates,
        object_store_root: dir.join("objects"),
        ..Config::default()
    }
}

// ============================================================================
// Fake platform
// ============================================================================

struct PlatformState {
    commit_id: Option<String>,
    files: Vec<(String, Vec<u8>)>,
    environment: ComputeEnvironmentRevision,
    failure: Option<fn() -> PlatformError>,
}

/// Scripted platform serving one project
pub struct FakePlatform {
    state: Mutex<PlatformState>,
    healthy: Mutex<bool>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PlatformState {
                commit_id: Some("c1".to_string()),
                files: vec![
                    ("README.md".to_string(), b"# churn".to_vec()),
                    ("src/train.py".to_string(), b"print('train')".to_vec()),
                ],
                environment: ComputeEnvironmentRevision {
                    id: "env1".to_string(),
                    revision: 1,
                },
                failure: None,
            }),
            healthy: Mutex::new(true),
        })
    }

    pub fn set_commit(&self, commit_id: &str) {
        self.state.lock().unwrap().commit_id = Some(commit_id.to_string());
    }

    pub fn set_revision(&self, revision: i64) {
        self.state.lock().unwrap().environment.revision = revision;
    }

    pub fn fail_with(&self, failure: fn() -> PlatformError) {
        self.state.lock().unwrap().failure = Some(failure);
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap() = healthy;
    }

    fn check(&self) -> Result<(), PlatformError> {
        match self.state.lock().unwrap().failure {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn find_project(&self, _owner: &str, project: &str) -> Result<ProjectInfo, PlatformError> {
        self.check()?;
        Ok(ProjectInfo {
            id: "p1".to_string(),
            name: Some(project.to_string()),
            allowed_operations: vec!["ChangeProjectSettings".to_string()],
        })
    }

    async fn latest_commit_id(&self, _project_id: &str) -> Result<Option<String>, PlatformError> {
        self.check()?;
        Ok(self.state.lock().unwrap().commit_id.clone())
    }

    async fn list_latest_files(&self, _project_id: &str) -> Result<Vec<ProjectFile>, PlatformError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .map(|(path, body)| ProjectFile {
                key: path.clone(),
                path: FilePath {
                    canonicalized_path_string: path.clone(),
                },
                size: body.len() as u64,
            })
            .collect())
    }

    async fn file_contents(
        &self,
        _owner: &str,
        _project: &str,
        blob_key: &str,
    ) -> Result<Vec<u8>, PlatformError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .find(|(path, _)| path == blob_key)
            .map(|(_, body)| body.clone())
            .unwrap_or_default())
    }

    async fn compute_environment_revision(
        &self,
        _owner: &str,
        _project: &str,
    ) -> Result<ComputeEnvironmentRevision, PlatformError> {
        self.check()?;
        Ok(self.state.lock().unwrap().environment.clone())
    }

    async fn environment_name(&self, _environment_id: &str) -> Result<Option<String>, PlatformError> {
        Ok(Some("Python 3".to_string()))
    }

    async fn environment_image(
        &self,
        environment_id: &str,
        revision: i64,
    ) -> Result<String, PlatformError> {
        Ok(format!("platform.test/{}:{}", environment_id, revision))
    }
}

pub struct FakeConnector(pub Arc<FakePlatform>);

#[async_trait]
impl PlatformConnector for FakeConnector {
    fn connect(&self, _api_key: &Secret) -> Result<Arc<dyn PlatformApi>, PlatformError> {
        Ok(self.0.clone())
    }

    async fn healthy(&self) -> bool {
        *self.0.healthy.lock().unwrap()
    }
}

// ============================================================================
// Fake registry
// ============================================================================

/// Records every call; builds can be slowed down or made to fail
pub struct FakeRegistry {
    calls: Mutex<Vec<String>>,
    build_delay: Mutex<Duration>,
    build_failure: Mutex<Option<String>>,
    export_registry_delay: Mutex<Duration>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            build_delay: Mutex::new(Duration::ZERO),
            build_failure: Mutex::new(None),
            export_registry_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_build_delay(&self, delay: Duration) {
        *self.build_delay.lock().unwrap() = delay;
    }

    pub fn fail_builds(&self, message: &str) {
        *self.build_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_export_registry_delay(&self, delay: Duration) {
        *self.export_registry_delay.lock().unwrap() = delay;
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ImageRegistry for FakeRegistry {
    async fn pull(&self, image: &str) -> Result<(), RegistryError> {
        self.record(format!("pull {}", image));
        Ok(())
    }

    async fn build(&self, dockerfile: &str, tags: &[String]) -> Result<(), RegistryError> {
        let delay = *self.build_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        self.record(format!("build {}", tags.join(",")));
        assert!(!dockerfile.contains("{BASE_IMAGE}"));

        match self.build_failure.lock().unwrap().clone() {
            Some(message) => Err(RegistryError::Build(message)),
            None => Ok(()),
        }
    }

    async fn push(&self, image: &str) -> Result<(), RegistryError> {
        self.record(format!("push {}", image));
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), RegistryError> {
        self.record("cleanup".to_string());
        Ok(())
    }

    async fn platform_registry_healthy(&self) -> bool {
        true
    }

    async fn export_registry_healthy(&self) -> bool {
        let delay = *self.export_registry_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        true
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Services wired to a temp store, the fakes and a filesystem object store
pub struct Harness {
    pub dir: TempDir,
    pub services: Arc<Services>,
    pub scheduler: Scheduler,
    pub platform: Arc<FakePlatform>,
    pub registry: Arc<FakeRegistry>,
    pub storage: Arc<FsObjectStore>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        adjust(&mut config);

        let store = temp_store(dir.path()).await;
        let platform = FakePlatform::new();
        let registry = FakeRegistry::new();
        let storage = Arc::new(FsObjectStore::new(config.object_store_root.clone()));

        let collaborators = Collaborators {
            platform: Arc::new(FakeConnector(platform.clone())),
            registry: registry.clone(),
            storage: storage.clone(),
        };
        let services = Services::new(store, Arc::new(config), collaborators);
        let scheduler = Scheduler::new(services.clone());

        Self {
            dir,
            services,
            scheduler,
            platform,
            registry,
            storage,
        }
    }

    pub fn store(&self) -> &Store {
        &self.services.store
    }

    pub async fn project_export_job(&self) -> JobDefinition {
        let request = NewJob::project_export(
            OWNER,
            PROJECT,
            "analytics",
            "churn",
            Secret::new("api-key"),
            3600,
        );
        repository::job::create(self.store(), request).await.unwrap()
    }

    pub async fn run_cycle(&self, job_id: i64) -> CycleOutcome {
        supervisor::run_job_cycle(&self.scheduler, job_id)
            .await
            .unwrap()
    }

    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.storage.get(key).await.unwrap()
    }
}
