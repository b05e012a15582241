//! Exporter configuration
//!
//! Defines every tunable of the service: store location and retry policy,
//! worker pool sizes and timeouts, schedule frequencies of the service jobs,
//! collaborator endpoints, and the templates that name export locations.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Credentials for one container registry
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Registry host, e.g. "registry.example.com:5000"
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `{name}` templates for export locations and image names
///
/// Placeholders: `{bucket}`, `{owner}`, `{project}`, `{export_group}`,
/// `{export_project}`, `{export_path}` (the rendered `export_path`),
/// `{registry}`, `{environment_id}`, `{environment_revision}`.
#[derive(Debug, Clone)]
pub struct ExportTemplates {
    pub export_path: String,
    pub export_latest: String,
    pub export_prior: String,
    pub sync_log_path: String,
    pub exports_summary_path: String,
    pub image_latest: String,
    pub image_version: String,
}

impl Default for ExportTemplates {
    fn default() -> Self {
        Self {
            export_path: "{bucket}/{export_group}/{export_project}".to_string(),
            export_latest: "{export_path}/latest".to_string(),
            export_prior: "{export_path}/prior".to_string(),
            sync_log_path: "{export_path}/sync-log.json".to_string(),
            exports_summary_path: "{bucket}/exports-status.json".to_string(),
            image_latest: "{registry}/{export_group}/{export_project}:latest".to_string(),
            image_version:
                "{registry}/{export_group}/{export_project}:{environment_id}-v{environment_revision}"
                    .to_string(),
        }
    }
}

/// Exporter configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection string
    pub database_url: String,
    /// Base64 AES-256 key; generated on first start when missing
    pub encryption_key_file: PathBuf,
    /// Address of the read-only status API
    pub bind_addr: String,

    /// Supervisor pool size; the executions pool is three times larger
    pub max_workers: usize,
    /// Upper bound on one task body's runtime
    pub task_timeout: Duration,
    /// How long an execution may wait for an executions-pool slot
    pub schedule_timeout: Duration,
    /// Fallback poll interval of a supervisor's join
    pub wait_check_interval: Duration,
    /// Upper bound of the random delay added to each interval tick
    pub schedule_jitter: Duration,
    /// Ticks later than this are dropped
    pub misfire_grace: Duration,

    pub db_max_query_attempts: u32,
    pub db_query_attempt_wait: Duration,

    /// Export even when fingerprints are unchanged
    pub force_run: bool,
    pub export_job_frequency_seconds: i64,
    pub status_report_frequency_seconds: i64,
    pub healthcheck_frequency_seconds: i64,
    pub healthcheck_timeout: Duration,
    pub prune_frequency_seconds: i64,
    pub history_age_days: i64,
    pub sync_log_max_records: usize,

    pub platform_api_url: String,
    pub platform_verify_tls: bool,
    pub platform_registry: RegistryConfig,
    pub export_registry: RegistryConfig,
    /// Container engine binary (podman or docker)
    pub container_cli: String,
    /// Directory holding Dockerfile templates named by `dockerBuildTemplateFile`
    pub docker_build_template_path: PathBuf,
    /// Root directory of the filesystem object store
    pub object_store_root: PathBuf,
    pub export_bucket: String,
    pub templates: ExportTemplates,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/ferry.db".to_string(),
            encryption_key_file: PathBuf::from("data/ferry.key"),
            bind_addr: "0.0.0.0:8080".to_string(),
            max_workers: 10,
            task_timeout: Duration::from_secs(6 * 3600),
            schedule_timeout: Duration::from_secs(3600),
            wait_check_interval: Duration::from_secs(5),
            schedule_jitter: Duration::from_secs(300),
            misfire_grace: Duration::from_secs(60),
            db_max_query_attempts: 10,
            db_query_attempt_wait: Duration::from_millis(500),
            force_run: false,
            export_job_frequency_seconds: 3600,
            status_report_frequency_seconds: 300,
            healthcheck_frequency_seconds: 60,
            healthcheck_timeout: Duration::from_secs(20),
            prune_frequency_seconds: 86_400,
            history_age_days: 30,
            sync_log_max_records: 100,
            platform_api_url: "http://localhost:8888".to_string(),
            platform_verify_tls: true,
            platform_registry: RegistryConfig::default(),
            export_registry: RegistryConfig {
                url: Some("localhost:5000".to_string()),
                ..RegistryConfig::default()
            },
            container_cli: "podman".to_string(),
            docker_build_template_path: PathBuf::from("templates"),
            object_store_root: PathBuf::from("data/objects"),
            export_bucket: "exports".to_string(),
            templates: ExportTemplates::default(),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional; unset or unparsable values keep the default.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env(&lookup);

        let templates = ExportTemplates {
            export_path: env.string("EXPORT_PATH_FORMAT", defaults.templates.export_path),
            export_latest: env.string("EXPORT_LATEST_FORMAT", defaults.templates.export_latest),
            export_prior: env.string("EXPORT_PRIOR_FORMAT", defaults.templates.export_prior),
            sync_log_path: env.string("SYNC_LOG_PATH_FORMAT", defaults.templates.sync_log_path),
            exports_summary_path: env.string(
                "EXPORTS_SUMMARY_PATH_FORMAT",
                defaults.templates.exports_summary_path,
            ),
            image_latest: env.string(
                "EXPORT_IMAGE_LATEST_FORMAT",
                defaults.templates.image_latest,
            ),
            image_version: env.string(
                "EXPORT_IMAGE_VERSION_FORMAT",
                defaults.templates.image_version,
            ),
        };

        Ok(Self {
            database_url: env.string("DATABASE_URL", defaults.database_url),
            encryption_key_file: env
                .optional("ENCRYPTION_KEY_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.encryption_key_file),
            bind_addr: env.string("BIND_ADDR", defaults.bind_addr),
            max_workers: env.parse("JOBS_MAX_CONCURRENT_WORKERS", defaults.max_workers),
            task_timeout: env.seconds("JOB_TASK_TIMEOUT_SECONDS", defaults.task_timeout),
            schedule_timeout: env.seconds(
                "EXECUTION_SCHEDULE_TIMEOUT_SECONDS",
                defaults.schedule_timeout,
            ),
            wait_check_interval: env.seconds(
                "JOB_WAIT_CHECK_INTERVAL_SECONDS",
                defaults.wait_check_interval,
            ),
            schedule_jitter: env.seconds("SCHEDULE_JITTER_SECONDS", defaults.schedule_jitter),
            misfire_grace: env.seconds("SCHEDULE_MISFIRE_GRACE_SECONDS", defaults.misfire_grace),
            db_max_query_attempts: env
                .parse("DB_MAX_QUERY_ATTEMPTS", defaults.db_max_query_attempts),
            db_query_attempt_wait: env
                .optional("DB_QUERY_ATTEMPT_WAIT_MILLIS")
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.db_query_attempt_wait),
            force_run: env.parse("EXPORTS_FORCE_RUN", defaults.force_run),
            export_job_frequency_seconds: env.parse(
                "EXPORT_JOB_DEFAULT_FREQUENCY_SECONDS",
                defaults.export_job_frequency_seconds,
            ),
            status_report_frequency_seconds: env.parse(
                "EXPORTS_STATUS_REPORT_FREQUENCY_SECONDS",
                defaults.status_report_frequency_seconds,
            ),
            healthcheck_frequency_seconds: env.parse(
                "HEALTHCHECK_FREQUENCY_SECONDS",
                defaults.healthcheck_frequency_seconds,
            ),
            healthcheck_timeout: env
                .seconds("HEALTHCHECK_TIMEOUT_SECONDS", defaults.healthcheck_timeout),
            prune_frequency_seconds: env.parse(
                "DATABASE_PRUNE_FREQUENCY_SECONDS",
                defaults.prune_frequency_seconds,
            ),
            history_age_days: env.parse("DATABASE_HISTORY_AGE_DAYS", defaults.history_age_days),
            sync_log_max_records: env
                .parse("SYNC_LOG_MAX_RECORDS", defaults.sync_log_max_records),
            platform_api_url: env.string("PLATFORM_API_URL", defaults.platform_api_url),
            platform_verify_tls: env.parse("PLATFORM_VERIFY_TLS", defaults.platform_verify_tls),
            platform_registry: env.registry("PLATFORM_REGISTRY", defaults.platform_registry),
            export_registry: env.registry("EXPORT_REGISTRY", defaults.export_registry),
            container_cli: env.string("CONTAINER_CLI", defaults.container_cli),
            docker_build_template_path: env
                .optional("DOCKER_BUILD_TEMPLATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.docker_build_template_path),
            object_store_root: env
                .optional("OBJECT_STORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.object_store_root),
            export_bucket: env.string("EXPORT_BUCKET", defaults.export_bucket),
            templates,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }

        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be greater than 0");
        }

        for (name, value) in [
            ("task_timeout", self.task_timeout),
            ("schedule_timeout", self.schedule_timeout),
            ("wait_check_interval", self.wait_check_interval),
            ("healthcheck_timeout", self.healthcheck_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        for (name, value) in [
            ("export_job_frequency_seconds", self.export_job_frequency_seconds),
            ("status_report_frequency_seconds", self.status_report_frequency_seconds),
            ("healthcheck_frequency_seconds", self.healthcheck_frequency_seconds),
            ("prune_frequency_seconds", self.prune_frequency_seconds),
        ] {
            if value <= 0 {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.db_max_query_attempts == 0 {
            anyhow::bail!("db_max_query_attempts must be at least 1");
        }

        if !self.platform_api_url.starts_with("http://")
            && !self.platform_api_url.starts_with("https://")
        {
            anyhow::bail!("platform_api_url must start with http:// or https://");
        }

        if self.export_registry.url.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("export registry url must be set");
        }

        Ok(())
    }
}

/// Typed reads over a key lookup
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: String) -> String {
        self.optional(key).unwrap_or(default)
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.optional(key)
            .and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }

    fn seconds(&self, key: &str, default: Duration) -> Duration {
        self.optional(key)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    fn registry(&self, prefix: &str, default: RegistryConfig) -> RegistryConfig {
        RegistryConfig {
            url: self.optional(prefix).or(default.url),
            username: self
                .optional(&format!("{}_USERNAME", prefix))
                .or(default.username),
            password: self
                .optional(&format!("{}_PASSWORD", prefix))
                .or(default.password),
        }
    }
}
