use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferry_exporter::api::{self, AppState};
use ferry_exporter::cipher::AesGcmCipher;
use ferry_exporter::config::Config;
use ferry_exporter::integrations::{Collaborators, FsObjectStore, HttpPlatformConnector, PodmanRegistry};
use ferry_exporter::repository::{RetryPolicy, Store};
use ferry_exporter::scheduler::Scheduler;
use ferry_exporter::service::{self, Services};
use ferry_exporter::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_exporter=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ferry Exporter...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    let cipher = AesGcmCipher::from_key_file(&config.encryption_key_file)
        .context("Failed to load encryption key")?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store = Store::new(
        pool,
        RetryPolicy {
            max_attempts: config.db_max_query_attempts,
            wait: config.db_query_attempt_wait,
        },
        Arc::new(cipher),
    );

    let registry = PodmanRegistry::new(
        config.container_cli.clone(),
        config.platform_registry.clone(),
        config.export_registry.clone(),
    );
    if let Err(e) = registry.check_available() {
        tracing::warn!("Container engine unavailable, image exports will fail: {}", e);
    }

    let collaborators = Collaborators {
        platform: Arc::new(HttpPlatformConnector::new(
            config.platform_api_url.clone(),
            config.platform_verify_tls,
        )),
        registry: Arc::new(registry),
        storage: Arc::new(FsObjectStore::new(config.object_store_root.clone())),
    };

    let services = Services::new(store.clone(), config.clone(), collaborators);
    let scheduler = Scheduler::new(services);

    service::bootstrap::run(&scheduler)
        .await
        .context("Failed to bootstrap scheduler")?;

    let app = api::create_router(AppState {
        store,
        config: config.clone(),
    });

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start server")?;

    scheduler.shutdown();
    tracing::info!("Ferry Exporter stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
