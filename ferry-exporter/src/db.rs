//! Database setup
//!
//! SQLite in WAL mode; the schema is created idempotently at start-up.

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            job_id INTEGER PRIMARY KEY AUTOINCREMENT,
            export_id TEXT NOT NULL UNIQUE,
            job_type TEXT NOT NULL,
            job_user TEXT,
            job_project TEXT,
            job_export_group TEXT,
            job_export_project TEXT,
            job_active BOOLEAN NOT NULL DEFAULT 1,
            job_created_at TEXT NOT NULL,
            job_updated_at TEXT NOT NULL,
            run_frequency_seconds INTEGER NOT NULL CHECK (run_frequency_seconds > 0),
            job_secrets TEXT,
            job_details TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create executions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            execution_id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_execution_id TEXT NOT NULL UNIQUE,
            execution_type TEXT NOT NULL,
            execution_started_at TEXT,
            execution_ended_at TEXT,
            execution_status INTEGER NOT NULL,
            execution_details TEXT NOT NULL,
            job_run_id INTEGER NOT NULL,
            job_id INTEGER NOT NULL REFERENCES jobs(job_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create job run links table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_runs (
            job_run_pk INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL,
            job_run_id INTEGER NOT NULL,
            execution_type TEXT NOT NULL,
            job_run_started_at TEXT NOT NULL,
            job_run_updated_at TEXT NOT NULL,
            associated_execution_id INTEGER NOT NULL,
            last_successful_execution_id INTEGER,
            UNIQUE (job_id, job_run_id, execution_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per job with a cycle in flight
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_run_claims (
            job_id INTEGER PRIMARY KEY,
            job_run_id INTEGER NOT NULL,
            claimed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create metrics table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            metric_id INTEGER PRIMARY KEY AUTOINCREMENT,
            collected_at TEXT NOT NULL,
            platform_api_healthy BOOLEAN NOT NULL,
            platform_registry_healthy BOOLEAN NOT NULL,
            export_registry_healthy BOOLEAN NOT NULL,
            object_store_healthy BOOLEAN NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_executions_job_run ON executions(job_id, job_run_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(execution_status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_executions_started_at ON executions(execution_started_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_collected_at ON metrics(collected_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
