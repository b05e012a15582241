//! Metric Repository

use chrono::{DateTime, Utc};
use ferry_core::domain::metric::HealthMetric;

use super::{Store, StoreError};

/// Outcome of one round of health checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSample {
    pub platform_api_healthy: bool,
    pub platform_registry_healthy: bool,
    pub export_registry_healthy: bool,
    pub object_store_healthy: bool,
}

pub async fn record(store: &Store, sample: HealthSample) -> Result<HealthMetric, StoreError> {
    let now = Utc::now();
    let id = store
        .run("record health metric", || {
            sqlx::query(
                r#"
                INSERT INTO metrics (collected_at, platform_api_healthy, platform_registry_healthy,
                                     export_registry_healthy, object_store_healthy)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(now)
            .bind(sample.platform_api_healthy)
            .bind(sample.platform_registry_healthy)
            .bind(sample.export_registry_healthy)
            .bind(sample.object_store_healthy)
            .execute(store.pool())
        })
        .await?
        .last_insert_rowid();

    Ok(HealthMetric {
        id,
        collected_at: now,
        platform_api_healthy: sample.platform_api_healthy,
        platform_registry_healthy: sample.platform_registry_healthy,
        export_registry_healthy: sample.export_registry_healthy,
        object_store_healthy: sample.object_store_healthy,
    })
}

/// Most recently collected metric
pub async fn latest(store: &Store) -> Result<Option<HealthMetric>, StoreError> {
    let row = store
        .run("find latest health metric", || {
            sqlx::query_as::<_, MetricRow>(
                r#"
                SELECT metric_id, collected_at, platform_api_healthy, platform_registry_healthy,
                       export_registry_healthy, object_store_healthy
                FROM metrics
                ORDER BY metric_id DESC
                LIMIT 1
                "#,
            )
            .fetch_optional(store.pool())
        })
        .await?;

    Ok(row.map(|r| r.into()))
}

pub async fn delete_before(store: &Store, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
    let result = store
        .run("prune health metrics", || {
            sqlx::query("DELETE FROM metrics WHERE collected_at < ?")
                .bind(cutoff)
                .execute(store.pool())
        })
        .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Internal Row Type
// ============================================================================

#[derive(sqlx::FromRow)]
struct MetricRow {
    metric_id: i64,
    collected_at: DateTime<Utc>,
    platform_api_healthy: bool,
    platform_registry_healthy: bool,
    export_registry_healthy: bool,
    object_store_healthy: bool,
}

impl From<MetricRow> for HealthMetric {
    fn from(row: MetricRow) -> Self {
        HealthMetric {
            id: row.metric_id,
            collected_at: row.collected_at,
            platform_api_healthy: row.platform_api_healthy,
            platform_registry_healthy: row.platform_registry_healthy,
            export_registry_healthy: row.export_registry_healthy,
            object_store_healthy: row.object_store_healthy,
        }
    }
}
