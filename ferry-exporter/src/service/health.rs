//! Collaborator health checks
//!
//! Each probe runs under the configured timeout; a probe that times out
//! counts as unhealthy. The four probes run concurrently and one metric row
//! records the outcome.

use ferry_core::domain::HealthMetric;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::integrations::Collaborators;
use crate::repository::metric::HealthSample;
use crate::repository::{self, Store, StoreError};

/// Probe every collaborator and persist the sample
pub async fn collect(
    store: &Store,
    config: &Config,
    collaborators: &Collaborators,
) -> Result<HealthMetric, StoreError> {
    let sample = sample(config.healthcheck_timeout, collaborators).await;
    let metric = repository::metric::record(store, sample).await?;

    if metric.overall_healthy() {
        info!("Health check {} passed", metric.id);
    } else {
        warn!("Health check {} found unhealthy collaborators: {:?}", metric.id, sample);
    }

    Ok(metric)
}

pub async fn sample(timeout: Duration, collaborators: &Collaborators) -> HealthSample {
    let (platform_api_healthy, platform_registry_healthy, export_registry_healthy, object_store_healthy) = tokio::join!(
        probe("platform API", timeout, collaborators.platform.healthy()),
        probe(
            "platform registry",
            timeout,
            collaborators.registry.platform_registry_healthy()
        ),
        probe(
            "export registry",
            timeout,
            collaborators.registry.export_registry_healthy()
        ),
        probe("object store", timeout, collaborators.storage.healthy()),
    );

    HealthSample {
        platform_api_healthy,
        platform_registry_healthy,
        export_registry_healthy,
        object_store_healthy,
    }
}

async fn probe<F>(name: &str, timeout: Duration, check: F) -> bool
where
    F: Future<Output = bool>,
{
    match tokio::time::timeout(timeout, check).await {
        Ok(healthy) => healthy,
        Err(_) => {
            warn!("Health check of {} timed out after {:?}", name, timeout);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn test_collect_records_each_collaborator() {
        let harness = Harness::with_config(|config| {
            config.healthcheck_timeout = Duration::from_millis(100);
        })
        .await;
        harness.platform.set_healthy(false);
        harness.registry.set_export_registry_delay(Duration::from_secs(5));

        let services = &harness.services;
        let metric = collect(&services.store, &services.config, &services.collaborators)
            .await
            .unwrap();

        assert!(!metric.platform_api_healthy);
        assert!(metric.platform_registry_healthy);
        assert!(!metric.export_registry_healthy);
        assert!(metric.object_store_healthy);
        assert!(!metric.overall_healthy());

        let latest = repository::metric::latest(&services.store).await.unwrap().unwrap();
        assert_eq!(latest.id, metric.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_is_unhealthy() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        };
        assert!(!probe("slow", Duration::from_secs(1), slow).await);
        assert!(probe("fast", Duration::from_secs(1), async { true }).await);
    }
}
