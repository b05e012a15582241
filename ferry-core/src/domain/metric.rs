//! Health metric domain types

use serde::{Deserialize, Serialize};

/// One round of collaborator health checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetric {
    pub id: i64,
    pub collected_at: chrono::DateTime<chrono::Utc>,
    pub platform_api_healthy: bool,
    pub platform_registry_healthy: bool,
    pub export_registry_healthy: bool,
    pub object_store_healthy: bool,
}

impl HealthMetric {
    pub fn overall_healthy(&self) -> bool {
        self.platform_api_healthy
            && self.platform_registry_healthy
            && self.export_registry_healthy
            && self.object_store_healthy
    }
}
