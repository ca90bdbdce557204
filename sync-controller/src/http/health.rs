//! Health check endpoint.
//!
//! The controller itself is healthy whenever it answers. `status` turns
//! `degraded` while any registered satellite is offline, so a dashboard can
//! tell a dead node from a dead controller.

use crate::service::SyncService;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// `ok`, or `degraded` while any satellite is offline.
    pub status: &'static str,
    /// Controller version.
    pub version: String,
    /// Registered satellites.
    pub satellites: usize,
    /// Satellites whose last contact is recent enough to accept commands.
    pub satellites_online: usize,
    /// Names of satellites that are offline or were never heard from.
    pub offline: Vec<String>,
    /// Registry entries, placeholders included.
    pub objects: usize,
    /// Commands waiting across all satellite queues.
    pub queued_commands: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// Summarize the service right now.
    pub fn collect(service: &SyncService) -> Self {
        let satellites = service.satellites();
        let offline: Vec<String> = satellites
            .iter()
            .filter(|s| !s.is_online())
            .map(|s| s.name().to_string())
            .collect();

        Self {
            status: if offline.is_empty() { "ok" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION").to_string(),
            satellites: satellites.len(),
            satellites_online: satellites.len() - offline.len(),
            offline,
            objects: service.registry().len(),
            queued_commands: satellites.iter().map(|s| s.queue_depth()).sum(),
            uptime_seconds: START_TIME
                .get()
                .map(|start| start.elapsed().as_secs())
                .unwrap_or(0),
        }
    }
}

/// Health check handler.
pub async fn health_handler(
    Extension(service): Extension<Arc<SyncService>>,
) -> Json<HealthStatus> {
    Json(HealthStatus::collect(&service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::link::MockLink;
    use crate::storage::{SatelliteRecord, SatelliteStore, SqliteStorage};
    use serde_json::json;
    use sync_types::Timestamp;

    async fn service(records: Vec<SatelliteRecord>) -> Arc<SyncService> {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for record in &records {
            storage.upsert_satellite(record).await.unwrap();
        }
        SyncService::load(Config::default(), storage, Arc::new(MockLink::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn no_satellites_is_ok() {
        let status = HealthStatus::collect(&*service(vec![]).await);
        assert_eq!(status.status, "ok");
        assert_eq!(status.satellites, 0);
        assert!(status.offline.is_empty());
    }

    #[tokio::test]
    async fn quiet_satellite_degrades_health() {
        let heard = SatelliteRecord {
            last_contact: Timestamp::now(),
            ..SatelliteRecord::new("kitchen", "a", None)
        };
        let silent = SatelliteRecord::new("porch", "b", None);
        let service = service(vec![heard, silent]).await;

        let kitchen = service.satellite("kitchen").unwrap();
        kitchen.reconcile_object("light1", "toggle");
        kitchen
            .reconcile_object("fan", "toggle")
            .set_value("on", json!(true))
            .unwrap();

        let status = HealthStatus::collect(&service);
        assert_eq!(status.status, "degraded");
        assert_eq!(status.satellites, 2);
        assert_eq!(status.satellites_online, 1);
        assert_eq!(status.offline, vec!["porch"]);
        assert_eq!(status.objects, 2);
        assert_eq!(status.queued_commands, 1);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["offline"], json!(["porch"]));
    }
}
