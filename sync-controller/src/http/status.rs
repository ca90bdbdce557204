//! Read-only status listings for operators.

use crate::registry::RoomObject;
use crate::satellite::Satellite;
use crate::service::SyncService;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use sync_types::{Health, Values};

/// One satellite, without its secret.
#[derive(Debug, Clone, Serialize)]
pub struct SatelliteStatus {
    /// Unique name.
    pub name: String,
    /// Last known address.
    pub address: Option<String>,
    /// Seconds since epoch, 0 if never contacted.
    pub last_contact: u64,
    /// `unknown`, `online`, `stale` or `offline`.
    pub liveness: &'static str,
    /// Whether commands are accepted.
    pub online: bool,
    /// Owned object names.
    pub objects: Vec<String>,
    /// Commands waiting for delivery.
    pub queue_depth: usize,
}

impl SatelliteStatus {
    /// Snapshot a satellite's current state.
    pub fn of(satellite: &Satellite) -> Self {
        let liveness = satellite.liveness();
        Self {
            name: satellite.name().to_string(),
            address: satellite.address(),
            last_contact: satellite.last_contact().as_secs(),
            liveness: liveness.as_str(),
            online: liveness.is_online(),
            objects: satellite.object_names(),
            queue_depth: satellite.queue_depth(),
        }
    }
}

/// One registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectStatus {
    /// Registry name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub object_type: String,
    /// Owning satellite, if bound.
    pub owner: Option<String>,
    /// Referenced but not yet reported.
    pub placeholder: bool,
    /// Last reported values.
    pub values: Values,
    /// Last reported health.
    pub health: Health,
}

impl ObjectStatus {
    /// Snapshot a registry entry.
    pub fn of(object: &RoomObject) -> Self {
        Self {
            name: object.name().to_string(),
            object_type: object.object_type(),
            owner: object.owner_name(),
            placeholder: object.is_placeholder(),
            values: object.values(),
            health: object.health(),
        }
    }
}

/// `GET /satellites`
pub async fn satellites_handler(
    Extension(service): Extension<Arc<SyncService>>,
) -> Json<Vec<SatelliteStatus>> {
    Json(
        service
            .satellites()
            .iter()
            .map(|s| SatelliteStatus::of(s))
            .collect(),
    )
}

/// `GET /objects`
pub async fn objects_handler(
    Extension(service): Extension<Arc<SyncService>>,
) -> Json<Vec<ObjectStatus>> {
    Json(
        service
            .registry()
            .snapshot()
            .iter()
            .map(|o| ObjectStatus::of(o))
            .collect(),
    )
}
