//! Shared fixtures for unit tests.

use crate::config::SatelliteConfig;
use crate::link::MockLink;
use crate::registry::ObjectRegistry;
use crate::satellite::{Satellite, SatelliteContext};
use crate::service::ControllerMetrics;
use crate::storage::{SatelliteRecord, SatelliteStore, SqliteStorage};
use serde_json::Value;
use std::sync::Arc;
use sync_types::{Timestamp, UplinkPush};

/// Address given to every fixture satellite.
pub(crate) const TEST_ADDRESS: &str = "10.0.0.5";

/// A registry, in-memory store and mock link wired together.
pub(crate) struct TestBed {
    pub registry: Arc<ObjectRegistry>,
    pub storage: Arc<SqliteStorage>,
    pub link: MockLink,
    pub metrics: Arc<ControllerMetrics>,
    pub settings: SatelliteConfig,
}

impl TestBed {
    pub async fn new() -> Self {
        Self {
            registry: Arc::new(ObjectRegistry::new()),
            storage: Arc::new(SqliteStorage::in_memory().await.unwrap()),
            link: MockLink::new(),
            metrics: Arc::new(ControllerMetrics::default()),
            settings: SatelliteConfig::default(),
        }
    }

    pub fn context(&self) -> SatelliteContext {
        SatelliteContext {
            settings: self.settings.clone(),
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.storage) as Arc<dyn SatelliteStore>,
            link: Arc::new(self.link.clone()),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// A satellite that is not persisted and was never contacted.
    pub fn satellite(&self, name: &str, secret: &str) -> Arc<Satellite> {
        Satellite::new(
            SatelliteRecord::new(name, secret, Some(TEST_ADDRESS.to_string())),
            self.context(),
        )
    }

    /// A persisted satellite last heard from at `last_contact`.
    pub async fn persisted_satellite(
        &self,
        name: &str,
        secret: &str,
        last_contact: Timestamp,
    ) -> Arc<Satellite> {
        let record = SatelliteRecord {
            last_contact,
            ..SatelliteRecord::new(name, secret, Some(TEST_ADDRESS.to_string()))
        };
        self.storage.upsert_satellite(&record).await.unwrap();
        Satellite::new(record, self.context())
    }

    /// A persisted satellite heard from just now.
    pub async fn online_satellite(&self, name: &str, secret: &str) -> Arc<Satellite> {
        self.persisted_satellite(name, secret, Timestamp::now()).await
    }

    pub async fn storage_row(&self, name: &str) -> SatelliteRecord {
        self.storage.get_satellite(name).await.unwrap().unwrap()
    }
}

/// An uplink body from `name` carrying `objects` (a JSON object), no auth.
pub(crate) fn report(name: &str, objects: Value) -> UplinkPush {
    let objects = match objects {
        Value::Object(map) => map.into_iter().collect(),
        other => panic!("objects must be a JSON object, got {other}"),
    };
    UplinkPush {
        name: name.to_string(),
        current_ip: None,
        objects,
        auth: String::new(),
    }
}
