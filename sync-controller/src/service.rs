//! Satellite sync service coordination.
//!
//! `SyncService` owns the satellite set, authenticates inbound pushes and
//! routes them to the right [`Satellite`].

use crate::cleanup::spawn_cleanup_task;
use crate::config::Config;
use crate::error::{ControllerError, InboundError, Result};
use crate::limits::RateLimits;
use crate::link::SatelliteLink;
use crate::locks;
use crate::registry::ObjectRegistry;
use crate::satellite::{Satellite, SatelliteContext, SnapshotOutcome};
use crate::storage::{SatelliteRecord, SatelliteStore, SqliteStorage};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use sync_types::{DownlinkBatch, DownlinkPoll, EventPush, UplinkPush};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Operational metrics for monitoring controller activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    /// Uplink pushes accepted.
    pub uplinks_total: AtomicU64,
    /// Event pushes accepted.
    pub events_total: AtomicU64,
    /// Legacy downlink polls accepted.
    pub downlink_polls_total: AtomicU64,
    /// Inbound requests rejected for a bad secret.
    pub auth_failures: AtomicU64,
    /// Inbound requests rejected by a rate limiter.
    pub rate_limit_hits: AtomicU64,
    /// Pulls attempted by poll loops.
    pub pulls_total: AtomicU64,
    /// Pulls that failed.
    pub pull_failures: AtomicU64,
    /// Commands accepted into a queue.
    pub commands_enqueued: AtomicU64,
    /// Commands dropped because a queue was full.
    pub commands_dropped: AtomicU64,
    /// Commands delivered to a node.
    pub commands_sent: AtomicU64,
    /// Commands whose delivery failed.
    pub commands_failed: AtomicU64,
    /// Commands discarded at delivery time (owner offline or no address).
    pub commands_discarded: AtomicU64,
    /// Report entries skipped as malformed or foreign.
    pub snapshot_entries_skipped: AtomicU64,
    /// Events naming an object the sender does not own.
    pub unknown_object_events: AtomicU64,
}

/// The satellite sync service.
pub struct SyncService {
    config: Config,
    storage: Arc<SqliteStorage>,
    registry: Arc<ObjectRegistry>,
    link: Arc<dyn SatelliteLink>,
    metrics: Arc<ControllerMetrics>,
    rate_limits: RateLimits,
    satellites: DashMap<String, Arc<Satellite>>,
    started: AtomicBool,
    cancel: CancellationToken,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("satellites", &self.satellites.len())
            .field("objects", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Load every persisted satellite. Loops are not started yet.
    pub async fn load(
        config: Config,
        storage: SqliteStorage,
        link: Arc<dyn SatelliteLink>,
    ) -> Result<Arc<Self>> {
        Self::load_with_registry(config, storage, link, Arc::new(ObjectRegistry::new())).await
    }

    /// Like [`load`](Self::load), sharing an existing object registry.
    pub async fn load_with_registry(
        config: Config,
        storage: SqliteStorage,
        link: Arc<dyn SatelliteLink>,
        registry: Arc<ObjectRegistry>,
    ) -> Result<Arc<Self>> {
        let rate_limits = RateLimits::new(&config.limits)?;
        let service = Arc::new(Self {
            config,
            storage: Arc::new(storage),
            registry,
            link,
            metrics: Arc::new(ControllerMetrics::default()),
            rate_limits,
            satellites: DashMap::new(),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            cleanup: Mutex::new(None),
        });

        let records = service.storage.load_satellites().await?;
        for record in records {
            let name = record.name.clone();
            let satellite = Satellite::new(record, service.context());
            service.satellites.insert(name, satellite);
        }
        tracing::info!("Loaded {} satellites", service.satellites.len());

        Ok(service)
    }

    fn context(&self) -> SatelliteContext {
        SatelliteContext {
            settings: self.config.satellites.clone(),
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.storage) as Arc<dyn SatelliteStore>,
            link: Arc::clone(&self.link),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Start every satellite's loops and the limiter cleanup task.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        for satellite in self.satellites() {
            satellite.start();
        }

        *locks::lock(&self.cleanup) = Some(spawn_cleanup_task(
            self.rate_limits.clone(),
            self.config.limits.cleanup_interval_secs,
            self.cancel.child_token(),
        ));
        tracing::info!("Sync service started");
    }

    /// Get the controller configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the storage layer.
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// The object registry satellites publish into.
    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    /// A satellite by name.
    pub fn satellite(&self, name: &str) -> Option<Arc<Satellite>> {
        self.satellites.get(name).map(|s| Arc::clone(s.value()))
    }

    /// Snapshot of all satellites, sorted by name.
    pub fn satellites(&self) -> Vec<Arc<Satellite>> {
        let mut all: Vec<_> = self
            .satellites
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Number of registered satellites.
    pub fn satellite_count(&self) -> usize {
        self.satellites.len()
    }

    /// Number of satellites currently online.
    pub fn online_count(&self) -> usize {
        self.satellites.iter().filter(|s| s.is_online()).count()
    }

    /// Find the satellite whose secret equals `auth`.
    pub fn authenticate(&self, auth: &str) -> std::result::Result<Arc<Satellite>, InboundError> {
        let found = self
            .satellites
            .iter()
            .find(|entry| entry.value().secret_matches(auth))
            .map(|entry| Arc::clone(entry.value()));

        found.ok_or_else(|| {
            self.metrics.auth_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Rejected inbound request with unknown secret");
            InboundError::Unauthorized
        })
    }

    /// Authenticate, then rate-limit. Bad secrets never spend limiter quota.
    fn admit(&self, auth: &str) -> std::result::Result<Arc<Satellite>, InboundError> {
        let satellite = self.authenticate(auth)?;

        if let Err(e) = self.rate_limits.check_global() {
            self.metrics.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        if let Err(e) = self.rate_limits.check_push(satellite.name()) {
            self.metrics.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Satellite {} is pushing too fast", satellite.name());
            return Err(e.into());
        }
        Ok(satellite)
    }

    /// Handle `POST /uplink`.
    pub async fn handle_uplink(
        &self,
        payload: &UplinkPush,
    ) -> std::result::Result<SnapshotOutcome, InboundError> {
        let satellite = self.admit(&payload.auth)?;
        self.metrics.uplinks_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Uplink from {} ({} objects)", payload.name, payload.objects.len());

        Ok(satellite.apply_snapshot(payload).await)
    }

    /// Handle `POST /event`.
    ///
    /// Returns whether the event reached an owned object.
    pub async fn handle_event(&self, payload: EventPush) -> std::result::Result<bool, InboundError> {
        let satellite = self.admit(&payload.auth)?;
        self.metrics.events_total.fetch_add(1, Ordering::Relaxed);

        if payload.name != satellite.name() {
            tracing::warn!(
                "Received event from {} but expected {}",
                payload.name,
                satellite.name()
            );
            return Ok(false);
        }

        Ok(satellite
            .apply_event(
                payload.current_ip.as_deref(),
                &payload.object,
                &payload.event,
                payload.args,
                payload.kwargs,
            )
            .await)
    }

    /// Handle the legacy `GET /downlink` poll.
    ///
    /// Commands are pushed by the drain loops, so the batch is always empty.
    pub fn handle_downlink_poll(
        &self,
        payload: &DownlinkPoll,
    ) -> std::result::Result<DownlinkBatch, InboundError> {
        let satellite = self.admit(&payload.auth)?;
        self.metrics
            .downlink_polls_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Legacy downlink poll from {}", satellite.name());
        Ok(DownlinkBatch::default())
    }

    /// Register and persist a new satellite, starting it if the service runs.
    ///
    /// The name is claimed in memory before the row is written, and the claim
    /// is released again if the write fails or the row already exists.
    pub async fn add_satellite(&self, record: SatelliteRecord) -> Result<Arc<Satellite>> {
        let name = record.name.clone();
        let satellite = Satellite::new(record.clone(), self.context());
        match self.satellites.entry(name.clone()) {
            Entry::Occupied(_) => return Err(ControllerError::DuplicateSatellite { name }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&satellite));
            }
        }

        let inserted = match self.storage.insert_satellite(&record).await {
            Ok(inserted) => inserted,
            Err(e) => {
                self.release_claim(&satellite);
                return Err(e.into());
            }
        };
        if !inserted {
            self.release_claim(&satellite);
            return Err(ControllerError::DuplicateSatellite { name });
        }

        if self.started.load(Ordering::SeqCst) {
            satellite.start();
        }
        tracing::info!("Added satellite {}", name);
        Ok(satellite)
    }

    fn release_claim(&self, satellite: &Arc<Satellite>) {
        self.satellites
            .remove_if(satellite.name(), |_, claimed| Arc::ptr_eq(claimed, satellite));
    }

    /// Stop a satellite's loops, then forget and delete it.
    ///
    /// Its objects stay in the registry; their proxies report the owner gone.
    pub async fn remove_satellite(&self, name: &str) -> Result<()> {
        let satellite = self
            .satellite(name)
            .ok_or_else(|| ControllerError::UnknownSatellite {
                name: name.to_string(),
            })?;

        satellite.shutdown().await;
        self.satellites.remove(name);
        self.storage.remove_satellite(name).await?;

        tracing::info!("Removed satellite {}", name);
        Ok(())
    }

    /// Stop every satellite and background task.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let cleanup = locks::lock(&self.cleanup).take();
        if let Some(handle) = cleanup {
            if let Err(e) = handle.await {
                tracing::error!("Cleanup task ended abnormally: {}", e);
            }
        }

        for satellite in self.satellites() {
            satellite.shutdown().await;
        }
        tracing::info!("Sync service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MockLink;
    use crate::testing::report;
    use serde_json::json;
    use sync_types::Values;

    async fn test_service(records: &[(&str, &str)]) -> (Arc<SyncService>, MockLink) {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for (name, secret) in records {
            storage
                .upsert_satellite(&SatelliteRecord::new(*name, *secret, None))
                .await
                .unwrap();
        }
        let link = MockLink::new();
        let service = SyncService::load(Config::default(), storage, Arc::new(link.clone()))
            .await
            .unwrap();
        (service, link)
    }

    #[tokio::test]
    async fn load_restores_persisted_satellites() {
        let (service, _) = test_service(&[("kitchen", "a"), ("porch", "b")]).await;
        assert_eq!(service.satellite_count(), 2);
        let names: Vec<_> = service
            .satellites()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["kitchen", "porch"]);
        assert_eq!(service.online_count(), 0);
    }

    #[tokio::test]
    async fn authenticate_matches_secret_across_all_satellites() {
        let (service, _) = test_service(&[("kitchen", "a"), ("porch", "b")]).await;

        assert_eq!(service.authenticate("b").unwrap().name(), "porch");
        assert_eq!(
            service.authenticate("nope").unwrap_err(),
            InboundError::Unauthorized
        );
        assert_eq!(service.metrics().auth_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn wrong_auth_uplink_changes_nothing() {
        let (service, _) = test_service(&[("kitchen", "s3cret")]).await;

        let mut payload = report(
            "kitchen",
            json!({"light1": {"type": "toggle", "data": {"on": true}}}),
        );
        payload.auth = "wrong".into();

        let err = service.handle_uplink(&payload).await.unwrap_err();
        assert_eq!(err, InboundError::Unauthorized);
        assert!(service.registry().is_empty());
        assert!(!service.satellite("kitchen").unwrap().is_online());
    }

    #[tokio::test]
    async fn uplink_applies_and_persists_contact() {
        let (service, _) = test_service(&[("kitchen", "s3cret")]).await;

        let mut payload = report(
            "kitchen",
            json!({"light1": {"type": "toggle", "data": {"on": true}}}),
        );
        payload.auth = "s3cret".into();
        payload.current_ip = Some("192.168.1.20".into());

        let outcome = service.handle_uplink(&payload).await.unwrap();
        assert_eq!(outcome, SnapshotOutcome::Applied { applied: 1, skipped: 0 });
        assert_eq!(service.online_count(), 1);

        let row = service.storage().get_satellite("kitchen").await.unwrap().unwrap();
        assert_eq!(row.address.as_deref(), Some("192.168.1.20"));
        assert!(!row.last_contact.is_never());
    }

    #[tokio::test]
    async fn event_with_mismatched_name_is_ignored() {
        let (service, _) = test_service(&[("kitchen", "s3cret")]).await;

        let applied = service
            .handle_event(EventPush {
                name: "porch".into(),
                current_ip: None,
                object: "pir".into(),
                event: "motion".into(),
                args: vec![],
                kwargs: Values::new(),
                auth: "s3cret".into(),
            })
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(service.metrics().unknown_object_events.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn downlink_poll_is_always_empty() {
        let (service, _) = test_service(&[("kitchen", "s3cret")]).await;

        let batch = service
            .handle_downlink_poll(&DownlinkPoll {
                name: "kitchen".into(),
                auth: "s3cret".into(),
            })
            .unwrap();
        assert!(batch.commands.is_empty());

        let err = service
            .handle_downlink_poll(&DownlinkPoll {
                name: "kitchen".into(),
                auth: String::new(),
            })
            .unwrap_err();
        assert_eq!(err, InboundError::Unauthorized);
    }

    #[tokio::test]
    async fn push_rate_limit_applies_per_satellite() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .upsert_satellite(&SatelliteRecord::new("kitchen", "s3cret", None))
            .await
            .unwrap();
        let mut config = Config::default();
        config.limits.pushes_per_minute = 1;
        let service = SyncService::load(config, storage, Arc::new(MockLink::new()))
            .await
            .unwrap();

        let mut payload = report("kitchen", json!({}));
        payload.auth = "s3cret".into();

        assert!(service.handle_uplink(&payload).await.is_ok());
        assert!(matches!(
            service.handle_uplink(&payload).await,
            Err(InboundError::RateLimited(_))
        ));
        assert_eq!(service.metrics().rate_limit_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn add_satellite_rejects_duplicates_and_persists() {
        let (service, _) = test_service(&[("kitchen", "a")]).await;

        let err = service
            .add_satellite(SatelliteRecord::new("kitchen", "b", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::DuplicateSatellite { .. }));

        service
            .add_satellite(SatelliteRecord::new("porch", "b", Some("10.0.0.9".into())))
            .await
            .unwrap();
        assert_eq!(service.satellite_count(), 2);
        assert_eq!(service.storage().count_satellites().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_adds_agree_on_one_secret() {
        for _ in 0..20 {
            let (service, _) = test_service(&[]).await;

            let (first, second) = tokio::join!(
                service.add_satellite(SatelliteRecord::new("porch", "aaa", None)),
                service.add_satellite(SatelliteRecord::new("porch", "bbb", None)),
            );
            assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);

            let stored = service.storage().get_satellite("porch").await.unwrap().unwrap();
            let porch = service.satellite("porch").unwrap();
            assert!(porch.secret_matches(&stored.secret));
            assert_eq!(service.satellite_count(), 1);
        }
    }

    #[tokio::test]
    async fn add_satellite_releases_name_when_row_exists() {
        let (service, _) = test_service(&[]).await;
        service
            .storage()
            .upsert_satellite(&SatelliteRecord::new("porch", "stored", None))
            .await
            .unwrap();

        let err = service
            .add_satellite(SatelliteRecord::new("porch", "other", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::DuplicateSatellite { .. }));
        assert!(service.satellite("porch").is_none());

        let row = service.storage().get_satellite("porch").await.unwrap().unwrap();
        assert_eq!(row.secret, "stored");
    }

    #[tokio::test]
    async fn bad_secrets_do_not_spend_the_global_quota() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .upsert_satellite(&SatelliteRecord::new("kitchen", "s3cret", None))
            .await
            .unwrap();
        let mut config = Config::default();
        config.limits.global_requests_per_second = 1;
        let service = SyncService::load(config, storage, Arc::new(MockLink::new()))
            .await
            .unwrap();

        let mut payload = report("kitchen", json!({}));
        payload.auth = "attacker".into();
        for _ in 0..5 {
            assert_eq!(
                service.handle_uplink(&payload).await.unwrap_err(),
                InboundError::Unauthorized
            );
        }

        payload.auth = "s3cret".into();
        assert!(service.handle_uplink(&payload).await.is_ok());
        assert!(service.satellite("kitchen").unwrap().is_online());
        assert_eq!(service.metrics().rate_limit_hits.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn event_for_foreign_object_keeps_address() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .upsert_satellite(&SatelliteRecord::new(
                "kitchen",
                "s3cret",
                Some("10.0.0.5".into()),
            ))
            .await
            .unwrap();
        let service = SyncService::load(Config::default(), storage, Arc::new(MockLink::new()))
            .await
            .unwrap();

        let applied = service
            .handle_event(EventPush {
                name: "kitchen".into(),
                current_ip: Some("6.6.6.6".into()),
                object: "ghost".into(),
                event: "motion".into(),
                args: vec![],
                kwargs: Values::new(),
                auth: "s3cret".into(),
            })
            .await
            .unwrap();

        assert!(!applied);
        let kitchen = service.satellite("kitchen").unwrap();
        assert_eq!(kitchen.address().as_deref(), Some("10.0.0.5"));
        let row = service.storage().get_satellite("kitchen").await.unwrap().unwrap();
        assert_eq!(row.address.as_deref(), Some("10.0.0.5"));
    }

    #[tokio::test]
    async fn remove_satellite_tears_down_before_forgetting() {
        let (service, _) = test_service(&[("kitchen", "s3cret")]).await;
        service.start();

        let kitchen = service.satellite("kitchen").unwrap();
        let proxy = kitchen.reconcile_object("light1", "toggle");
        drop(kitchen);

        service.remove_satellite("kitchen").await.unwrap();
        assert!(service.satellite("kitchen").is_none());
        assert_eq!(service.storage().count_satellites().await.unwrap(), 0);
        assert!(proxy.owner().is_none());
        assert!(service.registry().get("light1").is_some());

        let err = service.remove_satellite("kitchen").await.unwrap_err();
        assert!(matches!(err, ControllerError::UnknownSatellite { .. }));

        service.shutdown().await;
    }
}
