//! One remote satellite node as seen by the controller.
//!
//! A [`Satellite`] owns the objects it reported, a bounded outbound command
//! queue and three background loops:
//!
//! - **drain**: delivers queued commands, one at a time, at most once
//! - **poll**: pulls the node's report when it has been quiet too long
//! - **heartbeat**: tells local subscribers the owner is still reachable
//!
//! All loops stop on the satellite's cancellation token.

use crate::config::SatelliteConfig;
use crate::error::CommandError;
use crate::link::SatelliteLink;
use crate::locks;
use crate::proxy::{CommandReceipt, SatelliteProxy};
use crate::registry::{EventOrigin, ObjectEvent, ObjectRegistry, RoomObject, HEARTBEAT_EVENT};
use crate::service::ControllerMetrics;
use crate::storage::{SatelliteRecord, SatelliteStore};
use crate::tasks::{spawn_satellite_tasks, SatelliteTasks};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use sync_core::{declared_type_for, BindingAction, Liveness, LivenessPolicy, LivenessTracker};
use sync_types::{Command, CommandKind, DownlinkDelivery, Timestamp, UplinkPush, Values};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by every satellite.
#[derive(Clone)]
pub struct SatelliteContext {
    /// Timing and queue settings.
    pub settings: SatelliteConfig,
    /// Process-wide object registry.
    pub registry: Arc<ObjectRegistry>,
    /// Persisted satellite rows.
    pub store: Arc<dyn SatelliteStore>,
    /// Outbound link to the nodes.
    pub link: Arc<dyn SatelliteLink>,
    /// Shared counters.
    pub metrics: Arc<ControllerMetrics>,
}

/// Result of applying an uplink report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The report was applied.
    Applied {
        /// Entries merged into the registry.
        applied: usize,
        /// Malformed or foreign entries that were skipped.
        skipped: usize,
    },
    /// The report names a different satellite and was ignored.
    WrongSatellite {
        /// Name carried by the report.
        claimed: String,
    },
}

/// Result of one poll check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Heard from recently; no pull needed.
    Fresh,
    /// A pull was due but no address is known.
    NoAddress,
    /// The pull failed; nothing changed.
    Failed,
    /// The pull succeeded and the report was applied.
    Pulled(SnapshotOutcome),
}

/// A remote satellite node.
pub struct Satellite {
    name: String,
    secret: String,
    address: RwLock<Option<String>>,
    last_contact: AtomicU64,
    objects: RwLock<Vec<Arc<RoomObject>>>,
    queue: mpsc::Sender<Command>,
    pending: tokio::sync::Mutex<mpsc::Receiver<Command>>,
    policy: LivenessPolicy,
    ctx: SatelliteContext,
    cancel: CancellationToken,
    tasks: Mutex<Option<SatelliteTasks>>,
}

impl fmt::Debug for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Satellite")
            .field("name", &self.name)
            .field("address", &self.address())
            .field("last_contact", &self.last_contact())
            .field("objects", &self.object_names())
            .finish_non_exhaustive()
    }
}

impl Satellite {
    /// Build a satellite from its persisted row. Loops are not started.
    pub fn new(record: SatelliteRecord, ctx: SatelliteContext) -> Arc<Self> {
        let (queue, pending) = mpsc::channel(ctx.settings.queue_capacity.max(1));
        Arc::new(Self {
            name: record.name,
            secret: record.secret,
            address: RwLock::new(record.address.filter(|a| !a.is_empty())),
            last_contact: AtomicU64::new(record.last_contact.as_secs()),
            objects: RwLock::new(Vec::new()),
            queue,
            pending: tokio::sync::Mutex::new(pending),
            policy: ctx.settings.liveness_policy(),
            ctx,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(None),
        })
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `auth` is this satellite's secret. An empty secret never matches.
    pub fn secret_matches(&self, auth: &str) -> bool {
        !self.secret.is_empty() && self.secret == auth
    }

    /// Last known address.
    pub fn address(&self) -> Option<String> {
        locks::read(&self.address).clone()
    }

    /// Last successful contact (`never` if none).
    pub fn last_contact(&self) -> Timestamp {
        Timestamp::new(self.last_contact.load(Ordering::Acquire))
    }

    /// Liveness at a given time.
    pub fn liveness_at(&self, now: Timestamp) -> Liveness {
        self.policy.classify(self.last_contact(), now)
    }

    /// Liveness right now.
    pub fn liveness(&self) -> Liveness {
        self.liveness_at(Timestamp::now())
    }

    /// `last_contact != 0 AND now - last_contact < offline_after`.
    pub fn is_online(&self) -> bool {
        self.liveness().is_online()
    }

    /// Objects this satellite owns, in the order they were first reported.
    pub fn objects(&self) -> Vec<Arc<RoomObject>> {
        locks::read(&self.objects).clone()
    }

    /// Names of owned objects.
    pub fn object_names(&self) -> Vec<String> {
        locks::read(&self.objects)
            .iter()
            .map(|o| o.name().to_string())
            .collect()
    }

    /// An owned object by name.
    pub fn owned_object(&self, name: &str) -> Option<Arc<RoomObject>> {
        locks::read(&self.objects)
            .iter()
            .find(|o| o.name() == name)
            .cloned()
    }

    /// Commands waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Queue bound.
    pub fn queue_capacity(&self) -> usize {
        self.queue.max_capacity()
    }

    /// Whether teardown has begun.
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Bind `name` to this satellite, creating or upgrading the registry entry.
    ///
    /// Repeated identical calls return the same entry and record ownership
    /// once. A name owned by another satellite is returned untouched.
    pub fn reconcile_object(self: &Arc<Self>, name: &str, reported_type: &str) -> SatelliteProxy {
        let declared = declared_type_for(reported_type);
        let (object, actions) = self.ctx.registry.claim(name, self, &declared);

        for action in actions {
            match action {
                BindingAction::CreateProxy => {
                    tracing::info!("Satellite {} registered {} ({})", self.name, name, declared);
                }
                BindingAction::UpgradePlaceholder => {
                    tracing::info!(
                        "Satellite {} claimed placeholder {} as {}",
                        self.name,
                        name,
                        declared
                    );
                }
                BindingAction::RecordOwnership => self.record_ownership(&object),
                BindingAction::WarnTypeMismatch { existing, claimed } => {
                    tracing::warn!(
                        "Satellite {} reported {} as {}, keeping existing type {}",
                        self.name,
                        name,
                        claimed,
                        existing
                    );
                }
                BindingAction::WarnOwnedElsewhere { owner } => {
                    tracing::warn!(
                        "Satellite {} reported {} which is owned by {}",
                        self.name,
                        name,
                        owner
                    );
                }
                BindingAction::CreatePlaceholder => {}
            }
        }

        SatelliteProxy::new(object)
    }

    fn record_ownership(&self, object: &Arc<RoomObject>) {
        let mut objects = locks::write(&self.objects);
        if !objects.iter().any(|o| Arc::ptr_eq(o, object)) {
            objects.push(Arc::clone(object));
        }
    }

    /// Apply a full report from this satellite (pushed or pulled).
    ///
    /// Entries are applied independently: a malformed entry or one owned by
    /// another satellite is skipped and the rest still applies. Afterwards the
    /// contact time and address are updated and persisted.
    pub async fn apply_snapshot(self: &Arc<Self>, payload: &UplinkPush) -> SnapshotOutcome {
        if payload.name != self.name {
            tracing::warn!(
                "Received uplink data from {} but expected {}",
                payload.name,
                self.name
            );
            return SnapshotOutcome::WrongSatellite {
                claimed: payload.name.clone(),
            };
        }

        let mut applied = 0;
        let mut skipped = 0;
        for (name, report) in payload.reports() {
            let report = match report {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!("Skipping object from {}: {}", self.name, e);
                    skipped += 1;
                    continue;
                }
            };

            let proxy = self.reconcile_object(name, &report.object_type);
            if !proxy.is_owned_by(self) {
                skipped += 1;
                continue;
            }
            proxy.object().apply_report(&report);
            applied += 1;
        }

        if skipped > 0 {
            self.ctx
                .metrics
                .snapshot_entries_skipped
                .fetch_add(skipped as u64, Ordering::Relaxed);
        }

        self.observe_address(payload.current_ip.as_deref());
        self.record_contact().await;

        tracing::debug!(
            "Applied report from {} ({} objects, {} skipped)",
            self.name,
            applied,
            skipped
        );
        SnapshotOutcome::Applied { applied, skipped }
    }

    /// Deliver a remote event to the local subscribers of an owned object.
    ///
    /// Returns `false` (and changes nothing, address included) if this
    /// satellite does not own `object`.
    pub async fn apply_event(
        &self,
        current_ip: Option<&str>,
        object: &str,
        event: &str,
        args: Vec<Value>,
        kwargs: Values,
    ) -> bool {
        let Some(target) = self.owned_object(object) else {
            tracing::warn!(
                "Satellite {} sent {} for unknown object {}",
                self.name,
                event,
                object
            );
            self.ctx
                .metrics
                .unknown_object_events
                .fetch_add(1, Ordering::Relaxed);
            return false;
        };

        self.observe_address(current_ip);
        self.record_contact().await;

        let receivers = target.dispatch(ObjectEvent {
            object: object.to_string(),
            event: event.to_string(),
            args,
            kwargs,
            origin: EventOrigin::Remote,
        });
        tracing::debug!(
            "Event {} on {} from {} reached {} subscribers",
            event,
            object,
            self.name,
            receivers
        );
        true
    }

    /// Remember the address a node reported for itself.
    pub fn observe_address(&self, current_ip: Option<&str>) {
        let Some(ip) = current_ip.map(str::trim).filter(|ip| !ip.is_empty()) else {
            return;
        };

        let mut address = locks::write(&self.address);
        if address.as_deref() != Some(ip) {
            tracing::info!("Satellite {} is now at {}", self.name, ip);
            *address = Some(ip.to_string());
        }
    }

    async fn record_contact(&self) {
        let now = Timestamp::now();
        self.last_contact.store(now.as_secs(), Ordering::Release);

        let address = self.address();
        if let Err(e) = self
            .ctx
            .store
            .record_contact(&self.name, address.as_deref(), now)
            .await
        {
            tracing::error!("Failed to persist contact for {}: {}", self.name, e);
        }
    }

    /// Append a command to the outbound queue without blocking.
    ///
    /// Safe to call from any thread, with or without a runtime. A full queue
    /// drops the new command.
    pub fn enqueue_command(
        &self,
        object: &str,
        kind: CommandKind,
    ) -> Result<CommandReceipt, CommandError> {
        let command = Command::new(object, kind);
        let receipt = CommandReceipt::for_command(&self.name, &command);

        match self.queue.try_send(command) {
            Ok(()) => {
                self.ctx
                    .metrics
                    .commands_enqueued
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Queued {} {} for {} on {}",
                    receipt.id,
                    receipt.event,
                    receipt.object,
                    self.name
                );
                Ok(receipt)
            }
            Err(TrySendError::Full(_)) => {
                self.ctx
                    .metrics
                    .commands_dropped
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Command queue for {} is full, dropping {} for {}",
                    self.name,
                    receipt.event,
                    receipt.object
                );
                Err(CommandError::QueueFull {
                    satellite: self.name.clone(),
                    capacity: self.queue_capacity(),
                })
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(
                    "Command queue for {} is closed, dropping {} for {}",
                    self.name,
                    receipt.event,
                    receipt.object
                );
                Err(CommandError::QueueClosed {
                    satellite: self.name.clone(),
                })
            }
        }
    }

    /// Deliver queued commands until cancelled.
    pub async fn drain_loop(self: Arc<Self>) {
        let mut pending = self.pending.lock().await;
        tracing::debug!("Drain loop started for {}", self.name);

        loop {
            let command = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = pending.recv() => match next {
                    Some(command) => command,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.deliver(command) => {}
            }
        }

        tracing::debug!("Drain loop stopped for {}", self.name);
    }

    async fn deliver(&self, command: Command) {
        let metrics = &self.ctx.metrics;

        if !self.is_online() {
            tracing::warn!(
                "Discarding {} for {}: satellite {} is offline",
                command.event_name(),
                command.object,
                self.name
            );
            metrics.commands_discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(address) = self.address() else {
            tracing::warn!(
                "Discarding {} for {}: no address known for {}",
                command.event_name(),
                command.object,
                self.name
            );
            metrics.commands_discarded.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let delivery = DownlinkDelivery {
            name: self.name.clone(),
            command: command.to_wire(),
            auth: self.secret.clone(),
        };

        match self.ctx.link.send_command(&address, &delivery).await {
            Ok(()) => {
                metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Delivered {} to {} at {}", command.id, self.name, address);
            }
            Err(e) => {
                metrics.commands_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Failed to deliver {} {} to {} at {}: {}",
                    command.id,
                    command.event_name(),
                    self.name,
                    address,
                    e
                );
            }
        }
    }

    /// Pull the node's report if it has been quiet past the pull window.
    pub async fn poll_once(self: &Arc<Self>) -> PollOutcome {
        if !self.policy.needs_pull(self.last_contact(), Timestamp::now()) {
            return PollOutcome::Fresh;
        }
        let Some(address) = self.address() else {
            tracing::debug!("No address for {}, skipping pull", self.name);
            return PollOutcome::NoAddress;
        };

        tracing::info!(
            "Polling satellite {} at {} due to a lack of response",
            self.name,
            address
        );
        self.ctx.metrics.pulls_total.fetch_add(1, Ordering::Relaxed);

        match self.ctx.link.pull_uplink(&address).await {
            Ok(report) => PollOutcome::Pulled(self.apply_snapshot(&report).await),
            Err(e) => {
                self.ctx.metrics.pull_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Pull from {} at {} failed: {}", self.name, address, e);
                PollOutcome::Failed
            }
        }
    }

    /// Check, then sleep, until cancelled.
    pub async fn poll_loop(self: Arc<Self>) {
        let interval = self.ctx.settings.poll_interval();
        let mut tracker = LivenessTracker::new(self.liveness());
        tracing::debug!("Poll loop started for {} (interval: {:?})", self.name, interval);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }

            if let Some(transition) = tracker.observe(self.liveness()) {
                if transition.went_offline() {
                    tracing::warn!(
                        "Satellite {} went offline (last contact {})",
                        self.name,
                        self.last_contact()
                    );
                } else if transition.came_online() {
                    tracing::info!("Satellite {} is online", self.name);
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::debug!("Poll loop stopped for {}", self.name);
    }

    /// Dispatch one heartbeat to every owned object if online.
    ///
    /// Returns the number of objects that got one.
    pub fn heartbeat(&self) -> usize {
        if !self.is_online() {
            return 0;
        }

        let objects = self.objects();
        for object in &objects {
            object.dispatch(ObjectEvent {
                object: object.name().to_string(),
                event: HEARTBEAT_EVENT.to_string(),
                args: Vec::new(),
                kwargs: Values::new(),
                origin: EventOrigin::Heartbeat,
            });
        }
        objects.len()
    }

    /// Emit heartbeats on a fixed interval until cancelled.
    pub async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.ctx.settings.heartbeat_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.heartbeat();
        }
    }

    /// Spawn the drain, poll and heartbeat loops. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = locks::lock(&self.tasks);
        if tasks.is_some() || self.is_stopping() {
            return;
        }
        *tasks = Some(spawn_satellite_tasks(Arc::clone(self)));
    }

    /// Cancel and join all loops, then close the queue.
    ///
    /// Commands still queued are dropped; later enqueues fail with
    /// [`CommandError::QueueClosed`].
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tasks = locks::lock(&self.tasks).take();
        if let Some(tasks) = tasks {
            tasks.join().await;
        }

        let mut pending = self.pending.lock().await;
        pending.close();
        let mut dropped = 0;
        while pending.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!("Dropped {} undelivered commands for {}", dropped, self.name);
        }
        tracing::info!("Satellite {} stopped", self.name);
    }
}
