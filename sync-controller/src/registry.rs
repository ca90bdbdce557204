//! Process-wide object registry.
//!
//! Every named device the automation layer can see lives here as a
//! [`RoomObject`]. An entry is created either by a local reference (it starts
//! as a placeholder) or by a satellite claiming the name (it starts bound).
//! Entries are never replaced: a placeholder is upgraded in place, so handles
//! and event subscriptions taken before the upgrade keep working.

use crate::error::CommandError;
use crate::locks;
use crate::proxy::{CommandReceipt, SatelliteProxy};
use crate::satellite::Satellite;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use sync_core::{Binding, BindingAction, BindingEvent, SATELLITE_TYPE_PREFIX};
use sync_types::{CommandKind, Health, ObjectReport, Timestamp, Values};
use tokio::sync::broadcast;

/// Buffered events per object before slow subscribers start lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Event dispatched when inbound data changed an object's values or health.
pub const UPDATE_EVENT: &str = "update";

/// Synthetic liveness event dispatched while the owner is online.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Emitted by local automation. Forwarded to the owning satellite.
    Local,
    /// Reported by the owning satellite. Never forwarded back.
    Remote,
    /// Generated by the controller's heartbeat task. Never forwarded.
    Heartbeat,
}

/// An event delivered to local subscribers of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEvent {
    /// Object the event belongs to.
    pub object: String,
    /// Event name.
    pub event: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Values,
    /// Where the event came from.
    pub origin: EventOrigin,
}

#[derive(Debug)]
struct ObjectState {
    binding: Binding,
    values: Values,
    health: Health,
    owner: Weak<Satellite>,
    updated_at: Timestamp,
}

/// A named device in the registry.
pub struct RoomObject {
    name: String,
    state: RwLock<ObjectState>,
    events: broadcast::Sender<ObjectEvent>,
}

impl fmt::Debug for RoomObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomObject")
            .field("name", &self.name)
            .field("binding", &locks::read(&self.state).binding)
            .finish_non_exhaustive()
    }
}

impl RoomObject {
    fn new(name: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: name.to_string(),
            state: RwLock::new(ObjectState {
                binding: Binding::Unregistered,
                values: Values::new(),
                health: Health::default(),
                owner: Weak::new(),
                updated_at: Timestamp::never(),
            }),
            events,
        }
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current binding.
    pub fn binding(&self) -> Binding {
        locks::read(&self.state).binding.clone()
    }

    /// Type tag (`satellite_<type>` when bound, `promise` for a placeholder).
    pub fn object_type(&self) -> String {
        locks::read(&self.state).binding.type_tag().to_string()
    }

    /// Whether no satellite has claimed this name yet.
    pub fn is_placeholder(&self) -> bool {
        locks::read(&self.state).binding.is_placeholder()
    }

    /// Name of the owning satellite, if bound.
    pub fn owner_name(&self) -> Option<String> {
        locks::read(&self.state).binding.owner().map(str::to_string)
    }

    /// The owning satellite, if bound and still alive.
    pub fn owner(&self) -> Option<Arc<Satellite>> {
        locks::read(&self.state).owner.upgrade()
    }

    /// Last values reported by the satellite.
    pub fn values(&self) -> Values {
        locks::read(&self.state).values.clone()
    }

    /// A single reported value.
    pub fn value(&self, key: &str) -> Option<Value> {
        locks::read(&self.state).values.get(key).cloned()
    }

    /// Last health reported by the satellite.
    pub fn health(&self) -> Health {
        locks::read(&self.state).health.clone()
    }

    /// When inbound data last touched this object.
    pub fn updated_at(&self) -> Timestamp {
        locks::read(&self.state).updated_at
    }

    /// Receive every event dispatched on this object from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectEvent> {
        self.events.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Emit a local event.
    ///
    /// Local subscribers always see it. On a bound object the event is also
    /// forwarded to the owning satellite; the receipt is returned in that
    /// case.
    pub fn emit(
        self: &Arc<Self>,
        event: &str,
        args: Vec<Value>,
        kwargs: Values,
    ) -> Result<Option<CommandReceipt>, CommandError> {
        self.dispatch(ObjectEvent {
            object: self.name.clone(),
            event: event.to_string(),
            args: args.clone(),
            kwargs: kwargs.clone(),
            origin: EventOrigin::Local,
        });

        match SatelliteProxy::from_object(Arc::clone(self)) {
            Some(proxy) => proxy
                .send(CommandKind::Event {
                    name: event.to_string(),
                    args,
                    kwargs,
                })
                .map(Some),
            None => Ok(None),
        }
    }

    /// Deliver an event to local subscribers. Returns how many received it.
    pub(crate) fn dispatch(&self, event: ObjectEvent) -> usize {
        // No subscribers is not an error.
        self.events.send(event).unwrap_or(0)
    }

    /// Merge an inbound report into values and health.
    ///
    /// Returns `true` if anything changed, in which case an
    /// [`UPDATE_EVENT`] carrying the changed keys was dispatched.
    pub(crate) fn apply_report(&self, report: &ObjectReport) -> bool {
        let mut changed = Values::new();
        let health_changed;
        {
            let mut state = locks::write(&self.state);
            for (key, value) in &report.data {
                if state.values.get(key) != Some(value) {
                    state.values.insert(key.clone(), value.clone());
                    changed.insert(key.clone(), value.clone());
                }
            }
            health_changed = match &report.health {
                Some(health) if *health != state.health => {
                    state.health = health.clone();
                    true
                }
                _ => false,
            };
            state.updated_at = Timestamp::now();
        }

        if changed.is_empty() && !health_changed {
            return false;
        }
        self.dispatch(ObjectEvent {
            object: self.name.clone(),
            event: UPDATE_EVENT.to_string(),
            args: Vec::new(),
            kwargs: changed,
            origin: EventOrigin::Remote,
        });
        true
    }

    fn transition(&self, event: BindingEvent, owner: Option<&Arc<Satellite>>) -> Vec<BindingAction> {
        let mut state = locks::write(&self.state);
        let current = std::mem::take(&mut state.binding);
        let (next, mut actions) = current.on_event(event);
        state.binding = next;

        // A satellite re-registered under the same name takes over the
        // entries its previous incarnation owned.
        if let Some(owner) = owner {
            let claimed_by_owner = state.binding.owner() == Some(owner.name());
            let stale = state
                .owner
                .upgrade()
                .map_or(true, |current| !Arc::ptr_eq(&current, owner));
            if claimed_by_owner && stale {
                state.owner = Arc::downgrade(owner);
                if !actions.contains(&BindingAction::RecordOwnership) {
                    actions.push(BindingAction::RecordOwnership);
                }
            }
        }
        actions
    }
}

/// Concurrent name → object map shared by every satellite and local caller.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: DashMap<String, Arc<RoomObject>>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an object without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<RoomObject>> {
        self.objects.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up an object, creating a placeholder if nobody has claimed it.
    pub fn get_or_placeholder(&self, name: &str) -> Arc<RoomObject> {
        let (object, actions) = self.apply(name, BindingEvent::Referenced, None);
        if actions.contains(&BindingAction::CreatePlaceholder) {
            tracing::debug!("Created placeholder for {}", name);
        }
        object
    }

    /// Subscribe to an object's events, creating a placeholder if needed.
    pub fn subscribe(&self, name: &str) -> broadcast::Receiver<ObjectEvent> {
        self.get_or_placeholder(name).subscribe()
    }

    /// Proxy view of a satellite-bound object.
    pub fn proxy(&self, name: &str) -> Option<SatelliteProxy> {
        self.get(name).and_then(SatelliteProxy::from_object)
    }

    /// Objects whose type is `object_type` or `satellite_<object_type>`.
    pub fn objects_of_type(&self, object_type: &str) -> Vec<Arc<RoomObject>> {
        let prefixed = format!("{SATELLITE_TYPE_PREFIX}{object_type}");
        let mut matches: Vec<_> = self
            .objects
            .iter()
            .filter(|entry| {
                let tag = entry.value().object_type();
                tag == object_type || tag == prefixed
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches
    }

    /// All objects, ordered by name.
    pub fn snapshot(&self) -> Vec<Arc<RoomObject>> {
        let mut all: Vec<_> = self
            .objects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Number of entries (placeholders included).
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Run a satellite claim through the binding machine.
    ///
    /// The object-level effects (entry creation, placeholder upgrade, owner
    /// pointer) are applied here; the remaining actions are returned for the
    /// claiming satellite to carry out.
    pub(crate) fn claim(
        &self,
        name: &str,
        owner: &Arc<Satellite>,
        declared_type: &str,
    ) -> (Arc<RoomObject>, Vec<BindingAction>) {
        let event = BindingEvent::Claimed {
            satellite: owner.name().to_string(),
            declared_type: declared_type.to_string(),
        };
        self.apply(name, event, Some(owner))
    }

    fn apply(
        &self,
        name: &str,
        event: BindingEvent,
        owner: Option<&Arc<Satellite>>,
    ) -> (Arc<RoomObject>, Vec<BindingAction>) {
        // The shard lock is held for the whole transition, so two claims on a
        // new name cannot both create it.
        match self.objects.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let object = Arc::clone(entry.get());
                let actions = object.transition(event, owner);
                (object, actions)
            }
            Entry::Vacant(entry) => {
                let object = Arc::new(RoomObject::new(name));
                let actions = object.transition(event, owner);
                entry.insert(Arc::clone(&object));
                (object, actions)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestBed;
    use serde_json::json;

    #[test]
    fn reference_creates_placeholder_once() {
        let registry = ObjectRegistry::new();
        let first = registry.get_or_placeholder("light1");
        let second = registry.get_or_placeholder("light1");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_placeholder());
        assert_eq!(first.object_type(), "promise");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_does_not_create() {
        let registry = ObjectRegistry::new();
        assert!(registry.get("light1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn subscribe_creates_placeholder() {
        let registry = ObjectRegistry::new();
        let _rx = registry.subscribe("motion");
        let object = registry.get("motion").unwrap();
        assert!(object.is_placeholder());
        assert_eq!(object.subscriber_count(), 1);
    }

    #[test]
    fn local_emit_on_placeholder_reaches_subscribers_only() {
        let registry = ObjectRegistry::new();
        let mut rx = registry.subscribe("doorbell");
        let object = registry.get("doorbell").unwrap();

        let receipt = object.emit("ring", vec![json!(1)], Values::new()).unwrap();
        assert!(receipt.is_none());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, "ring");
        assert_eq!(event.origin, EventOrigin::Local);
    }

    #[test]
    fn apply_report_merges_values_and_announces_changes() {
        let registry = ObjectRegistry::new();
        let object = registry.get_or_placeholder("lamp");
        let mut rx = object.subscribe();

        let report = ObjectReport::from_entry(
            "lamp",
            &json!({"type": "dimmer", "data": {"on": true, "brightness": 10}}),
        )
        .unwrap();
        assert!(object.apply_report(&report));
        assert!(!object.apply_report(&report), "identical report is a no-op");

        assert_eq!(object.value("on"), Some(json!(true)));
        assert_eq!(object.value("brightness"), Some(json!(10)));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, UPDATE_EVENT);
        assert_eq!(event.origin, EventOrigin::Remote);
        assert_eq!(event.kwargs.len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn claim_upgrades_placeholder_in_place() {
        let bed = TestBed::new().await;
        let kitchen = bed.satellite("kitchen", "s3cret");

        let placeholder = bed.registry.get_or_placeholder("light1");
        let mut rx = placeholder.subscribe();

        let (object, actions) = bed.registry.claim("light1", &kitchen, "satellite_toggle");
        assert!(Arc::ptr_eq(&object, &placeholder));
        assert!(actions.contains(&BindingAction::UpgradePlaceholder));
        assert_eq!(object.object_type(), "satellite_toggle");
        assert_eq!(object.owner_name().as_deref(), Some("kitchen"));
        assert!(object.owner().is_some());

        // Subscription taken before the upgrade still works.
        object.dispatch(ObjectEvent {
            object: "light1".into(),
            event: "motion".into(),
            args: vec![],
            kwargs: Values::new(),
            origin: EventOrigin::Remote,
        });
        assert_eq!(rx.try_recv().unwrap().event, "motion");
    }

    #[tokio::test]
    async fn objects_of_type_matches_both_spellings() {
        let bed = TestBed::new().await;
        let kitchen = bed.satellite("kitchen", "s3cret");
        bed.registry.claim("light1", &kitchen, "satellite_toggle");
        bed.registry.claim("light2", &kitchen, "satellite_toggle");
        bed.registry.claim("lamp", &kitchen, "satellite_dimmer");
        bed.registry.get_or_placeholder("pending");

        let toggles: Vec<_> = bed
            .registry
            .objects_of_type("toggle")
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        assert_eq!(toggles, vec!["light1", "light2"]);
        assert_eq!(bed.registry.objects_of_type("satellite_dimmer").len(), 1);
        assert_eq!(bed.registry.objects_of_type("promise").len(), 1);
    }

    #[tokio::test]
    async fn snapshot_is_sorted() {
        let bed = TestBed::new().await;
        bed.registry.get_or_placeholder("b");
        bed.registry.get_or_placeholder("a");
        let names: Vec<_> = bed
            .registry
            .snapshot()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
