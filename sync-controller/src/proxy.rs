//! Typed view over a satellite-bound registry object.
//!
//! A proxy reads like any local device (`values`, `health`, events) but every
//! mutation becomes a [`Command`](sync_types::Command) on the owning
//! satellite's queue. Local values only ever change from inbound data.

use crate::error::CommandError;
use crate::registry::{ObjectEvent, RoomObject};
use crate::satellite::Satellite;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use sync_core::capability::{support_for, supported};
use sync_core::{Capability, CapabilitySupport};
use sync_types::{Command, CommandId, CommandKind, Health, Values};
use tokio::sync::broadcast;

/// Proof that a command was queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReceipt {
    /// Command id, as it appears in the logs.
    pub id: CommandId,
    /// Satellite the command was queued on.
    pub satellite: String,
    /// Target object.
    pub object: String,
    /// Wire event name.
    pub event: String,
}

impl CommandReceipt {
    pub(crate) fn for_command(satellite: &str, command: &Command) -> Self {
        Self {
            id: command.id,
            satellite: satellite.to_string(),
            object: command.object.clone(),
            event: command.event_name().to_string(),
        }
    }
}

/// Handle on an object mirrored from a satellite.
#[derive(Clone)]
pub struct SatelliteProxy {
    object: Arc<RoomObject>,
}

impl fmt::Debug for SatelliteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SatelliteProxy")
            .field("name", &self.object.name())
            .field("owner", &self.object.owner_name())
            .finish()
    }
}

impl SatelliteProxy {
    /// Wrap a registry object. Returns `None` unless a satellite owns it.
    pub fn from_object(object: Arc<RoomObject>) -> Option<Self> {
        object.owner_name().is_some().then_some(Self { object })
    }

    pub(crate) fn new(object: Arc<RoomObject>) -> Self {
        Self { object }
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        self.object.name()
    }

    /// Underlying registry entry.
    pub fn object(&self) -> &Arc<RoomObject> {
        &self.object
    }

    /// Declared type (`satellite_<type>`).
    pub fn object_type(&self) -> String {
        self.object.object_type()
    }

    /// Name of the owning satellite.
    pub fn owner_name(&self) -> Option<String> {
        self.object.owner_name()
    }

    /// The owning satellite, unless it has been torn down.
    pub fn owner(&self) -> Option<Arc<Satellite>> {
        self.object.owner()
    }

    /// Whether `satellite` is the recorded owner.
    pub fn is_owned_by(&self, satellite: &Satellite) -> bool {
        self.object.owner_name().as_deref() == Some(satellite.name())
    }

    /// Whether the owning satellite is currently online.
    pub fn is_online(&self) -> bool {
        self.owner().is_some_and(|owner| owner.is_online())
    }

    /// Last reported values.
    pub fn values(&self) -> Values {
        self.object.values()
    }

    /// A single reported value.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.object.value(key)
    }

    /// Last reported health.
    pub fn health(&self) -> Health {
        self.object.health()
    }

    /// Subscribe to this object's events.
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectEvent> {
        self.object.subscribe()
    }

    /// Whether the device reports `capability`.
    pub fn capability(&self, capability: Capability) -> CapabilitySupport {
        support_for(capability, &self.values())
    }

    /// Every capability the device reports.
    pub fn capabilities(&self) -> Vec<Capability> {
        supported(&self.values())
    }

    /// Switch the device on or off.
    ///
    /// Typed setters check the owner first and the capability second, so an
    /// offline owner is reported even before the device has reported `on`.
    pub fn set_state(&self, on: bool) -> Result<CommandReceipt, CommandError> {
        self.send_with(Capability::Power, CommandKind::SetState { on })
    }

    /// Dim the device.
    pub fn set_brightness(&self, level: u32) -> Result<CommandReceipt, CommandError> {
        self.send_with(
            Capability::Brightness,
            CommandKind::SetValue {
                key: Capability::Brightness.value_key().to_string(),
                value: Value::from(level),
            },
        )
    }

    /// Change the device colour.
    pub fn set_color(&self, color: Value) -> Result<CommandReceipt, CommandError> {
        self.send_with(
            Capability::Color,
            CommandKind::SetValue {
                key: Capability::Color.value_key().to_string(),
                value: color,
            },
        )
    }

    /// Write an arbitrary value key.
    pub fn set_value(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<CommandReceipt, CommandError> {
        self.send(CommandKind::SetValue {
            key: key.into(),
            value,
        })
    }

    /// Emit a local event; subscribers see it and the satellite receives it.
    pub fn emit(
        &self,
        event: &str,
        args: Vec<Value>,
        kwargs: Values,
    ) -> Result<Option<CommandReceipt>, CommandError> {
        self.object.emit(event, args, kwargs)
    }

    /// Queue a command on the owning satellite.
    ///
    /// Nothing is queued while the owner is offline.
    pub fn send(&self, kind: CommandKind) -> Result<CommandReceipt, CommandError> {
        let owner = self.online_owner(&kind)?;
        owner.enqueue_command(self.name(), kind)
    }

    fn send_with(
        &self,
        capability: Capability,
        kind: CommandKind,
    ) -> Result<CommandReceipt, CommandError> {
        let owner = self.online_owner(&kind)?;
        self.require(capability)?;
        owner.enqueue_command(self.name(), kind)
    }

    fn online_owner(&self, kind: &CommandKind) -> Result<Arc<Satellite>, CommandError> {
        let owner = self.owner().ok_or_else(|| CommandError::OwnerGone {
            object: self.name().to_string(),
        })?;

        if !owner.is_online() {
            tracing::warn!(
                "Not sending {} to {}: satellite {} is offline",
                kind.event_name(),
                self.name(),
                owner.name()
            );
            return Err(CommandError::SatelliteOffline {
                satellite: owner.name().to_string(),
            });
        }
        Ok(owner)
    }

    fn require(&self, capability: Capability) -> Result<(), CommandError> {
        if self.capability(capability).is_supported() {
            Ok(())
        } else {
            Err(CommandError::Unsupported {
                object: self.name().to_string(),
                capability,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{report, TestBed};
    use serde_json::json;
    use sync_types::Timestamp;

    #[tokio::test]
    async fn capabilities_follow_reported_values() {
        let bed = TestBed::new().await;
        let kitchen = bed.online_satellite("kitchen", "s3cret").await;
        kitchen
            .apply_snapshot(&report("kitchen", json!({"light1": {"type": "toggle", "data": {"on": false}}})))
            .await;

        let proxy = bed.registry.proxy("light1").unwrap();
        assert_eq!(proxy.capability(Capability::Power), CapabilitySupport::Supported);
        assert_eq!(
            proxy.capability(Capability::Brightness),
            CapabilitySupport::Unsupported
        );
        assert_eq!(proxy.capabilities(), vec![Capability::Power]);
    }

    #[tokio::test]
    async fn unsupported_capability_is_an_error_not_a_no_op() {
        let bed = TestBed::new().await;
        let kitchen = bed.online_satellite("kitchen", "s3cret").await;
        kitchen
            .apply_snapshot(&report("kitchen", json!({"light1": {"type": "toggle", "data": {"on": false}}})))
            .await;

        let proxy = bed.registry.proxy("light1").unwrap();
        let err = proxy.set_brightness(50).unwrap_err();
        assert_eq!(
            err,
            CommandError::Unsupported {
                object: "light1".into(),
                capability: Capability::Brightness
            }
        );
        assert_eq!(kitchen.queue_depth(), 0);
    }

    #[tokio::test]
    async fn set_state_queues_one_command_while_online() {
        let bed = TestBed::new().await;
        let kitchen = bed.online_satellite("kitchen", "s3cret").await;
        kitchen
            .apply_snapshot(&report("kitchen", json!({"light1": {"type": "toggle", "data": {"on": false}}})))
            .await;

        let receipt = bed.registry.proxy("light1").unwrap().set_state(true).unwrap();
        assert_eq!(receipt.event, "set_state");
        assert_eq!(receipt.satellite, "kitchen");
        assert_eq!(kitchen.queue_depth(), 1);
        // Values only change from inbound data.
        assert_eq!(bed.registry.get("light1").unwrap().value("on"), Some(json!(false)));
    }

    #[tokio::test]
    async fn offline_owner_queues_nothing() {
        let bed = TestBed::new().await;
        let stale = Timestamp::new(Timestamp::now().as_secs() - 600);
        let kitchen = bed.persisted_satellite("kitchen", "s3cret", stale).await;
        let proxy = kitchen.reconcile_object("light1", "toggle");
        proxy
            .object()
            .apply_report(&sync_types::ObjectReport::from_entry("light1", &json!({"type": "toggle", "data": {"on": true}})).unwrap());

        let err = proxy.set_state(false).unwrap_err();
        assert_eq!(
            err,
            CommandError::SatelliteOffline {
                satellite: "kitchen".into()
            }
        );
        assert_eq!(kitchen.queue_depth(), 0);
    }

    #[tokio::test]
    async fn offline_is_reported_before_missing_capability() {
        let bed = TestBed::new().await;
        let stale = Timestamp::new(Timestamp::now().as_secs() - 600);
        let kitchen = bed.persisted_satellite("kitchen", "s3cret", stale).await;
        let proxy = kitchen.reconcile_object("light1", "toggle");
        assert!(proxy.value("on").is_none());

        assert_eq!(
            proxy.set_state(true).unwrap_err(),
            CommandError::SatelliteOffline {
                satellite: "kitchen".into()
            }
        );
        assert_eq!(kitchen.queue_depth(), 0);
    }

    #[tokio::test]
    async fn torn_down_owner_is_reported() {
        let bed = TestBed::new().await;
        let proxy = {
            let kitchen = bed.online_satellite("kitchen", "s3cret").await;
            kitchen.reconcile_object("light1", "toggle")
        };
        // The only strong reference was dropped with the block.
        let err = proxy.set_value("on", json!(true)).unwrap_err();
        assert_eq!(
            err,
            CommandError::OwnerGone {
                object: "light1".into()
            }
        );
    }

    #[tokio::test]
    async fn emit_forwards_local_events_as_commands() {
        let bed = TestBed::new().await;
        let kitchen = bed.online_satellite("kitchen", "s3cret").await;
        let proxy = kitchen.reconcile_object("buzzer", "buzzer");
        let mut rx = proxy.subscribe();

        let receipt = proxy
            .emit("beep", vec![json!(3)], Values::new())
            .unwrap()
            .unwrap();
        assert_eq!(receipt.event, "beep");
        assert_eq!(kitchen.queue_depth(), 1);
        assert_eq!(rx.try_recv().unwrap().event, "beep");
    }

    #[tokio::test]
    async fn placeholder_has_no_proxy() {
        let bed = TestBed::new().await;
        let object = bed.registry.get_or_placeholder("light1");
        assert!(SatelliteProxy::from_object(object).is_none());
    }
}
