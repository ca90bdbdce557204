//! Request and response bodies exchanged between satellites and the controller.
//!
//! Field names follow the satellite firmware's JSON exactly; do not rename
//! without updating the nodes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DownlinkCommand, SyncError};

/// A free-form value map (`key -> JSON value`).
pub type Values = serde_json::Map<String, Value>;

/// Health of a single mirrored object as reported by its satellite.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Health {
    /// Whether the physical device is reachable from its satellite.
    #[serde(default)]
    pub online: bool,
    /// Whether the device is in a fault state.
    #[serde(default)]
    pub fault: bool,
    /// Human-readable reason for the current fault/offline state.
    #[serde(default)]
    pub reason: String,
}

/// State of one object inside an uplink snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectReport {
    /// Device type as known to the satellite (e.g. `toggle`).
    #[serde(rename = "type")]
    pub object_type: String,
    /// Current values.
    #[serde(default)]
    pub data: Values,
    /// Current health. Absent means "unchanged".
    #[serde(default)]
    pub health: Option<Health>,
}

impl ObjectReport {
    /// Parse a single snapshot entry.
    ///
    /// Entries are parsed one at a time so that a malformed entry can be
    /// skipped without discarding the rest of the snapshot.
    pub fn from_entry(object: &str, raw: &Value) -> Result<Self, SyncError> {
        let report: ObjectReport =
            serde_json::from_value(raw.clone()).map_err(|e| SyncError::MalformedObject {
                object: object.to_string(),
                reason: e.to_string(),
            })?;

        if report.object_type.trim().is_empty() {
            return Err(SyncError::MalformedObject {
                object: object.to_string(),
                reason: "empty type".into(),
            });
        }

        Ok(report)
    }
}

/// Full state snapshot pushed by a satellite (`POST /uplink`) or returned by
/// a satellite when the controller pulls (`GET /uplink` on the node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkPush {
    /// Name of the reporting satellite.
    pub name: String,
    /// Address the satellite is currently reachable at.
    #[serde(default)]
    pub current_ip: Option<String>,
    /// Raw object entries in the order the node listed them, parsed
    /// individually via [`UplinkPush::reports`].
    #[serde(default)]
    pub objects: Values,
    /// Shared secret. Empty on pull responses.
    #[serde(default)]
    pub auth: String,
}

impl UplinkPush {
    /// Iterate over the snapshot entries, parsing each independently.
    pub fn reports(&self) -> impl Iterator<Item = (&str, Result<ObjectReport, SyncError>)> {
        self.objects
            .iter()
            .map(|(name, raw)| (name.as_str(), ObjectReport::from_entry(name, raw)))
    }

    /// Deserialize from a JSON byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::Deserialization)
    }
}

/// A single event pushed by a satellite (`POST /event`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPush {
    /// Name of the reporting satellite.
    pub name: String,
    /// Address the satellite is currently reachable at.
    #[serde(default)]
    pub current_ip: Option<String>,
    /// Object that emitted the event.
    pub object: String,
    /// Event name (e.g. `motion`, `button_pressed`).
    pub event: String,
    /// Positional event arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword event arguments.
    #[serde(default)]
    pub kwargs: Values,
    /// Shared secret.
    #[serde(default)]
    pub auth: String,
}

/// Legacy downlink poll (`GET /downlink`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkPoll {
    /// Name of the polling satellite.
    pub name: String,
    /// Shared secret.
    #[serde(default)]
    pub auth: String,
}

/// Response to a legacy downlink poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DownlinkBatch {
    /// Queued commands. Commands are delivered by push, so this is empty.
    pub commands: Vec<DownlinkCommand>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uplink_parses_firmware_payload() {
        let payload = json!({
            "name": "kitchen",
            "current_ip": "10.0.0.7",
            "objects": {
                "light1": {
                    "type": "toggle",
                    "data": {"on": true},
                    "health": {"online": true, "fault": false, "reason": ""}
                }
            },
            "auth": "s3cret"
        });

        let push: UplinkPush = serde_json::from_value(payload).unwrap();
        assert_eq!(push.name, "kitchen");
        assert_eq!(push.current_ip.as_deref(), Some("10.0.0.7"));

        let reports: Vec<_> = push.reports().collect();
        assert_eq!(reports.len(), 1);
        let (name, report) = &reports[0];
        assert_eq!(*name, "light1");
        let report = report.as_ref().unwrap();
        assert_eq!(report.object_type, "toggle");
        assert_eq!(report.data.get("on"), Some(&json!(true)));
        assert!(report.health.as_ref().unwrap().online);
    }

    #[test]
    fn malformed_entry_does_not_poison_snapshot() {
        let payload = json!({
            "name": "kitchen",
            "objects": {
                "good": {"type": "toggle", "data": {"on": false}},
                "no_type": {"data": {"on": true}},
                "bad_data": {"type": "toggle", "data": [1, 2, 3]},
                "blank_type": {"type": "  "}
            }
        });

        let push: UplinkPush = serde_json::from_value(payload).unwrap();
        let (ok, bad): (Vec<_>, Vec<_>) = push.reports().partition(|(_, r)| r.is_ok());

        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].0, "good");
        assert_eq!(bad.len(), 3);
        for (_, err) in bad {
            assert!(matches!(err, Err(SyncError::MalformedObject { .. })));
        }
    }

    #[test]
    fn pull_response_without_auth_parses() {
        let push = UplinkPush::from_slice(br#"{"name":"porch","objects":{}}"#).unwrap();
        assert_eq!(push.auth, "");
        assert!(push.current_ip.is_none());
    }

    #[test]
    fn missing_health_is_none() {
        let report = ObjectReport::from_entry("t", &json!({"type": "sensor"})).unwrap();
        assert!(report.health.is_none());
        assert!(report.data.is_empty());
    }

    #[test]
    fn partial_health_keeps_the_entry() {
        let report = ObjectReport::from_entry(
            "light1",
            &json!({"type": "toggle", "data": {"on": true}, "health": {"online": true}}),
        )
        .unwrap();

        assert_eq!(report.data.get("on"), Some(&json!(true)));
        let health = report.health.unwrap();
        assert!(health.online);
        assert!(!health.fault);
        assert_eq!(health.reason, "");
    }

    #[test]
    fn reports_follow_node_order() {
        let push = UplinkPush::from_slice(
            br#"{"name":"kitchen","objects":{"zone9":{"type":"toggle"},"alpha":{"type":"sensor"},"mid":{"type":"dimmer"}}}"#,
        )
        .unwrap();

        let names: Vec<_> = push.reports().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["zone9", "alpha", "mid"]);
    }

    #[test]
    fn event_defaults_args_and_kwargs() {
        let event: EventPush = serde_json::from_value(json!({
            "name": "kitchen",
            "object": "button1",
            "event": "pressed",
            "auth": "s3cret"
        }))
        .unwrap();

        assert!(event.args.is_empty());
        assert!(event.kwargs.is_empty());
    }

    #[test]
    fn downlink_batch_serializes_empty_list() {
        let json = serde_json::to_value(DownlinkBatch::default()).unwrap();
        assert_eq!(json, json!({"commands": []}));
    }
}
