//! Outbound commands (controller → satellite).
//!
//! Inside the controller a command is a typed [`CommandKind`]. It is only
//! flattened into the firmware's `{object, event, args, kwargs}` tuple at the
//! moment it goes on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CommandId, SyncError, Values};

/// Event name used on the wire for power changes.
pub const SET_STATE_EVENT: &str = "set_state";

/// Event name used on the wire for generic value writes.
pub const SET_VALUE_EVENT: &str = "set_value";

/// What a command asks the remote device to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandKind {
    /// Switch the device on or off.
    SetState {
        /// Desired power state.
        on: bool,
    },
    /// Write a single value key.
    SetValue {
        /// Value key (e.g. `brightness`).
        key: String,
        /// Desired value.
        value: Value,
    },
    /// Forward an arbitrary locally emitted event.
    Event {
        /// Event name.
        name: String,
        /// Positional arguments.
        #[serde(default)]
        args: Vec<Value>,
        /// Keyword arguments.
        #[serde(default)]
        kwargs: Values,
    },
}

impl CommandKind {
    /// Event name as sent to the satellite.
    pub fn event_name(&self) -> &str {
        match self {
            CommandKind::SetState { .. } => SET_STATE_EVENT,
            CommandKind::SetValue { .. } => SET_VALUE_EVENT,
            CommandKind::Event { name, .. } => name,
        }
    }
}

/// A command queued for exactly one satellite.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Correlation id for logs.
    pub id: CommandId,
    /// Target object name.
    pub object: String,
    /// The requested operation.
    pub kind: CommandKind,
}

impl Command {
    /// Create a new command with a fresh id.
    pub fn new(object: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            id: CommandId::new(),
            object: object.into(),
            kind,
        }
    }

    /// Event name as sent to the satellite.
    pub fn event_name(&self) -> &str {
        self.kind.event_name()
    }

    /// Flatten into the firmware's wire tuple.
    pub fn to_wire(&self) -> DownlinkCommand {
        let (args, kwargs) = match &self.kind {
            CommandKind::SetState { on } => (vec![Value::Bool(*on)], Values::new()),
            CommandKind::SetValue { key, value } => {
                (vec![Value::String(key.clone()), value.clone()], Values::new())
            }
            CommandKind::Event { args, kwargs, .. } => (args.clone(), kwargs.clone()),
        };

        DownlinkCommand {
            object: self.object.clone(),
            event: self.event_name().to_string(),
            args,
            kwargs,
        }
    }
}

/// Wire form of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkCommand {
    /// Target object name.
    pub object: String,
    /// Event name.
    pub event: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Values,
}

/// Body of `POST /downlink` on a satellite node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkDelivery {
    /// Name of the receiving satellite.
    pub name: String,
    /// The command.
    #[serde(flatten)]
    pub command: DownlinkCommand,
    /// The receiving satellite's shared secret.
    pub auth: String,
}

impl DownlinkDelivery {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::Serialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_state_flattens_to_set_state_event() {
        let cmd = Command::new("light1", CommandKind::SetState { on: true });
        let wire = cmd.to_wire();

        assert_eq!(wire.object, "light1");
        assert_eq!(wire.event, "set_state");
        assert_eq!(wire.args, vec![json!(true)]);
        assert!(wire.kwargs.is_empty());
    }

    #[test]
    fn set_value_carries_key_and_value() {
        let cmd = Command::new(
            "lamp",
            CommandKind::SetValue {
                key: "brightness".into(),
                value: json!(128),
            },
        );
        let wire = cmd.to_wire();

        assert_eq!(wire.event, "set_value");
        assert_eq!(wire.args, vec![json!("brightness"), json!(128)]);
    }

    #[test]
    fn custom_event_keeps_its_name_and_arguments() {
        let mut kwargs = Values::new();
        kwargs.insert("duration".into(), json!(5));
        let cmd = Command::new(
            "buzzer",
            CommandKind::Event {
                name: "beep".into(),
                args: vec![json!(3)],
                kwargs,
            },
        );
        let wire = cmd.to_wire();

        assert_eq!(wire.event, "beep");
        assert_eq!(wire.args, vec![json!(3)]);
        assert_eq!(wire.kwargs.get("duration"), Some(&json!(5)));
    }

    #[test]
    fn delivery_flattens_command_fields() {
        let delivery = DownlinkDelivery {
            name: "kitchen".into(),
            command: Command::new("light1", CommandKind::SetState { on: false }).to_wire(),
            auth: "s3cret".into(),
        };

        let value: Value = serde_json::from_slice(&delivery.to_bytes().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "kitchen",
                "object": "light1",
                "event": "set_state",
                "args": [false],
                "kwargs": {},
                "auth": "s3cret"
            })
        );
    }

    #[test]
    fn command_kind_is_tagged() {
        let json = serde_json::to_value(CommandKind::SetState { on: true }).unwrap();
        assert_eq!(json, json!({"kind": "set_state", "on": true}));
    }
}
