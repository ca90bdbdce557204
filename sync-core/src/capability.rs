//! Optional device capabilities.
//!
//! A mirrored device only supports what its satellite actually reports.
//! Queries always return a defined answer; an unsupported capability is a
//! value, never a silently synthesized no-op.

use std::fmt;
use sync_types::Values;

/// A controllable aspect of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// On/off switching (`on` value key).
    Power,
    /// Dimming (`brightness` value key).
    Brightness,
    /// Colour selection (`color` value key).
    Color,
}

impl Capability {
    /// Every known capability.
    pub const ALL: [Capability; 3] = [Capability::Power, Capability::Brightness, Capability::Color];

    /// Value key whose presence advertises this capability.
    pub fn value_key(&self) -> &'static str {
        match self {
            Capability::Power => "on",
            Capability::Brightness => "brightness",
            Capability::Color => "color",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Power => "power",
            Capability::Brightness => "brightness",
            Capability::Color => "color",
        };
        f.write_str(name)
    }
}

/// Answer to a capability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilitySupport {
    /// The device reports this capability.
    Supported,
    /// The device does not report this capability.
    Unsupported,
}

impl CapabilitySupport {
    /// Shorthand for `== Supported`.
    pub fn is_supported(&self) -> bool {
        matches!(self, CapabilitySupport::Supported)
    }
}

/// Decide support from the values last reported by the device.
pub fn support_for(capability: Capability, values: &Values) -> CapabilitySupport {
    if values.contains_key(capability.value_key()) {
        CapabilitySupport::Supported
    } else {
        CapabilitySupport::Unsupported
    }
}

/// All capabilities the reported values advertise.
pub fn supported(values: &Values) -> Vec<Capability> {
    Capability::ALL
        .into_iter()
        .filter(|c| support_for(*c, values).is_supported())
        .collect()
}
