//! Per-object binding state machine.
//!
//! Every name in the object registry moves through
//! `Unregistered → Placeholder → Bound(satellite)`. A placeholder is created
//! when local automation references a name before any satellite reports it;
//! the first satellite to claim the name upgrades that same entry in place.
//!
//! Like the rest of this crate the machine is pure: `on_event` returns the
//! new state plus the actions the registry must carry out.

use std::fmt;

/// Prefix applied to every satellite-reported device type.
pub const SATELLITE_TYPE_PREFIX: &str = "satellite_";

/// Build the registry type tag for a satellite-reported type.
///
/// `toggle` becomes `satellite_toggle`; an already-prefixed tag is kept.
pub fn declared_type_for(reported: &str) -> String {
    if reported.starts_with(SATELLITE_TYPE_PREFIX) {
        reported.to_string()
    } else {
        format!("{SATELLITE_TYPE_PREFIX}{reported}")
    }
}

/// Binding of one registry name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Binding {
    /// Nothing in the registry under this name.
    #[default]
    Unregistered,
    /// Referenced locally, not yet claimed by a satellite.
    Placeholder,
    /// Mirrored from a satellite.
    Bound {
        /// Owning satellite.
        satellite: String,
        /// Declared type tag (`satellite_<type>`).
        declared_type: String,
    },
}

impl Binding {
    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: BindingEvent) -> (Self, Vec<BindingAction>) {
        match (self, event) {
            (Self::Unregistered, BindingEvent::Referenced) => {
                (Self::Placeholder, vec![BindingAction::CreatePlaceholder])
            }
            (Self::Unregistered, BindingEvent::Claimed { satellite, declared_type }) => (
                Self::Bound {
                    satellite,
                    declared_type,
                },
                vec![BindingAction::CreateProxy, BindingAction::RecordOwnership],
            ),

            (Self::Placeholder, BindingEvent::Referenced) => (Self::Placeholder, vec![]),
            (Self::Placeholder, BindingEvent::Claimed { satellite, declared_type }) => (
                Self::Bound {
                    satellite,
                    declared_type,
                },
                vec![
                    BindingAction::UpgradePlaceholder,
                    BindingAction::RecordOwnership,
                ],
            ),

            (bound @ Self::Bound { .. }, BindingEvent::Referenced) => (bound, vec![]),
            (
                Self::Bound {
                    satellite: owner,
                    declared_type: existing,
                },
                BindingEvent::Claimed {
                    satellite,
                    declared_type,
                },
            ) => {
                let mut actions = Vec::new();
                if owner != satellite {
                    actions.push(BindingAction::WarnOwnedElsewhere {
                        owner: owner.clone(),
                    });
                } else if existing != declared_type {
                    actions.push(BindingAction::WarnTypeMismatch {
                        existing: existing.clone(),
                        claimed: declared_type,
                    });
                }
                (
                    Self::Bound {
                        satellite: owner,
                        declared_type: existing,
                    },
                    actions,
                )
            }
        }
    }

    /// Owning satellite, if bound.
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Bound { satellite, .. } => Some(satellite),
            _ => None,
        }
    }

    /// Type tag as shown in listings (`promise` for placeholders).
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Placeholder => "promise",
            Self::Bound { declared_type, .. } => declared_type,
        }
    }

    /// Whether this entry is still an unclaimed placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound { satellite, declared_type } => {
                write!(f, "{declared_type} owned by {satellite}")
            }
            other => f.write_str(other.type_tag()),
        }
    }
}

/// Inputs to the binding machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingEvent {
    /// Local code looked the name up (subscribe, get-or-create).
    Referenced,
    /// A satellite reported an object under this name.
    Claimed {
        /// Claiming satellite.
        satellite: String,
        /// Declared type tag (`satellite_<type>`).
        declared_type: String,
    },
}

/// Work the registry carries out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingAction {
    /// Insert a new placeholder entry.
    CreatePlaceholder,
    /// Insert a new proxy entry.
    CreateProxy,
    /// Convert the existing placeholder entry into a proxy, keeping identity.
    UpgradePlaceholder,
    /// Add the name to the claiming satellite's owned objects.
    RecordOwnership,
    /// Same owner, different type: log and reuse the existing entry.
    WarnTypeMismatch {
        /// Type already on record.
        existing: String,
        /// Type in the new claim.
        claimed: String,
    },
    /// Another satellite already owns this name: log and ignore the claim.
    WarnOwnedElsewhere {
        /// Current owner.
        owner: String,
    },
}
