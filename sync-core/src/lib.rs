//! # sync-core
//!
//! Pure logic for roomlink satellite sync (no I/O, instant tests).
//!
//! This crate implements the state machines and classification rules for
//! satellite sync without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`liveness`] classifies a satellite from its last-contact time
//! - [`binding`] drives a registry name from placeholder to bound proxy
//! - [`capability`] answers "can this device do X" from its reported values
//!
//! The actual I/O (HTTP, SQLite, task scheduling) is performed by
//! `sync-controller`, which interprets the results.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod capability;
pub mod liveness;

pub use binding::{
    declared_type_for, Binding, BindingAction, BindingEvent, SATELLITE_TYPE_PREFIX,
};
pub use capability::{Capability, CapabilitySupport};
pub use liveness::{Liveness, LivenessPolicy, LivenessTracker, LivenessTransition};
