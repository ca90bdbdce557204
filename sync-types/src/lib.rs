//! # sync-types
//!
//! Wire format types for the roomlink satellite sync protocol.
//!
//! This crate provides the foundational types shared by the controller and
//! the pure-logic crate:
//! - [`Timestamp`], [`CommandId`] - Time and identity types
//! - [`UplinkPush`], [`EventPush`], [`DownlinkPoll`] - Inbound request bodies
//! - [`ObjectReport`], [`Health`] - Per-object state reported by a satellite
//! - [`Command`], [`CommandKind`] - Typed outbound commands
//! - [`SyncError`] - Error types
//!
//! All payloads travel as JSON over HTTP.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod command;
mod error;
mod ids;
mod messages;

pub use command::{
    Command, CommandKind, DownlinkCommand, DownlinkDelivery, SET_STATE_EVENT, SET_VALUE_EVENT,
};
pub use error::SyncError;
pub use ids::{CommandId, Timestamp};
pub use messages::{
    DownlinkBatch, DownlinkPoll, EventPush, Health, ObjectReport, UplinkPush, Values,
};
