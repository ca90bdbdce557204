//! # sync-controller
//!
//! Satellite sync for the roomlink home-automation controller.
//!
//! A satellite is a remote node that owns physical devices. This crate keeps
//! a local proxy for every device a satellite reports, so automations read
//! and drive remote devices as if they were local:
//! - Accepts uplink reports and events pushed by satellites over HTTP
//! - Pulls a report when a satellite has been quiet too long
//! - Queues proxy mutations per satellite and delivers them in order
//! - Persists each satellite's address and last contact in SQLite
//!
//! ## Architecture
//!
//! ```text
//!  satellite node ──POST /uplink, /event──►┌──────────────────────────┐
//!        ▲                                 │      sync-controller     │
//!        │                                 │  SyncService             │
//!        │◄──GET /uplink (pull)────────────│   ├─ Satellite (×N)      │
//!        │◄──POST /downlink (commands)─────│   │   drain/poll/heartbeat│
//!                                          │   └─ ObjectRegistry      │
//!                                          │  SQLite (satellites)     │
//!                                          └──────────────────────────┘
//! ```
//!
//! ## Liveness
//!
//! A satellite is online while its last contact is under 60 seconds old.
//! After 45 quiet seconds its poll loop pulls a fresh report; commands for an
//! offline satellite are refused at the proxy and discarded at delivery.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod link;
mod locks;
pub mod proxy;
pub mod registry;
pub mod satellite;
pub mod service;
pub mod storage;
pub mod tasks;

#[cfg(test)]
mod testing;

pub use error::{CommandError, ControllerError, InboundError};
pub use proxy::{CommandReceipt, SatelliteProxy};
pub use registry::{ObjectEvent, ObjectRegistry, RoomObject};
pub use satellite::{Satellite, SnapshotOutcome};
pub use service::SyncService;
