//! Outbound link to satellite nodes.
//!
//! Each node runs its own small HTTP server:
//! - `GET  /uplink`   returns the node's current object report
//! - `POST /downlink` accepts one command
//!
//! The controller only talks to a node through [`SatelliteLink`], so tests can
//! swap in [`MockLink`] and inspect what would have gone over the wire.

mod http;
mod mock;

pub use self::http::HttpLink;
pub use mock::MockLink;

use crate::error::TransportError;
use async_trait::async_trait;
use sync_types::{DownlinkDelivery, UplinkPush};

/// Outbound transport to satellite nodes.
#[async_trait]
pub trait SatelliteLink: Send + Sync {
    /// Pull the node's current uplink report.
    ///
    /// `address` is `host` or `host:port`; a missing port means the default
    /// node port.
    async fn pull_uplink(&self, address: &str) -> Result<UplinkPush, TransportError>;

    /// Deliver one command to the node.
    ///
    /// Any non-success status is an error. There is no retry.
    async fn send_command(
        &self,
        address: &str,
        delivery: &DownlinkDelivery,
    ) -> Result<(), TransportError>;
}
