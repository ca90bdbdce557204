//! HTTP link backed by `reqwest`.

use super::SatelliteLink;
use crate::config::SatelliteConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use sync_types::{DownlinkDelivery, UplinkPush};

/// Talks to satellite nodes over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpLink {
    client: reqwest::Client,
    default_port: u16,
}

impl HttpLink {
    /// Build a link with the configured timeout and default node port.
    pub fn new(config: &SatelliteConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            default_port: config.default_port,
        })
    }

    /// Base URL for a node address.
    ///
    /// `192.168.1.20` → `http://192.168.1.20:47670`, an explicit port or
    /// scheme is kept as given.
    pub fn base_url(&self, address: &str) -> String {
        let address = address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            return address.to_string();
        }
        if has_port(address) {
            format!("http://{address}")
        } else {
            format!("http://{address}:{}", self.default_port)
        }
    }
}

fn has_port(address: &str) -> bool {
    // Bracketed IPv6 literal: "[::1]:8080" has a port, "[::1]" does not.
    if let Some(rest) = address.strip_prefix('[') {
        return rest
            .split_once(']')
            .is_some_and(|(_, tail)| tail.starts_with(':'));
    }
    address
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok())
}

#[async_trait]
impl SatelliteLink for HttpLink {
    async fn pull_uplink(&self, address: &str) -> Result<UplinkPush, TransportError> {
        let url = format!("{}/uplink", self.base_url(address));
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        UplinkPush::from_slice(&bytes).map_err(|e| TransportError::InvalidPayload(e.to_string()))
    }

    async fn send_command(
        &self,
        address: &str,
        delivery: &DownlinkDelivery,
    ) -> Result<(), TransportError> {
        let url = format!("{}/downlink", self.base_url(address));
        tracing::debug!(
            "POST {} ({} -> {})",
            url,
            delivery.command.event,
            delivery.command.object
        );

        let response = self.client.post(&url).json(delivery).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> HttpLink {
        HttpLink::new(&SatelliteConfig::default()).unwrap()
    }

    #[test]
    fn bare_host_gets_default_port() {
        assert_eq!(link().base_url("192.168.1.20"), "http://192.168.1.20:47670");
        assert_eq!(link().base_url("kitchen.local"), "http://kitchen.local:47670");
    }

    #[test]
    fn explicit_port_is_kept() {
        assert_eq!(link().base_url("192.168.1.20:8080"), "http://192.168.1.20:8080");
        assert_eq!(link().base_url("[::1]:9000"), "http://[::1]:9000");
    }

    #[test]
    fn ipv6_without_port_gets_default_port() {
        assert_eq!(link().base_url("[fe80::1]"), "http://[fe80::1]:47670");
    }

    #[test]
    fn scheme_is_kept_verbatim() {
        assert_eq!(
            link().base_url("http://127.0.0.1:3000/"),
            "http://127.0.0.1:3000"
        );
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_error() {
        // Port 1 on loopback refuses connections.
        let link = link();
        let err = link.pull_uplink("127.0.0.1:1").await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ConnectionFailed(_) | TransportError::Http(_) | TransportError::Timeout
        ));
    }
}
