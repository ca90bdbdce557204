//! Mock link for testing.
//!
//! Allows queueing pull responses and capturing delivered commands for
//! verification.

use super::SatelliteLink;
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sync_types::{DownlinkDelivery, UplinkPush};

/// Mock link for testing.
///
/// Pulls answer from a queue of canned responses; with an empty queue the
/// node is treated as unreachable. Every delivery is recorded.
#[derive(Debug, Default)]
pub struct MockLink {
    inner: Arc<Mutex<MockLinkInner>>,
}

#[derive(Debug, Default)]
struct MockLinkInner {
    pull_responses: VecDeque<UplinkPush>,
    pull_attempts: Vec<String>,
    delivered: Vec<(String, DownlinkDelivery)>,
    fail_next_pull: Option<String>,
    fail_next_send: Option<String>,
    reject_sends_with: Option<u16>,
}

impl MockLink {
    /// Create a new mock link.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockLinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a report to be returned by the next `pull_uplink()` call.
    pub fn queue_pull_response(&self, report: UplinkPush) {
        self.inner().pull_responses.push_back(report);
    }

    /// Addresses that were pulled, in order.
    pub fn pull_attempts(&self) -> Vec<String> {
        self.inner().pull_attempts.clone()
    }

    /// All deliveries, in order, with the address they were sent to.
    pub fn delivered(&self) -> Vec<(String, DownlinkDelivery)> {
        self.inner().delivered.clone()
    }

    /// Cause the next pull to fail with the given error.
    pub fn fail_next_pull(&self, error: &str) {
        self.inner().fail_next_pull = Some(error.to_string());
    }

    /// Cause the next send to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.inner().fail_next_send = Some(error.to_string());
    }

    /// Answer every send with this HTTP status (`None` restores success).
    pub fn reject_sends_with(&self, status: Option<u16>) {
        self.inner().reject_sends_with = status;
    }

    /// Wait until at least `count` commands were delivered or `timeout` passes.
    pub async fn wait_for_deliveries(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |inner| inner.delivered.len() >= count)
            .await
    }

    /// Wait until at least `count` pulls were attempted or `timeout` passes.
    pub async fn wait_for_pulls(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |inner| inner.pull_attempts.len() >= count)
            .await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn(&MockLinkInner) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if done(&self.inner()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Clear all state.
    pub fn reset(&self) {
        *self.inner() = MockLinkInner::default();
    }
}

impl Clone for MockLink {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SatelliteLink for MockLink {
    async fn pull_uplink(&self, address: &str) -> Result<UplinkPush, TransportError> {
        let mut inner = self.inner();
        inner.pull_attempts.push(address.to_string());

        // Check for forced failure
        if let Some(error) = inner.fail_next_pull.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner
            .pull_responses
            .pop_front()
            .ok_or_else(|| TransportError::ConnectionFailed(format!("{address} unreachable")))
    }

    async fn send_command(
        &self,
        address: &str,
        delivery: &DownlinkDelivery,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner();

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::ConnectionFailed(error));
        }
        if let Some(status) = inner.reject_sends_with {
            return Err(TransportError::Status { status });
        }

        inner
            .delivered
            .push((address.to_string(), delivery.clone()));
        Ok(())
    }
}
