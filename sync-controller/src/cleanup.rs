//! Background cleanup task for idle rate-limit entries.
//!
//! Runs periodically so satellites that stopped pushing (or were removed)
//! do not keep limiter state alive forever.

use crate::limits::RateLimits;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Spawn the limiter cleanup task.
///
/// The task exits when `cancel` fires.
pub fn spawn_cleanup_task(
    rate_limits: RateLimits,
    interval_secs: u64,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs.max(1)));
        // The first tick completes immediately.
        timer.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            let before = rate_limits.push_keys_count();
            rate_limits.shrink();
            let after = rate_limits.push_keys_count();
            if before > after {
                tracing::info!("Cleanup: evicted {} idle limiter entries", before - after);
            } else {
                tracing::debug!("Cleanup: no idle limiter entries");
            }
        }

        tracing::debug!("Cleanup task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;

    #[tokio::test]
    async fn cleanup_task_stops_on_cancel() {
        let limits = RateLimits::new(&LimitsConfig::default()).unwrap();
        let cancel = CancellationToken::new();

        let handle = spawn_cleanup_task(limits, 1, cancel.clone());
        cancel.cancel();

        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("Task should complete when cancelled")
            .expect("Task should not panic");
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_keeps_active_entries() {
        let limits = RateLimits::new(&LimitsConfig {
            pushes_per_minute: 1,
            ..LimitsConfig::default()
        })
        .unwrap();
        let _ = limits.check_push("kitchen");
        let cancel = CancellationToken::new();

        let handle = spawn_cleanup_task(limits.clone(), 1, cancel.clone());
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(limits.push_keys_count(), 1);
        cancel.cancel();
        handle.await.unwrap();
    }
}
