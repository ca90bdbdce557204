//! Prometheus metrics endpoint.

use crate::service::SyncService;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(
    Extension(service): Extension<Arc<SyncService>>,
) -> impl IntoResponse {
    let m = service.metrics();

    // Gauges
    let satellites = service.satellite_count();
    let online = service.online_count();
    let objects = service.registry().len();
    let queued: usize = service.satellites().iter().map(|s| s.queue_depth()).sum();
    let limiter_keys = service.rate_limits().push_keys_count();

    // Counters
    let uplinks = m.uplinks_total.load(Ordering::Relaxed);
    let events = m.events_total.load(Ordering::Relaxed);
    let downlink_polls = m.downlink_polls_total.load(Ordering::Relaxed);
    let auth_failures = m.auth_failures.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let pulls = m.pulls_total.load(Ordering::Relaxed);
    let pull_failures = m.pull_failures.load(Ordering::Relaxed);
    let enqueued = m.commands_enqueued.load(Ordering::Relaxed);
    let dropped = m.commands_dropped.load(Ordering::Relaxed);
    let sent = m.commands_sent.load(Ordering::Relaxed);
    let failed = m.commands_failed.load(Ordering::Relaxed);
    let discarded = m.commands_discarded.load(Ordering::Relaxed);
    let skipped = m.snapshot_entries_skipped.load(Ordering::Relaxed);
    let unknown = m.unknown_object_events.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP roomlink_controller_satellites Registered satellites
# TYPE roomlink_controller_satellites gauge
roomlink_controller_satellites {satellites}

# HELP roomlink_controller_satellites_online Satellites currently online
# TYPE roomlink_controller_satellites_online gauge
roomlink_controller_satellites_online {online}

# HELP roomlink_controller_objects Objects in the registry
# TYPE roomlink_controller_objects gauge
roomlink_controller_objects {objects}

# HELP roomlink_controller_commands_queued Commands waiting in satellite queues
# TYPE roomlink_controller_commands_queued gauge
roomlink_controller_commands_queued {queued}

# HELP roomlink_controller_rate_limit_keys Satellites tracked by the push limiter
# TYPE roomlink_controller_rate_limit_keys gauge
roomlink_controller_rate_limit_keys {limiter_keys}

# HELP roomlink_controller_info Controller information
# TYPE roomlink_controller_info gauge
roomlink_controller_info{{version="{version}"}} 1

# HELP roomlink_controller_uplinks_total Uplink pushes accepted
# TYPE roomlink_controller_uplinks_total counter
roomlink_controller_uplinks_total {uplinks}

# HELP roomlink_controller_events_total Event pushes accepted
# TYPE roomlink_controller_events_total counter
roomlink_controller_events_total {events}

# HELP roomlink_controller_downlink_polls_total Legacy downlink polls accepted
# TYPE roomlink_controller_downlink_polls_total counter
roomlink_controller_downlink_polls_total {downlink_polls}

# HELP roomlink_controller_auth_failures_total Inbound requests with an unknown secret
# TYPE roomlink_controller_auth_failures_total counter
roomlink_controller_auth_failures_total {auth_failures}

# HELP roomlink_controller_rate_limit_hits_total Inbound requests rejected by a rate limiter
# TYPE roomlink_controller_rate_limit_hits_total counter
roomlink_controller_rate_limit_hits_total {rate_limits}

# HELP roomlink_controller_pulls_total Pulls attempted by poll loops
# TYPE roomlink_controller_pulls_total counter
roomlink_controller_pulls_total {pulls}

# HELP roomlink_controller_pull_failures_total Pulls that failed
# TYPE roomlink_controller_pull_failures_total counter
roomlink_controller_pull_failures_total {pull_failures}

# HELP roomlink_controller_commands_enqueued_total Commands accepted into a queue
# TYPE roomlink_controller_commands_enqueued_total counter
roomlink_controller_commands_enqueued_total {enqueued}

# HELP roomlink_controller_commands_dropped_total Commands dropped on a full queue
# TYPE roomlink_controller_commands_dropped_total counter
roomlink_controller_commands_dropped_total {dropped}

# HELP roomlink_controller_commands_sent_total Commands delivered to a node
# TYPE roomlink_controller_commands_sent_total counter
roomlink_controller_commands_sent_total {sent}

# HELP roomlink_controller_commands_failed_total Commands whose delivery failed
# TYPE roomlink_controller_commands_failed_total counter
roomlink_controller_commands_failed_total {failed}

# HELP roomlink_controller_commands_discarded_total Commands discarded while the owner was unreachable
# TYPE roomlink_controller_commands_discarded_total counter
roomlink_controller_commands_discarded_total {discarded}

# HELP roomlink_controller_snapshot_entries_skipped_total Report entries skipped
# TYPE roomlink_controller_snapshot_entries_skipped_total counter
roomlink_controller_snapshot_entries_skipped_total {skipped}

# HELP roomlink_controller_unknown_object_events_total Events for objects the sender does not own
# TYPE roomlink_controller_unknown_object_events_total counter
roomlink_controller_unknown_object_events_total {unknown}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
