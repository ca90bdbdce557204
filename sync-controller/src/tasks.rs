//! Background tasks for a satellite.
//!
//! Each loop runs under a supervisor: a panic inside one iteration is logged
//! and the loop is restarted after a short pause. Only cancellation stops it.

use crate::satellite::Satellite;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Pause before restarting a loop that panicked.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Join handles for one satellite's loops.
#[derive(Debug)]
pub struct SatelliteTasks {
    drain: JoinHandle<()>,
    poll: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl SatelliteTasks {
    /// Wait for all loops to finish. Call after cancelling.
    pub async fn join(self) {
        for (label, handle) in [
            ("drain", self.drain),
            ("poll", self.poll),
            ("heartbeat", self.heartbeat),
        ] {
            if let Err(e) = handle.await {
                tracing::error!("{} supervisor ended abnormally: {}", label, e);
            }
        }
    }
}

/// Spawn the drain, poll and heartbeat loops for `satellite`.
pub fn spawn_satellite_tasks(satellite: Arc<Satellite>) -> SatelliteTasks {
    let cancel = satellite.cancellation().clone();
    let name = satellite.name().to_string();

    let drain = {
        let satellite = Arc::clone(&satellite);
        supervise(&name, "drain", cancel.clone(), move || {
            Arc::clone(&satellite).drain_loop()
        })
    };
    let poll = {
        let satellite = Arc::clone(&satellite);
        supervise(&name, "poll", cancel.clone(), move || {
            Arc::clone(&satellite).poll_loop()
        })
    };
    let heartbeat = supervise(&name, "heartbeat", cancel, move || {
        Arc::clone(&satellite).heartbeat_loop()
    });

    tracing::info!("Started loops for satellite {}", name);
    SatelliteTasks {
        drain,
        poll,
        heartbeat,
    }
}

/// Run `make()` until it returns normally or `cancel` fires.
fn supervise<F, Fut>(
    satellite: &str,
    label: &'static str,
    cancel: CancellationToken,
    make: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let satellite = satellite.to_string();
    tokio::spawn(async move {
        loop {
            match tokio::spawn(make()).await {
                Ok(()) => break,
                Err(e) if e.is_panic() => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    tracing::error!(
                        "{} loop for {} panicked, restarting in {:?}",
                        label,
                        satellite,
                        RESTART_DELAY
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RESTART_DELAY) => {}
                    }
                }
                Err(_) => break,
            }
        }
    })
}
