//! Periodic monitoring loop driving [`Supervisor::tick`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::supervisor::Supervisor;

/// Spawn the single monitoring task. It ticks every `interval` until
/// `cancellation_token` is cancelled; local captures are left running and are
/// the caller's to stop through [`Supervisor::shutdown`].
pub fn spawn_monitor(
    supervisor: Arc<Supervisor>,
    interval: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; sample one interval in.
        ticker.tick().await;

        debug!(interval_ms = interval.as_millis() as u64, "Recording monitor started");
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = ticker.tick() => {
                    let report = supervisor.tick().await;
                    trace!(
                        samples = report.samples.len(),
                        restarted = report.restarted.len(),
                        failed = report.failed.len(),
                        completed = report.completed.len(),
                        "Monitor tick"
                    );
                }
            }
        }
        info!("Recording monitor stopped");
    })
}
