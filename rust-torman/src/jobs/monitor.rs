//! Periodic monitor driving completion detection and push updates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::EngineGateway;
use crate::push::Broadcaster;

use super::completion::CompletionDetector;
use super::registry::JobRegistry;

/// Background task polling every active job on a fixed cadence.
///
/// Ticks are strictly sequential; a broadcast always reflects the registry
/// state as of the end of that tick's completion pass. The wake notify pulls
/// the next tick forward (used right after a successful submission) instead
/// of spawning ad-hoc broadcast tasks.
pub struct Monitor {
    registry: Arc<JobRegistry>,
    gateway: Arc<EngineGateway>,
    detector: CompletionDetector,
    broadcaster: Arc<Broadcaster>,
    wake: Arc<Notify>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Monitor {
    pub fn new(
        registry: Arc<JobRegistry>,
        gateway: Arc<EngineGateway>,
        detector: CompletionDetector,
        broadcaster: Arc<Broadcaster>,
        wake: Arc<Notify>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            gateway,
            detector,
            broadcaster,
            wake,
            interval,
            cancel,
        }
    }

    /// Token that stops the run loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive ticks until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.interval.as_millis() as u64, "monitor started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }
            self.tick().await;
        }
        info!("monitor stopped");
    }

    /// One monitor pass: poll stats for every active job, finalize the
    /// finished ones, then broadcast the merged view. Always broadcasts,
    /// even with zero connected clients, since clients may connect between
    /// ticks.
    pub async fn tick(&self) {
        for (id, handle) in self.registry.active_jobs() {
            match self.gateway.stats(&handle).await {
                Ok(stats) => {
                    if stats.progress >= 1.0 {
                        self.detector.finalize(&id, &handle, &stats).await;
                    } else {
                        self.registry.refresh_from_stats(&id, &stats);
                    }
                }
                // One job's failure never aborts the tick for the others.
                Err(e) => debug!(job = %id, error = %e, "status query failed"),
            }
        }

        self.broadcaster.broadcast(&self.registry.merged_view());
    }
}
