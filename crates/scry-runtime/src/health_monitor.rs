//! Periodic health polling.
//!
//! The monitor is policy-free: it only checks health and yields status
//! changes. Whoever consumes the stream decides what a change means (the
//! supervisor just logs it; restarts stay exit-triggered).

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::Stream;
use scry_core::ports::ReadinessProbe;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Continuous health monitor that yields only on change.
pub struct HealthMonitor {
    probe: Arc<dyn ReadinessProbe>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl HealthMonitor {
    /// Create a new health monitor.
    ///
    /// # Arguments
    ///
    /// * `probe` - Probe to run on every tick
    /// * `check_interval` - Period between checks; the first check happens
    ///   one period after `monitor()` starts
    /// * `cancel_token` - Token to signal monitor shutdown
    pub fn new(
        probe: Arc<dyn ReadinessProbe>,
        check_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            probe,
            interval: check_interval,
            cancel_token,
        }
    }

    /// Start monitoring and return a stream of health changes
    /// (`true` = healthy). The first observation is always yielded.
    /// Completes when the cancellation token fires.
    pub fn monitor(self) -> impl Stream<Item = bool> {
        let probe = self.probe;
        let cancel_token = self.cancel_token;
        let period = self.interval;

        stream! {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut last: Option<bool> = None;
            debug!(target_url = %probe.describe(), ?period, "Starting health monitor");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let healthy = probe.check().await;
                        if last != Some(healthy) {
                            debug!(target_url = %probe.describe(), healthy, ?last, "Health status changed");
                            last = Some(healthy);
                            yield healthy;
                        }
                    }
                    () = cancel_token.cancelled() => {
                        debug!(target_url = %probe.describe(), "Health monitor cancelled");
                        break;
                    }
                }
            }
        }
    }
}
