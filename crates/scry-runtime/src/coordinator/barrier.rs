//! Compound readiness check run after a configuration-triggered restart.
//!
//! The HTTP control service must report healthy within the polling window;
//! the inference socket port is polled with the same bound but only logged
//! when it never opens.

use std::sync::Arc;
use std::time::Duration;

use scry_core::CoordinatorSettings;
use scry_core::ports::ReadinessProbe;
use thiserror::Error;
use tracing::{info, warn};

use crate::health::{HttpProbe, TcpProbe, poll_until_ready};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarrierError {
    #[error("{target} did not report healthy after {attempts} attempts (timed out)")]
    HealthTimeout { target: String, attempts: u32 },
}

/// What the barrier observed on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierReport {
    pub socket_reachable: bool,
}

pub struct ReadinessBarrier {
    health: Arc<dyn ReadinessProbe>,
    socket: Arc<dyn ReadinessProbe>,
    attempts: u32,
    interval: Duration,
}

impl ReadinessBarrier {
    pub fn new(
        health: Arc<dyn ReadinessProbe>,
        socket: Arc<dyn ReadinessProbe>,
        attempts: u32,
        interval: Duration,
    ) -> Self {
        Self {
            health,
            socket,
            attempts,
            interval,
        }
    }

    /// `GET {control_url}/health` plus a TCP connect to the socket port.
    pub fn from_settings(
        control_url: &str,
        socket_host: &str,
        socket_port: u16,
        settings: &CoordinatorSettings,
    ) -> Self {
        let health = HttpProbe::new(format!("{}/health", control_url.trim_end_matches('/')));
        let socket = TcpProbe::new(socket_host, socket_port)
            .with_connect_timeout(Duration::from_millis(settings.port_probe_timeout_ms));
        Self::new(
            Arc::new(health),
            Arc::new(socket),
            settings.readiness_attempts,
            Duration::from_millis(settings.readiness_interval_ms),
        )
    }

    pub async fn wait(&self) -> Result<BarrierReport, BarrierError> {
        if !poll_until_ready(self.health.as_ref(), self.attempts, self.interval).await {
            return Err(BarrierError::HealthTimeout {
                target: self.health.describe(),
                attempts: self.attempts,
            });
        }
        info!(target_url = %self.health.describe(), "Control service healthy");

        let socket_reachable =
            poll_until_ready(self.socket.as_ref(), self.attempts, self.interval).await;
        if socket_reachable {
            info!(target_url = %self.socket.describe(), "Inference socket reachable");
        } else {
            warn!(
                target_url = %self.socket.describe(),
                attempts = self.attempts,
                "Inference socket never became reachable, continuing anyway"
            );
        }
        Ok(BarrierReport { socket_reachable })
    }
}
