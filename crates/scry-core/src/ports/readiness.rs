//! Readiness probe port.

use async_trait::async_trait;

/// A single-shot readiness check (HTTP `/health`, raw TCP connect, ...).
///
/// Implementations must bound their own latency; callers poll them in a loop.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// `true` if the target answered as ready.
    async fn check(&self) -> bool;

    /// Target description for logs, e.g. `http://127.0.0.1:8001/health`.
    fn describe(&self) -> String;
}
