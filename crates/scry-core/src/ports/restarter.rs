//! Restart port used by the configuration-change coordinator.

use async_trait::async_trait;

use super::SupervisorError;

/// Something that can be stopped and started again as one operation.
#[async_trait]
pub trait ServiceRestarter: Send + Sync {
    /// Stop, settle, start. Resolves once the target passed its own
    /// readiness probe.
    async fn restart(&self) -> Result<(), SupervisorError>;

    /// Name used in logs.
    fn name(&self) -> String;
}
