//! Operations ledger port.

use async_trait::async_trait;

use super::LedgerError;
use crate::domain::ApplyOutcome;

/// External record of configuration-triggered restart outcomes.
#[async_trait]
pub trait OperationsLedger: Send + Sync {
    /// Report one outcome. Callers treat failures as log-only.
    async fn notify(&self, outcome: ApplyOutcome) -> Result<(), LedgerError>;
}
