//! Configuration-change coordinator.
//!
//! Watches the configuration artifact, debounces bursts of change events,
//! and on a genuine model change drives the apply protocol:
//!
//! ```text
//! Idle → Debouncing → Applying → WaitingReady → Notifying → Idle
//!                        ↑            │
//!                        └─ Failed ←──┘   (fixed delay, bounded attempts)
//! ```
//!
//! The coordinator is a single task fed by an unbounded signal channel (file
//! watcher and `trigger()` both feed it), so at most one apply runs at a
//! time and there is exactly one debounce timer.

mod barrier;
mod ledger;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use scry_core::ports::{AppEventEmitter, OperationsLedger, ServiceRestarter};
use scry_core::{
    AppEvent, ApplyOutcome, ConfigMutation, CoordinatorError, CoordinatorSettings,
    CoordinatorState, RetryDecision, RetryPolicy, read_operation_id,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use barrier::{BarrierError, BarrierReport, ReadinessBarrier};
pub use ledger::HttpLedger;
pub use watcher::{ArtifactWatcher, watch_artifact};

/// What one apply cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyReport {
    /// Nothing actionable: unreadable, empty, or same model as last applied.
    Skipped,
    /// Restart and barrier passed for this model.
    Applied { model_name: String },
    /// Every attempt failed; last-applied is unchanged.
    Failed(CoordinatorError),
}

/// Timing and retry parameters.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub artifact: PathBuf,
    pub debounce: Duration,
    pub apply_policy: RetryPolicy,
}

impl CoordinatorConfig {
    pub fn from_settings(artifact: PathBuf, settings: &CoordinatorSettings) -> Self {
        Self {
            artifact,
            debounce: settings.debounce(),
            apply_policy: settings.apply_policy(),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _watcher: Option<ArtifactWatcher>,
}

pub struct ConfigCoordinator {
    config: CoordinatorConfig,
    restarter: Arc<dyn ServiceRestarter>,
    barrier: ReadinessBarrier,
    ledger: Arc<dyn OperationsLedger>,
    emitter: Arc<dyn AppEventEmitter>,
    state_tx: watch::Sender<CoordinatorState>,
    last_applied: StdMutex<Option<String>>,
    signal_tx: mpsc::UnboundedSender<()>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    running: Mutex<Option<Running>>,
}

impl ConfigCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        restarter: Arc<dyn ServiceRestarter>,
        barrier: ReadinessBarrier,
        ledger: Arc<dyn OperationsLedger>,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(CoordinatorState::Idle);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            restarter,
            barrier,
            ledger,
            emitter,
            state_tx,
            last_applied: StdMutex::new(None),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            running: Mutex::new(None),
        })
    }

    pub fn artifact(&self) -> &Path {
        &self.config.artifact
    }

    /// Seed the last-applied model from the artifact, start watching it,
    /// and spawn the coordinator task.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(CoordinatorError::AlreadyRunning);
        }
        let Some(signals) = self.signal_rx.lock().await.take() else {
            return Err(CoordinatorError::AlreadyRunning);
        };

        if let Some(mutation) = self.read_mutation() {
            info!(model = %mutation.model_name, "Current configuration");
            *self.last_applied_guard() = Some(mutation.model_name);
        }

        let watcher = watch_artifact(&self.config.artifact, self.signal_tx.clone())?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).run(signals, cancel.clone()));
        info!(
            artifact = %self.config.artifact.display(),
            polling = watcher.is_polling(),
            "Configuration coordinator started"
        );

        *running = Some(Running {
            cancel,
            task,
            _watcher: Some(watcher),
        });
        Ok(())
    }

    /// Feed a change signal through the debounce path, as if the file had
    /// been written.
    pub fn trigger(&self) {
        if self.signal_tx.send(()).is_err() {
            debug!("Coordinator task is gone, trigger dropped");
        }
    }

    /// Stop watching and wait for the task to end.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            warn!(error = %e, "Coordinator task ended abnormally");
        }
        self.set_state(CoordinatorState::Idle);
        info!("Configuration coordinator stopped");
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    pub fn last_applied(&self) -> Option<String> {
        self.last_applied_guard().clone()
    }

    async fn run(self: Arc<Self>, mut signals: mpsc::UnboundedReceiver<()>, cancel: CancellationToken) {
        loop {
            let signal = tokio::select! {
                () = cancel.cancelled() => break,
                signal = signals.recv() => signal,
            };
            if signal.is_none() {
                break;
            }

            self.set_state(CoordinatorState::Debouncing);
            // every further signal inside the window restarts it
            loop {
                let next = tokio::select! {
                    () = cancel.cancelled() => return,
                    next = timeout(self.config.debounce, signals.recv()) => next,
                };
                match next {
                    Ok(Some(())) => {}
                    Ok(None) => return,
                    Err(_elapsed) => break,
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                report = self.apply_pending() => {
                    debug!(?report, "Apply cycle finished");
                }
            }
        }
    }

    /// Read the artifact and apply it if the model changed.
    pub async fn apply_pending(&self) -> ApplyReport {
        let report = self.apply_inner().await;
        self.set_state(CoordinatorState::Idle);
        report
    }

    async fn apply_inner(&self) -> ApplyReport {
        let Some(mutation) = self.read_mutation() else {
            return ApplyReport::Skipped;
        };
        if !mutation.differs_from(self.last_applied().as_deref()) {
            debug!(model = %mutation.model_name, hash = %mutation.content_hash, "Model unchanged, nothing to apply");
            return ApplyReport::Skipped;
        }

        info!(
            model = %mutation.model_name,
            operation_id = ?mutation.operation_id,
            "Applying model change"
        );

        let mut retry = self.config.apply_policy.start();
        let mut attempt = 1;
        let last_error = loop {
            match self.attempt(attempt).await {
                Ok(()) => return self.applied(mutation).await,
                Err(e) => {
                    warn!(attempt, error = %e, "Apply attempt failed");
                    match retry.record_failure() {
                        RetryDecision::RetryAfter { delay, .. } => {
                            self.set_state(CoordinatorState::Failed { attempt });
                            sleep(delay).await;
                            attempt += 1;
                        }
                        RetryDecision::Exhausted { .. } => break e,
                    }
                }
            }
        };

        let failure = CoordinatorError::ConfigApplyFailure {
            attempts: attempt,
            last_error: last_error.to_string(),
        };
        error!(model = %mutation.model_name, error = %failure, "Giving up on model change");

        // the artifact may have been rewritten while we were retrying
        let operation_id = std::fs::read_to_string(&self.config.artifact)
            .ok()
            .and_then(|contents| read_operation_id(&contents))
            .or(mutation.operation_id);
        if let Some(operation_id) = operation_id {
            self.notify(ApplyOutcome::failure(
                operation_id,
                format!("Failed to restart server after {attempt} attempts: {last_error}"),
            ))
            .await;
        }
        ApplyReport::Failed(failure)
    }

    /// One full restart-and-wait sequence.
    async fn attempt(&self, attempt: u32) -> Result<(), CoordinatorError> {
        self.set_state(CoordinatorState::Applying { attempt });
        self.restarter
            .restart()
            .await
            .map_err(|e| CoordinatorError::AttemptFailed {
                attempt,
                reason: e.to_string(),
            })?;

        self.set_state(CoordinatorState::WaitingReady { attempt });
        self.barrier
            .wait()
            .await
            .map(|_| ())
            .map_err(|e| CoordinatorError::AttemptFailed {
                attempt,
                reason: e.to_string(),
            })
    }

    async fn applied(&self, mutation: ConfigMutation) -> ApplyReport {
        info!(model = %mutation.model_name, restarter = %self.restarter.name(), "Model change applied");
        *self.last_applied_guard() = Some(mutation.model_name.clone());
        self.emitter.emit(AppEvent::ConfigApplied {
            model_name: mutation.model_name.clone(),
            operation_id: mutation.operation_id.clone(),
        });
        if let Some(operation_id) = mutation.operation_id {
            self.notify(ApplyOutcome::success(operation_id)).await;
        }
        ApplyReport::Applied {
            model_name: mutation.model_name,
        }
    }

    /// Best-effort; failures are logged only.
    async fn notify(&self, outcome: ApplyOutcome) {
        self.set_state(CoordinatorState::Notifying);
        match self.ledger.notify(outcome.clone()).await {
            Ok(()) => info!(
                operation_id = %outcome.operation_id,
                success = outcome.success,
                "Reported outcome to operations ledger"
            ),
            Err(e) => warn!(
                operation_id = %outcome.operation_id,
                error = %e,
                "Failed to report outcome to operations ledger"
            ),
        }
    }

    fn read_mutation(&self) -> Option<ConfigMutation> {
        let contents = match std::fs::read_to_string(&self.config.artifact) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(artifact = %self.config.artifact.display(), error = %e, "Artifact unreadable");
                return None;
            }
        };
        ConfigMutation::parse(&contents)
            .inspect_err(|e| debug!(error = %e, "No actionable configuration"))
            .ok()
    }

    fn set_state(&self, state: CoordinatorState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Coordinator state change");
            self.emitter
                .emit(AppEvent::CoordinatorStateChanged { state });
        }
    }

    fn last_applied_guard(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
