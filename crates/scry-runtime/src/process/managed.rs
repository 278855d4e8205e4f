//! Supervised child process with readiness gating and bounded auto-restart.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ─start→ Starting ─ready→ Running ─exit≠0→ Crashed ─→ Restarting ─timer→ Starting
//!                     │                                 └─budget spent→ Failed
//!                     └─timeout / early exit → (same crash path)
//! ```
//!
//! One OS process at most per supervisor. `start`, `stop` and `restart` are
//! serialized by an operation lock; concurrent `start` callers share one
//! in-flight start. Each spawned child is owned by an exit-watcher task that
//! either observes a natural exit or performs a requested shutdown, so exit
//! handling runs exactly once per child.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use futures_util::{FutureExt, StreamExt};
use scry_core::ports::{AppEventEmitter, ServerLogSinkPort, ServiceRestarter};
use scry_core::{AppEvent, ProcessInfo, ProcessState, RetryDecision, RetryState, SupervisorError};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ports::is_port_available;
use super::shutdown::shutdown_child;
use super::spec::ProcessSpec;
use super::stream::{LineTargets, spawn_stream_reader};
use crate::health_monitor::HealthMonitor;

type StartResult = Result<ProcessInfo, SupervisorError>;
type StartFuture = Shared<BoxFuture<'static, StartResult>>;
type StopAck = oneshot::Sender<Result<(), SupervisorError>>;

/// Handle to one supervised executable. Cheap to clone.
#[derive(Clone)]
pub struct ManagedProcess {
    inner: Arc<Inner>,
}

struct Inner {
    spec: ProcessSpec,
    name: Arc<str>,
    emitter: Arc<dyn AppEventEmitter>,
    log_sink: Option<Arc<dyn ServerLogSinkPort>>,
    /// Serializes start/stop/restart.
    op_lock: Mutex<()>,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<ProcessState>,
}

struct Slot {
    state: ProcessState,
    /// Bumped on every spawn; exit reports from older children are ignored.
    generation: u64,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    ready_at: Option<Instant>,
    retry: RetryState,
    pending_start: Option<StartFuture>,
    start_cancel: Option<CancellationToken>,
    /// Asks the exit watcher to shut the current child down.
    stop_tx: Option<oneshot::Sender<StopAck>>,
    restart_timer: Option<CancellationToken>,
    health_cancel: Option<CancellationToken>,
}

impl ManagedProcess {
    pub fn new(
        spec: ProcessSpec,
        emitter: Arc<dyn AppEventEmitter>,
        log_sink: Option<Arc<dyn ServerLogSinkPort>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ProcessState::Stopped);
        let slot = Slot {
            state: ProcessState::Stopped,
            generation: 0,
            pid: None,
            started_at: None,
            ready_at: None,
            retry: spec.restart_policy.start(),
            pending_start: None,
            start_cancel: None,
            stop_tx: None,
            restart_timer: None,
            health_cancel: None,
        };
        Self {
            inner: Arc::new(Inner {
                name: Arc::from(spec.name.as_str()),
                spec,
                emitter,
                log_sink,
                op_lock: Mutex::new(()),
                slot: Mutex::new(slot),
                state_tx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.inner.spec
    }

    /// Spawn the child and wait until its readiness probe passes.
    ///
    /// Returns the current info without spawning when already running, and
    /// joins the in-flight start when one exists. Starting from `Failed`
    /// clears the crash budget.
    pub async fn start(&self) -> StartResult {
        let start = {
            let _op = self.inner.op_lock.lock().await;
            self.inner.begin_start().await
        };
        start.await
    }

    /// Stop the child (SIGTERM, then SIGKILL after the grace period).
    ///
    /// Cancels a pending restart and aborts an in-flight start. A no-op when
    /// nothing is running.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let _op = self.inner.op_lock.lock().await;
        self.inner.stop_locked().await
    }

    /// Stop, wait for the settle delay, start again. Clears the crash budget.
    pub async fn restart(&self) -> StartResult {
        let start = {
            let _op = self.inner.op_lock.lock().await;
            info!(name = %self.inner.name, "Restarting process");
            self.inner.stop_locked().await?;
            self.inner.slot.lock().await.retry.reset();
            sleep(self.inner.spec.settle_delay).await;
            self.inner.begin_start().await
        };
        start.await
    }

    pub async fn info(&self) -> ProcessInfo {
        let slot = self.inner.slot.lock().await;
        self.inner.snapshot(&slot)
    }

    pub async fn state(&self) -> ProcessState {
        self.inner.slot.lock().await.state
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.inner.state_tx.subscribe()
    }

    /// One-shot run of the readiness probe.
    pub async fn probe(&self) -> bool {
        self.inner.spec.readiness.check().await
    }
}

#[async_trait]
impl ServiceRestarter for ManagedProcess {
    async fn restart(&self) -> Result<(), SupervisorError> {
        Self::restart(self).await.map(|_| ())
    }

    fn name(&self) -> String {
        self.inner.name.to_string()
    }
}

impl Inner {
    fn set_state(&self, slot: &mut Slot, state: ProcessState) {
        if slot.state == state {
            return;
        }
        debug!(name = %self.name, from = %slot.state, to = %state, "Process state change");
        slot.state = state;
        self.state_tx.send_replace(state);
        self.emitter.emit(AppEvent::ProcessStateChanged {
            name: self.name.to_string(),
            state,
        });
    }

    fn snapshot(&self, slot: &Slot) -> ProcessInfo {
        ProcessInfo {
            name: self.name.to_string(),
            state: slot.state,
            pid: slot.pid,
            restart_count: slot.retry.failures(),
            max_restarts: self.spec.restart_policy.max_attempts,
            started_at: slot.started_at,
        }
    }

    /// Create or join the in-flight start. Caller holds `op_lock`.
    ///
    /// Returns a boxed future so the restart timer can call back into it.
    fn begin_start(self: &Arc<Self>) -> BoxFuture<'static, StartFuture> {
        let inner = Arc::clone(self);
        async move {
            let mut slot = inner.slot.lock().await;
            if let Some(pending) = &slot.pending_start {
                return pending.clone();
            }
            if slot.state == ProcessState::Running {
                let info = inner.snapshot(&slot);
                return futures_util::future::ready(Ok(info)).boxed().shared();
            }

            if let Some(timer) = slot.restart_timer.take() {
                timer.cancel();
            }
            if slot.state == ProcessState::Failed {
                slot.retry.reset();
            }

            let cancel = CancellationToken::new();
            slot.start_cancel = Some(cancel.clone());
            inner.set_state(&mut slot, ProcessState::Starting);

            let handle = tokio::spawn(Arc::clone(&inner).run_start(cancel));
            let name = Arc::clone(&inner.name);
            let start = async move {
                handle.await.unwrap_or_else(|e| {
                    Err(SupervisorError::Internal(format!("start task for {name} failed: {e}")))
                })
            }
            .boxed()
            .shared();
            slot.pending_start = Some(start.clone());
            start
        }
        .boxed()
    }

    async fn run_start(self: Arc<Self>, cancel: CancellationToken) -> StartResult {
        let mut early_exit = match self.launch().await {
            Ok(early_exit) => early_exit,
            Err(e) => {
                let mut slot = self.slot.lock().await;
                slot.pending_start = None;
                slot.start_cancel = None;
                self.on_start_failure(&mut slot, &e);
                return Err(e);
            }
        };

        let waited = self.wait_ready(&cancel, &mut early_exit).await;
        if matches!(
            waited,
            Err(SupervisorError::StartupTimeout { .. } | SupervisorError::Aborted(_))
        ) && let Some(Err(e)) = self.terminate_current().await
        {
            warn!(name = %self.name, error = %e, "Failed to stop child after aborted start");
        }

        let mut slot = self.slot.lock().await;
        slot.pending_start = None;
        slot.start_cancel = None;

        let result = match waited {
            Ok(()) => match early_exit.try_recv() {
                // exited between the last probe and now
                Ok(code) => Err(self.crash_exit(code)),
                Err(oneshot::error::TryRecvError::Closed) => Err(self.crash_exit(None)),
                Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                slot.ready_at = Some(Instant::now());
                self.set_state(&mut slot, ProcessState::Running);
                info!(name = %self.name, pid = ?slot.pid, "Process is ready");
                self.emitter.emit(AppEvent::ProcessReady {
                    name: self.name.to_string(),
                    pid: slot.pid,
                });
                self.spawn_health_poll(&mut slot);
                Ok(self.snapshot(&slot))
            }
            Err(e) => {
                slot.pid = None;
                slot.stop_tx = None;
                self.on_start_failure(&mut slot, &e);
                Err(e)
            }
        }
    }

    fn crash_exit(&self, code: Option<i32>) -> SupervisorError {
        SupervisorError::CrashExit {
            name: self.name.to_string(),
            code,
        }
    }

    /// Validate, pre-flight the port, spawn, and hand the child to its watcher.
    async fn launch(self: &Arc<Self>) -> Result<oneshot::Receiver<Option<i32>>, SupervisorError> {
        validate(&self.spec)?;

        if let Some((host, port)) = &self.spec.exclusive_port
            && !is_port_available(host, *port)
        {
            warn!(name = %self.name, port = %port, "Port is occupied, refusing to start");
            return Err(SupervisorError::PortInUse(*port));
        }

        let mut command = Command::new(&self.spec.executable);
        command
            .args(&self.spec.args)
            .envs(self.spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| self.spawn_error(&e))?;
        let pid = child.id();
        self.attach_log_readers(&mut child);

        let (early_tx, early_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let generation = {
            let mut slot = self.slot.lock().await;
            slot.generation += 1;
            slot.pid = pid;
            slot.started_at = Some(Utc::now());
            slot.ready_at = None;
            slot.stop_tx = Some(stop_tx);
            slot.generation
        };

        info!(
            name = %self.name,
            pid = ?pid,
            executable = %self.spec.executable.display(),
            "Spawned process"
        );
        tokio::spawn(Arc::clone(self).watch_child(child, generation, stop_rx, early_tx));
        Ok(early_rx)
    }

    fn spawn_error(&self, e: &io::Error) -> SupervisorError {
        if e.kind() == io::ErrorKind::NotFound {
            SupervisorError::InvalidExecutable(format!(
                "{} not found",
                self.spec.executable.display()
            ))
        } else {
            SupervisorError::SpawnFailed {
                name: self.name.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn attach_log_readers(&self, child: &mut Child) {
        let sink = self.log_sink.clone();
        if let Some(stdout) = child.stdout.take() {
            let targets = LineTargets {
                sink: sink.clone(),
                forward_as_error: None,
            };
            spawn_stream_reader(stdout, Arc::clone(&self.name), "stdout", targets);
        }
        if let Some(stderr) = child.stderr.take() {
            let targets = LineTargets {
                sink,
                forward_as_error: self
                    .spec
                    .forward_stderr
                    .then(|| Arc::clone(&self.emitter)),
            };
            spawn_stream_reader(stderr, Arc::clone(&self.name), "stderr", targets);
        }
    }

    /// Poll readiness until it passes, the child exits, the start is
    /// cancelled, or the startup timeout elapses.
    async fn wait_ready(
        &self,
        cancel: &CancellationToken,
        early_exit: &mut oneshot::Receiver<Option<i32>>,
    ) -> Result<(), SupervisorError> {
        let probe = Arc::clone(&self.spec.readiness);
        let interval = self.spec.readiness_interval;
        let poll = async move {
            loop {
                if probe.check().await {
                    break;
                }
                sleep(interval).await;
            }
        };

        tokio::select! {
            () = cancel.cancelled() => Err(SupervisorError::Aborted(self.name.to_string())),
            code = early_exit => Err(self.crash_exit(code.unwrap_or(None))),
            () = poll => Ok(()),
            () = sleep(self.spec.startup_timeout) => {
                warn!(
                    name = %self.name,
                    timeout_ms = duration_ms(self.spec.startup_timeout),
                    probe = %self.spec.readiness.describe(),
                    "Readiness probe never passed"
                );
                Err(SupervisorError::StartupTimeout {
                    name: self.name.to_string(),
                    timeout_ms: duration_ms(self.spec.startup_timeout),
                })
            }
        }
    }

    /// Ask the watcher to shut the current child down and wait for it.
    async fn terminate_current(&self) -> Option<Result<(), SupervisorError>> {
        let ack = {
            let mut slot = self.slot.lock().await;
            request_stop(&mut slot)
        }?;
        // a dropped ack means the child exited on its own before the request landed
        Some(ack.await.unwrap_or_else(|_| {
            debug!(name = %self.name, "Child exited before the stop request was handled");
            Ok(())
        }))
    }

    async fn watch_child(
        self: Arc<Self>,
        mut child: Child,
        generation: u64,
        stop_rx: oneshot::Receiver<StopAck>,
        early_exit: oneshot::Sender<Option<i32>>,
    ) {
        enum Exit {
            Natural(io::Result<ExitStatus>),
            Requested(Option<StopAck>),
        }

        let exit = tokio::select! {
            status = child.wait() => Exit::Natural(status),
            request = stop_rx => Exit::Requested(request.ok()),
        };

        match exit {
            Exit::Requested(ack) => {
                let result = match shutdown_child(&mut child, self.spec.shutdown_grace).await {
                    Ok(status) => {
                        info!(name = %self.name, %status, "Process stopped");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(name = %self.name, error = %e, "Failed to stop process");
                        Err(SupervisorError::StopFailed {
                            name: self.name.to_string(),
                            reason: e.to_string(),
                        })
                    }
                };
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            Exit::Natural(status) => {
                let code = match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(name = %self.name, error = %e, "Failed to wait on process");
                        None
                    }
                };
                self.on_exit(generation, code, early_exit).await;
            }
        }
    }

    async fn on_exit(
        self: &Arc<Self>,
        generation: u64,
        code: Option<i32>,
        early_exit: oneshot::Sender<Option<i32>>,
    ) {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation {
            debug!(name = %self.name, generation, "Ignoring exit of a replaced child");
            return;
        }
        slot.pid = None;
        slot.stop_tx = None;
        if let Some(token) = slot.health_cancel.take() {
            token.cancel();
        }

        match slot.state {
            // the start path owns failures until the child is ready
            ProcessState::Starting => {
                let _ = early_exit.send(code);
            }
            ProcessState::Running if matches!(code, None | Some(0)) => {
                info!(name = %self.name, ?code, "Process exited");
                slot.ready_at = None;
                self.set_state(&mut slot, ProcessState::Stopped);
            }
            ProcessState::Running => {
                warn!(name = %self.name, ?code, "Process crashed");
                self.record_crash(&mut slot, code);
            }
            state => {
                debug!(name = %self.name, %state, ?code, "Process exited outside a run");
            }
        }
    }

    fn on_start_failure(self: &Arc<Self>, slot: &mut Slot, err: &SupervisorError) {
        match err {
            // stop() owns the state
            SupervisorError::Aborted(_) => {
                debug!(name = %self.name, "Start aborted");
            }
            SupervisorError::CrashExit { code, .. } => {
                warn!(name = %self.name, error = %err, "Start failed");
                self.record_crash(slot, *code);
            }
            e if e.is_retryable() => {
                warn!(name = %self.name, error = %e, "Start failed");
                self.record_crash(slot, None);
            }
            e => {
                error!(name = %self.name, error = %e, "Start failed, not retrying");
                self.set_state(slot, ProcessState::Stopped);
            }
        }
    }

    fn record_crash(self: &Arc<Self>, slot: &mut Slot, exit_code: Option<i32>) {
        if slot
            .ready_at
            .is_some_and(|ready| ready.elapsed() >= self.spec.stability_window)
        {
            debug!(name = %self.name, "Run outlived the stability window, clearing crash count");
            slot.retry.reset();
        }
        slot.ready_at = None;
        self.set_state(slot, ProcessState::Crashed);

        let decision = slot.retry.record_failure();
        self.emitter.emit(AppEvent::ProcessCrashed {
            name: self.name.to_string(),
            exit_code,
            restart_count: slot.retry.failures(),
        });

        match decision {
            RetryDecision::RetryAfter { attempt, delay } => {
                self.schedule_restart(slot, attempt, delay);
            }
            RetryDecision::Exhausted { failures } => {
                error!(name = %self.name, failures, "Restart budget exhausted");
                self.set_state(slot, ProcessState::Failed);
                self.emitter.emit(AppEvent::CriticalError {
                    source: self.name.to_string(),
                    message: format!(
                        "{} failed to start after {failures} attempts. Please check the server logs.",
                        self.name
                    ),
                });
            }
        }
    }

    fn schedule_restart(self: &Arc<Self>, slot: &mut Slot, attempt: u32, delay: Duration) {
        if let Some(old) = slot.restart_timer.take() {
            old.cancel();
        }
        let token = CancellationToken::new();
        slot.restart_timer = Some(token.clone());
        self.set_state(slot, ProcessState::Restarting);

        info!(name = %self.name, attempt, ?delay, "Scheduling restart");
        self.emitter.emit(AppEvent::RestartScheduled {
            name: self.name.to_string(),
            attempt,
            delay_ms: duration_ms(delay),
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = sleep(delay) => {}
            }

            let start = {
                let _op = inner.op_lock.lock().await;
                if token.is_cancelled() {
                    return;
                }
                {
                    let mut slot = inner.slot.lock().await;
                    if slot.state != ProcessState::Restarting {
                        return;
                    }
                    slot.restart_timer = None;
                }
                inner.begin_start().await
            };
            if let Err(e) = start.await {
                debug!(name = %inner.name, error = %e, "Automatic restart failed");
            }
        });
    }

    fn spawn_health_poll(&self, slot: &mut Slot) {
        let Some(period) = self.spec.health_poll else {
            return;
        };
        let token = CancellationToken::new();
        if let Some(old) = slot.health_cancel.replace(token.clone()) {
            old.cancel();
        }

        let monitor = HealthMonitor::new(Arc::clone(&self.spec.readiness), period, token);
        let emitter = Arc::clone(&self.emitter);
        let name = Arc::clone(&self.name);
        tokio::spawn(async move {
            let mut changes = Box::pin(monitor.monitor());
            while let Some(healthy) = changes.next().await {
                if healthy {
                    info!(name = %name, "Health check passing");
                } else {
                    warn!(name = %name, "Health check failing");
                }
                emitter.emit(AppEvent::ServiceHealthChanged {
                    name: name.to_string(),
                    healthy,
                });
            }
        });
    }

    /// Caller holds `op_lock`.
    async fn stop_locked(self: &Arc<Self>) -> Result<(), SupervisorError> {
        let pending = {
            let mut slot = self.slot.lock().await;
            cancel_timers(&mut slot);
            if let Some(cancel) = &slot.start_cancel {
                cancel.cancel();
            }
            slot.pending_start.clone()
        };
        if let Some(pending) = pending {
            // settles as Aborted, or with whatever won the race
            let _ = pending.await;
        }

        let stopped = self.terminate_current().await;
        let had_child = stopped.is_some();

        let mut slot = self.slot.lock().await;
        cancel_timers(&mut slot);
        slot.pid = None;
        slot.ready_at = None;
        if had_child || !matches!(slot.state, ProcessState::Stopped | ProcessState::Failed) {
            self.set_state(&mut slot, ProcessState::Stopped);
        }
        stopped.unwrap_or(Ok(()))
    }
}

fn request_stop(slot: &mut Slot) -> Option<oneshot::Receiver<Result<(), SupervisorError>>> {
    let stop_tx = slot.stop_tx.take()?;
    let (ack_tx, ack_rx) = oneshot::channel();
    stop_tx.send(ack_tx).ok()?;
    Some(ack_rx)
}

fn cancel_timers(slot: &mut Slot) {
    if let Some(timer) = slot.restart_timer.take() {
        timer.cancel();
    }
    if let Some(health) = slot.health_cancel.take() {
        health.cancel();
    }
}

fn validate(spec: &ProcessSpec) -> Result<(), SupervisorError> {
    let exe = &spec.executable;
    // bare command names are resolved through PATH at spawn time
    if exe.components().count() > 1 && !exe.exists() {
        return Err(SupervisorError::InvalidExecutable(format!(
            "{} does not exist",
            exe.display()
        )));
    }
    if let Some(dir) = &spec.working_dir
        && !dir.is_dir()
    {
        return Err(SupervisorError::InvalidExecutable(format!(
            "working directory {} does not exist",
            dir.display()
        )));
    }
    Ok(())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::NoopEmitter;
    use scry_core::ports::ReadinessProbe;

    struct NeverReady;

    #[async_trait]
    impl ReadinessProbe for NeverReady {
        async fn check(&self) -> bool {
            false
        }

        fn describe(&self) -> String {
            "never".to_string()
        }
    }

    fn process(spec: ProcessSpec) -> ManagedProcess {
        ManagedProcess::new(spec, Arc::new(NoopEmitter), None)
    }

    #[tokio::test]
    async fn missing_executable_is_rejected_before_spawn() {
        let spec = ProcessSpec::new("ghost", "/definitely/not/here", Arc::new(NeverReady));
        let proc = process(spec);

        let err = proc.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidExecutable(_)));
        assert_eq!(proc.state().await, ProcessState::Stopped);
        assert_eq!(proc.info().await.restart_count, 0);
    }

    #[tokio::test]
    async fn missing_working_dir_is_rejected() {
        let spec = ProcessSpec::new("sh", "sh", Arc::new(NeverReady))
            .with_working_dir("/definitely/not/a/dir");
        let err = process(spec).start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidExecutable(msg) if msg.contains("working directory")));
    }

    #[tokio::test]
    async fn occupied_port_aborts_start() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let spec = ProcessSpec::new("svc", "sh", Arc::new(NeverReady))
            .with_args(["-c", "sleep 30"])
            .with_exclusive_port("127.0.0.1", port);
        let proc = process(spec);

        assert_eq!(proc.start().await.unwrap_err(), SupervisorError::PortInUse(port));
        assert_eq!(proc.state().await, ProcessState::Stopped);
        assert!(proc.info().await.pid.is_none());
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_noop() {
        let spec = ProcessSpec::new("idle", "sh", Arc::new(NeverReady));
        let proc = process(spec);
        let mut states = proc.subscribe_state();

        proc.stop().await.unwrap();
        assert_eq!(proc.state().await, ProcessState::Stopped);
        assert!(!states.has_changed().unwrap());
    }

    #[tokio::test]
    async fn stop_racing_a_natural_exit_succeeds() {
        let proc = process(ProcessSpec::new("racy", "sh", Arc::new(NeverReady)));
        let (stop_tx, stop_rx) = oneshot::channel::<StopAck>();
        proc.inner.slot.lock().await.stop_tx = Some(stop_tx);
        // the watcher took the request but the child was already gone
        tokio::spawn(async move {
            drop(stop_rx.await);
        });

        let result = proc.inner.terminate_current().await;
        assert_eq!(result, Some(Ok(())));
    }

    #[test]
    fn bare_command_names_skip_the_existence_check() {
        let spec = ProcessSpec::new("py", "python3", Arc::new(NeverReady));
        assert!(validate(&spec).is_ok());
        let spec = ProcessSpec::new("py", "./missing.sh", Arc::new(NeverReady));
        assert!(validate(&spec).is_err());
    }
}
