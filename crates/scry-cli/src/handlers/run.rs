//! Run command handler.
//!
//! Starts the registry services and the inference process, keeps the socket
//! connected across inference restarts, runs the coordinator, and bridges
//! stdin/stdout until Ctrl-C or end of input.

use std::io::Write;

use anyhow::Result;
use scry_core::{AppEvent, CONTROL_SERVICE_ID, TRANSFER_SERVICE_ID};
use scry_runtime::{PromptPhase, SocketClient, next_event};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::input::{HELP, Input, parse_input};
use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Lines of captured output shown by `/logs`.
const LOG_TAIL: usize = 50;

pub async fn execute(ctx: &CliContext, start_services: bool) -> Result<()> {
    let printer = spawn_printer(ctx.events.subscribe());
    let reconnector = spawn_reconnector(
        ctx.events.subscribe(),
        ctx.socket.clone(),
        ctx.inference.name().to_string(),
    );

    if start_services {
        start_registry_services(ctx).await;
    }

    // the reconnector connects the socket once the process reports ready
    if let Err(e) = ctx.inference.start().await {
        if e.is_retryable() {
            warn!(error = %e, "Inference did not start, automatic restart pending");
        } else {
            error!(error = %e, "Inference cannot start");
            shutdown(ctx).await;
            printer.abort();
            reconnector.abort();
            return Err(CliError::Process(e.to_string()).into());
        }
    }

    if let Some(coordinator) = &ctx.coordinator
        && let Err(e) = coordinator.start().await
    {
        error!(error = %e, "Configuration watch unavailable");
    }

    let result = input_loop(ctx).await;

    shutdown(ctx).await;
    printer.abort();
    reconnector.abort();
    result
}

async fn start_registry_services(ctx: &CliContext) {
    let services = [
        (CONTROL_SERVICE_ID, &ctx.settings.control),
        (TRANSFER_SERVICE_ID, &ctx.settings.transfer),
    ];
    for (id, settings) in services {
        if !settings.enabled {
            debug!(id, "Service disabled");
            continue;
        }
        match ctx.registry.create(id, settings).await {
            Ok(handle) => info!(id, url = %handle.url(), "Service running"),
            Err(e) => error!(id, error = %e, "Service failed to start"),
        }
    }
}

async fn input_loop(ctx: &CliContext) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted, shutting down");
                return Ok(());
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("End of input, shutting down");
            return Ok(());
        };
        if let Some(input) = parse_input(&line) {
            handle_input(ctx, input).await;
        }
    }
}

async fn handle_input(ctx: &CliContext, input: Input) {
    match input {
        Input::Prompt(payload) => match ctx.socket.send_prompt(payload).await {
            Some(prompt_id) => print_json(&json!({"type": "prompt_sent", "promptId": prompt_id})),
            None => print_json(&json!({
                "type": "prompt_rejected",
                "error": "Failed to send prompt: not connected",
            })),
        },
        Input::Cancel(Some(prompt_id)) => {
            if !ctx.socket.cancel_prompt(&prompt_id).await {
                warn!(%prompt_id, "Cancel not sent, socket not connected");
            }
        }
        Input::Cancel(None) => {
            for prompt_id in ctx.socket.in_flight() {
                ctx.socket.cancel_prompt(&prompt_id).await;
            }
        }
        Input::Clear => {
            if !ctx.socket.clear_memory().await {
                warn!("Clear not sent, socket not connected");
            }
        }
        Input::Restart => match ctx.inference.restart().await {
            Ok(info) => print_json(&json!({"type": "restarted", "process": info})),
            Err(e) => error!(error = %e, "Manual restart failed"),
        },
        Input::Status => print_json(&status_snapshot(ctx).await),
        Input::Logs(source) => {
            for entry in ctx.logs.recent(&source, LOG_TAIL) {
                print_json(&json!({
                    "type": "log",
                    "source": source,
                    "stream": entry.stream,
                    "timestamp": entry.timestamp,
                    "line": entry.line,
                }));
            }
        }
        Input::Unknown(line) => warn!(input = %line, "{HELP}"),
    }
}

async fn status_snapshot(ctx: &CliContext) -> Value {
    let mut services = Vec::new();
    for id in ctx.registry.ids().await {
        match ctx.registry.get_status(&id).await {
            Ok(report) => services.push(json!(report)),
            Err(e) => debug!(id = %id, error = %e, "Service vanished"),
        }
    }
    json!({
        "type": "status",
        "inference": ctx.inference.info().await,
        "socket": ctx.socket.state(),
        "inFlight": in_flight(&ctx.socket),
        "coordinator": ctx.coordinator.as_ref().map(|c| c.state()),
        "lastAppliedModel": ctx.coordinator.as_ref().and_then(|c| c.last_applied()),
        "services": services,
    })
}

fn in_flight(socket: &SocketClient) -> Vec<Value> {
    socket
        .in_flight()
        .into_iter()
        .map(|prompt_id| {
            let streaming = socket.prompt_phase(&prompt_id) == Some(PromptPhase::Streaming);
            json!({"promptId": prompt_id, "streaming": streaming})
        })
        .collect()
}

/// Shut down in dependency order: stop watching, close the socket, then
/// stop the processes.
async fn shutdown(ctx: &CliContext) {
    if let Some(coordinator) = &ctx.coordinator {
        coordinator.shutdown().await;
    }
    ctx.socket.disconnect().await;
    if let Err(e) = ctx.inference.stop().await {
        warn!(error = %e, "Inference did not stop cleanly");
    }
    ctx.registry.shutdown().await;
}

fn print_json(value: &Value) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{value}") {
        debug!(error = %e, "stdout closed");
    }
}

fn spawn_printer(mut events: broadcast::Receiver<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            match serde_json::to_value(&event) {
                Ok(value) => print_json(&value),
                Err(e) => warn!(error = %e, "Unserializable event"),
            }
        }
    })
}

/// Connect the socket every time the inference process becomes ready.
fn spawn_reconnector(
    mut events: broadcast::Receiver<AppEvent>,
    socket: SocketClient,
    inference: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            if let AppEvent::ProcessReady { name, .. } = event
                && name == inference
                && let Err(e) = socket.connect().await
            {
                debug!(error = %e, "Socket connect after ready failed, retry scheduled");
            }
        }
    })
}
