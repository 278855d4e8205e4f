//! Reconnecting client for the inference message socket.
//!
//! One live connection at most. Each session gets a generation number and a
//! cancellation token; tearing a session down cancels its reader and writer
//! tasks, and close reports from an older generation are ignored. A dropped
//! connection schedules exactly one reconnect after a fixed delay, and keeps
//! doing so until `disconnect()` is called.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use scry_core::ports::AppEventEmitter;
use scry_core::{
    AppEvent, ConnectionState, Decoded, InboundMessage, OutboundMessage, PromptId, SocketError,
};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tracker::{PromptPhase, PromptTracker};

/// Handle to the socket client. Cheap to clone.
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    reconnect_delay: Duration,
    emitter: Arc<dyn AppEventEmitter>,
    conn: Mutex<Conn>,
    tracker: StdMutex<PromptTracker>,
    state_tx: watch::Sender<ConnectionState>,
}

struct Conn {
    state: ConnectionState,
    generation: u64,
    writer: Option<mpsc::UnboundedSender<Message>>,
    session: Option<CancellationToken>,
    reconnect_timer: Option<CancellationToken>,
    /// Set by `disconnect()`; suppresses reconnects.
    closed: bool,
}

impl SocketClient {
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                reconnect_delay,
                emitter,
                conn: Mutex::new(Conn {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    writer: None,
                    session: None,
                    reconnect_timer: None,
                    closed: false,
                }),
                tracker: StdMutex::new(PromptTracker::new()),
                state_tx,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Open the connection.
    ///
    /// Ignored while another attempt is in flight. An existing connection is
    /// torn down first. A failed attempt emits a connection error and
    /// schedules a reconnect before returning the error.
    pub async fn connect(&self) -> Result<(), SocketError> {
        self.inner.connect().await
    }

    /// Close the connection and stop reconnecting.
    pub async fn disconnect(&self) {
        let mut conn = self.inner.conn.lock().await;
        conn.closed = true;
        if let Some(timer) = conn.reconnect_timer.take() {
            timer.cancel();
        }
        conn.generation += 1;
        let was = conn.state;
        self.inner.end_session(&mut conn);
        if was != ConnectionState::Disconnected {
            info!(url = %self.inner.url, "Socket disconnected");
            self.inner.emitter.emit(AppEvent::Disconnected);
        }
    }

    /// Send a prompt payload (a JSON object). Returns the correlation id, or
    /// `None` without sending when not connected or the payload is not an
    /// object.
    pub async fn send_prompt(&self, payload: Value) -> Option<PromptId> {
        let conn = self.inner.conn.lock().await;
        let writer = match (&conn.state, &conn.writer) {
            (ConnectionState::Connected, Some(writer)) => writer,
            _ => {
                debug!("Prompt rejected, socket not connected");
                return None;
            }
        };

        let prompt_id = PromptId::generate();
        let Some(message) = OutboundMessage::prompt(payload, prompt_id.clone()) else {
            warn!("Prompt payload must be a JSON object");
            return None;
        };

        self.inner.tracker().begin(prompt_id.clone());
        if let Err(e) = writer.send(Message::Text(message.encode())) {
            let e = SocketError::Send(e.to_string());
            debug!(%prompt_id, error = %e, "Writer closed before prompt was sent");
            self.inner.tracker().abandon(&prompt_id);
            return None;
        }
        debug!(%prompt_id, "Prompt sent");
        Some(prompt_id)
    }

    /// Ask the server to stop generating. Returns whether a frame was sent.
    pub async fn cancel_prompt(&self, prompt_id: &PromptId) -> bool {
        let wire_id = self.inner.tracker().wire_id(prompt_id);
        self.inner
            .fire(OutboundMessage::Cancel { prompt_id: wire_id })
            .await
    }

    /// Ask the server to drop its conversation memory.
    pub async fn clear_memory(&self) -> bool {
        self.inner.fire(OutboundMessage::ClearMemory).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Client ids of prompts still awaiting a terminal frame.
    pub fn in_flight(&self) -> Vec<PromptId> {
        self.inner.tracker().in_flight()
    }

    /// Where an in-flight prompt is; `None` once it has finished.
    pub fn prompt_phase(&self, prompt_id: &PromptId) -> Option<PromptPhase> {
        self.inner.tracker().phase(prompt_id)
    }

    /// Whether a reconnect is currently scheduled.
    pub async fn reconnect_pending(&self) -> bool {
        self.inner.conn.lock().await.reconnect_timer.is_some()
    }
}

impl Inner {
    fn tracker(&self) -> std::sync::MutexGuard<'_, PromptTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, conn: &mut Conn, state: ConnectionState) {
        conn.state = state;
        self.state_tx.send_replace(state);
    }

    /// Drop the current session's tasks and writer.
    fn end_session(&self, conn: &mut Conn) {
        if let Some(session) = conn.session.take() {
            session.cancel();
        }
        conn.writer = None;
        self.tracker().clear();
        self.set_state(conn, ConnectionState::Disconnected);
    }

    /// Boxed so the reconnect timer can call back into it.
    fn connect(self: &Arc<Self>) -> BoxFuture<'static, Result<(), SocketError>> {
        let inner = Arc::clone(self);
        async move {
            let generation = {
                let mut conn = inner.conn.lock().await;
                match conn.state {
                    ConnectionState::Connecting => {
                        debug!(url = %inner.url, "Connect already in progress");
                        return Ok(());
                    }
                    ConnectionState::Connected => {
                        debug!(url = %inner.url, "Replacing live connection");
                        inner.end_session(&mut conn);
                    }
                    ConnectionState::Disconnected => {}
                }
                conn.closed = false;
                conn.generation += 1;
                inner.set_state(&mut conn, ConnectionState::Connecting);
                conn.generation
            };

            debug!(url = %inner.url, generation, "Connecting socket");
            let attempt = connect_async(inner.url.as_str()).await;

            let mut conn = inner.conn.lock().await;
            if conn.generation != generation {
                debug!(url = %inner.url, "Connect superseded");
                return Ok(());
            }

            match attempt {
                Ok((stream, _response)) => {
                    if let Some(timer) = conn.reconnect_timer.take() {
                        timer.cancel();
                    }
                    let session = CancellationToken::new();
                    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
                    let (sink, source) = stream.split();

                    tokio::spawn(write_frames(sink, writer_rx, session.clone()));
                    tokio::spawn(Arc::clone(&inner).read_frames(source, generation, session.clone()));

                    conn.writer = Some(writer_tx);
                    conn.session = Some(session);
                    inner.set_state(&mut conn, ConnectionState::Connected);
                    info!(url = %inner.url, "Socket connected");
                    inner.emitter.emit(AppEvent::Connected);
                    Ok(())
                }
                Err(e) => {
                    warn!(url = %inner.url, error = %e, "Socket connect failed");
                    inner.set_state(&mut conn, ConnectionState::Disconnected);
                    inner.emitter.emit(AppEvent::connection_error(&e));
                    inner.schedule_reconnect(&mut conn);
                    Err(SocketError::Connection(e.to_string()))
                }
            }
        }
        .boxed()
    }

    async fn read_frames<S>(self: Arc<Self>, mut source: S, generation: u64, session: CancellationToken)
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin
            + Send,
    {
        loop {
            let frame = tokio::select! {
                () = session.cancelled() => return,
                frame = source.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => self.dispatch(&text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => self.dispatch(&text),
                    Err(e) => warn!(error = %e, "Dropping non-UTF8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Server closed socket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Socket read failed");
                    break;
                }
                None => break,
            }
        }
        self.on_closed(generation).await;
    }

    fn dispatch(&self, text: &str) {
        match InboundMessage::decode(text) {
            Ok(Decoded::Message(message)) => {
                let event = self.tracker().route(message);
                if let Some(event) = event {
                    self.emitter.emit(event);
                }
            }
            Ok(Decoded::Ignored { kind }) => {
                debug!(?kind, "Ignoring socket message");
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed socket message");
            }
        }
    }

    async fn on_closed(self: &Arc<Self>, generation: u64) {
        let mut conn = self.conn.lock().await;
        if conn.generation != generation {
            return;
        }
        self.end_session(&mut conn);
        info!(url = %self.url, "Socket closed");
        self.emitter.emit(AppEvent::Disconnected);
        if !conn.closed {
            self.schedule_reconnect(&mut conn);
        }
    }

    /// At most one pending reconnect. The slot is cleared when the timer
    /// fires so later drops can schedule again.
    fn schedule_reconnect(self: &Arc<Self>, conn: &mut Conn) {
        if conn.closed || conn.reconnect_timer.is_some() {
            return;
        }
        let token = CancellationToken::new();
        conn.reconnect_timer = Some(token.clone());
        debug!(url = %self.url, delay = ?self.reconnect_delay, "Scheduling reconnect");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = sleep(inner.reconnect_delay) => {}
            }
            {
                let mut conn = inner.conn.lock().await;
                if token.is_cancelled() {
                    return;
                }
                conn.reconnect_timer = None;
            }
            if let Err(e) = inner.connect().await {
                debug!(error = %e, "Reconnect attempt failed");
            }
        });
    }

    async fn send_control(&self, message: &OutboundMessage) -> Result<(), SocketError> {
        let conn = self.conn.lock().await;
        match (&conn.state, &conn.writer) {
            (ConnectionState::Connected, Some(writer)) => writer
                .send(Message::Text(message.encode()))
                .map_err(|e| SocketError::Send(e.to_string())),
            _ => Err(SocketError::NotConnected),
        }
    }

    /// Fire-and-forget; failures are logged only.
    async fn fire(&self, message: OutboundMessage) -> bool {
        match self.send_control(&message).await {
            Ok(()) => true,
            Err(e) => {
                debug!(?message, error = %e, "Control message dropped");
                false
            }
        }
    }
}

async fn write_frames<S>(
    mut sink: S,
    mut frames: mpsc::UnboundedReceiver<Message>,
    session: CancellationToken,
) where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send,
{
    loop {
        let frame = tokio::select! {
            () = session.cancelled() => break,
            frame = frames.recv() => frame,
        };
        let Some(frame) = frame else { break };
        if let Err(e) = sink.send(frame).await {
            debug!(error = %e, "Socket write failed");
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Socket close failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::NoopEmitter;

    fn client() -> SocketClient {
        SocketClient::new(
            "ws://127.0.0.1:1",
            Duration::from_secs(60),
            Arc::new(NoopEmitter),
        )
    }

    #[tokio::test]
    async fn prompts_are_rejected_while_disconnected() {
        let client = client();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.send_prompt(serde_json::json!({"text": "hi"})).await.is_none());
        assert!(client.in_flight().is_empty());
        assert_eq!(client.prompt_phase(&"p1".into()), None);
    }

    #[tokio::test]
    async fn control_frames_are_noops_while_disconnected() {
        let client = client();
        assert!(!client.cancel_prompt(&"p1".into()).await);
        assert!(!client.clear_memory().await);
        assert_eq!(
            client.inner.send_control(&OutboundMessage::ClearMemory).await,
            Err(SocketError::NotConnected)
        );
    }

    #[tokio::test]
    async fn failed_connect_schedules_one_reconnect() {
        let client = client();
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, SocketError::Connection(_)));
        assert!(client.reconnect_pending().await);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.disconnect().await;
        assert!(!client.reconnect_pending().await);
    }
}
