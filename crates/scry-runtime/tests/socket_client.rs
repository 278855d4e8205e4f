//! Socket client against an in-process websocket server.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use scry_core::{AppEvent, ConnectionState};
use scry_runtime::{EventBroadcaster, PromptPhase, SocketClient};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use common::wait_for;

type Ws = WebSocketStream<TcpStream>;

struct Server {
    url: String,
    accepted: Arc<AtomicUsize>,
    sessions: mpsc::UnboundedReceiver<Ws>,
}

impl Server {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let (tx, sessions) = mpsc::unbounded_channel();

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                if tx.send(ws).is_err() {
                    break;
                }
            }
        });

        Self {
            url,
            accepted,
            sessions,
        }
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    async fn next_session(&mut self) -> Ws {
        timeout(Duration::from_secs(5), self.sessions.recv())
            .await
            .expect("no connection arrived")
            .unwrap()
    }
}

async fn read_json(ws: &mut Ws) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame arrived")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next event that is not connection bookkeeping.
async fn next_chat_event(rx: &mut broadcast::Receiver<AppEvent>) -> AppEvent {
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event arrived")
            .unwrap();
        if !matches!(event, AppEvent::Connected | AppEvent::Disconnected) {
            return event;
        }
    }
}

fn client(url: &str, events: &EventBroadcaster, reconnect: Duration) -> SocketClient {
    SocketClient::new(url, reconnect, events.emitter())
}

#[tokio::test]
async fn test_concurrent_connects_open_one_connection() {
    let mut server = Server::start().await;
    let events = EventBroadcaster::new();
    let client = client(&server.url, &events, Duration::from_secs(60));

    let (a, b) = tokio::join!(client.connect(), client.connect());
    a.unwrap();
    b.unwrap();
    let _ws = server.next_session().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(server.accepted(), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
    client.disconnect().await;
}

#[tokio::test]
async fn test_prompt_tokens_and_completion_are_routed() {
    let mut server = Server::start().await;
    let events = EventBroadcaster::new();
    let mut rx = events.subscribe();
    let client = client(&server.url, &events, Duration::from_secs(60));

    client.connect().await.unwrap();
    let mut ws = server.next_session().await;

    let prompt_id = client.send_prompt(json!({"text": "hi"})).await.unwrap();
    let frame = read_json(&mut ws).await;
    assert_eq!(frame["text"], "hi");
    assert_eq!(frame["promptId"], prompt_id.as_str());
    assert_eq!(client.in_flight(), vec![prompt_id.clone()]);
    assert_eq!(client.prompt_phase(&prompt_id), Some(PromptPhase::Pending));

    let id = prompt_id.as_str();
    send_json(&mut ws, json!({"type": "token", "promptId": id, "token": "Hel"})).await;
    send_json(&mut ws, json!({"type": "token", "promptId": id, "token": "lo"})).await;
    send_json(&mut ws, json!({"type": "complete", "promptId": id, "complete": true})).await;
    // late frame for a finished prompt, then a marker
    send_json(&mut ws, json!({"type": "token", "promptId": id, "token": "!"})).await;
    send_json(&mut ws, json!({"type": "status", "status": "memory_cleared"})).await;

    let mut tokens = String::new();
    loop {
        match next_chat_event(&mut rx).await {
            AppEvent::NewToken { prompt_id: p, token } => {
                assert_eq!(p, prompt_id);
                tokens.push_str(&token);
            }
            AppEvent::Complete { prompt_id: p } => {
                assert_eq!(p, prompt_id);
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(tokens, "Hello");
    assert_eq!(
        next_chat_event(&mut rx).await,
        AppEvent::MemoryCleared { session_id: None }
    );
    assert!(client.in_flight().is_empty());
    assert_eq!(client.prompt_phase(&prompt_id), None);

    client.disconnect().await;
}

#[tokio::test]
async fn test_cancel_and_clear_memory_frames() {
    let mut server = Server::start().await;
    let events = EventBroadcaster::new();
    let client = client(&server.url, &events, Duration::from_secs(60));

    client.connect().await.unwrap();
    let mut ws = server.next_session().await;

    let prompt_id = client.send_prompt(json!({"text": "long"})).await.unwrap();
    let _prompt = read_json(&mut ws).await;

    assert!(client.cancel_prompt(&prompt_id).await);
    assert_eq!(
        read_json(&mut ws).await,
        json!({"action": "cancel", "promptId": prompt_id.as_str()})
    );

    assert!(client.clear_memory().await);
    assert_eq!(read_json(&mut ws).await, json!({"action": "clear_memory"}));

    client.disconnect().await;
}

#[tokio::test]
async fn test_server_close_schedules_reconnect() {
    let mut server = Server::start().await;
    let events = EventBroadcaster::new();
    let mut rx = events.subscribe();
    let client = client(&server.url, &events, Duration::from_millis(100));
    let mut states = client.subscribe_state();

    client.connect().await.unwrap();
    let mut first = server.next_session().await;
    assert_eq!(rx.recv().await.unwrap(), AppEvent::Connected);

    first.close(None).await.unwrap();
    drop(first);
    assert_eq!(
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap(),
        AppEvent::Disconnected
    );

    let _second = server.next_session().await;
    wait_for(&mut states, Duration::from_secs(5), |s| {
        *s == ConnectionState::Connected
    })
    .await;
    assert_eq!(server.accepted(), 2);

    client.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_stops_reconnecting() {
    let mut server = Server::start().await;
    let events = EventBroadcaster::new();
    let client = client(&server.url, &events, Duration::from_millis(50));

    client.connect().await.unwrap();
    let _ws = server.next_session().await;

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.reconnect_pending().await);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.accepted(), 1);
    assert!(client.send_prompt(json!({"text": "late"})).await.is_none());
}

#[tokio::test]
async fn test_failed_connect_reports_connection_error() {
    // bind then drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let events = EventBroadcaster::new();
    let mut rx = events.subscribe();
    let client = client(&format!("ws://127.0.0.1:{port}"), &events, Duration::from_secs(60));

    assert!(client.connect().await.is_err());
    match rx.recv().await.unwrap() {
        AppEvent::Error { prompt_id, error } => {
            assert!(prompt_id.is_none());
            assert!(error.starts_with("Connection error:"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(client.reconnect_pending().await);
    client.disconnect().await;
}
