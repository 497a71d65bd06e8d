//! Scripted transport and helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lobby_client::{ChannelObserver, LobbyClient, LobbyClientError, LobbyEvent, Result};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const TOKEN: &str = "t0k";
const WAIT: Duration = Duration::from_secs(5);

/// Transport whose inbound frames are pushed by the test.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Result<String>>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl lobby_client::Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<()> {
        self.sent
            .send(message)
            .map_err(|_| LobbyClientError::Transport("test dropped sent receiver".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// The server side of a [`MockTransport`].
pub struct MockServer {
    frames: Option<mpsc::UnboundedSender<Result<String>>>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    pub fn push(&self, value: Value) {
        self.push_raw(&value.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        if let Some(frames) = &self.frames {
            frames.send(Ok(text.to_string())).unwrap();
        }
    }

    pub fn push_error(&self, error: LobbyClientError) {
        if let Some(frames) = &self.frames {
            frames.send(Err(error)).unwrap();
        }
    }

    /// Close the connection from the server side.
    pub fn hang_up(&mut self) {
        self.frames = None;
    }

    pub async fn next_sent(&mut self) -> Value {
        let text = timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a sent frame")
            .expect("transport dropped");
        serde_json::from_str(&text).unwrap()
    }

    pub fn transport_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub fn mock_pair() -> (MockTransport, MockServer) {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockTransport {
            incoming: frames_rx,
            sent: sent_tx,
            closed: Arc::clone(&closed),
        },
        MockServer {
            frames: Some(frames_tx),
            sent: sent_rx,
            closed,
        },
    )
}

pub struct Harness {
    pub client: LobbyClient,
    pub server: MockServer,
    pub events: mpsc::UnboundedReceiver<LobbyEvent>,
}

/// Start a client on a mock transport with a channel observer attached.
pub fn start() -> Harness {
    let (transport, server) = mock_pair();
    let (observer, events) = ChannelObserver::new();
    let client = LobbyClient::start(transport, TOKEN, vec![Arc::new(observer)]).unwrap();
    Harness {
        client,
        server,
        events,
    }
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<LobbyEvent>) -> LobbyEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

pub fn wire_lobby(name: &str, owner: &str, users: &[(&str, bool)]) -> Value {
    let users: Vec<Value> = users
        .iter()
        .map(|(username, ready)| json!({"username": username, "ready": ready}))
        .collect();
    json!({
        "name": name,
        "state": "open",
        "lobby_options": {
            "size": 4,
            "minimum_size": 2,
            "require_ready": true,
            "unready_on_change": true
        },
        "game_options": {},
        "users": users,
        "owner": owner,
        "game_type": "cube"
    })
}

pub fn all_lobbies(lobbies: Vec<Value>) -> Value {
    json!({"type": "all_lobbies", "lobbies": lobbies})
}

pub fn lobby_created(lobby: Value) -> Value {
    json!({"type": "lobby_created", "lobby": lobby})
}

pub fn lobby_update(lobby: Value) -> Value {
    json!({"type": "lobby_update", "lobby": lobby})
}

pub fn lobby_closed(name: &str) -> Value {
    json!({"type": "lobby_closed", "name": name})
}

pub fn game_started(lobby: Value, key: &str) -> Value {
    json!({"type": "game_started", "lobby": lobby, "key": key})
}
