//! Change notification contract.
//!
//! Observers are told, once per inbound message that changed state, which
//! lobbies were created, modified or closed. They are called from the
//! transport loop after the store lock has been released, so they may read
//! the client (`get_lobbies`, `get_lobby`) without deadlocking.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::LobbyClientError;
use crate::state::connection::CloseReason;
use crate::state::lobby::Lobby;
use crate::state::store::LobbyChange;

/// Receives lobby notifications from a [`LobbyClient`](crate::LobbyClient).
///
/// Only [`on_lobbies_changed`](LobbyObserver::on_lobbies_changed) is
/// required. Calls arrive on the transport loop; keep them short.
pub trait LobbyObserver: Send + Sync {
    /// One message changed the store.
    ///
    /// A lobby may show up as created in one call and closed in a later one.
    fn on_lobbies_changed(&self, change: &LobbyChange);

    /// A game started. Always follows the `modified` notification for the
    /// same message.
    fn on_game_started(&self, _lobby: &Arc<Lobby>, _key: &str) {}

    /// The server reported an error. `payload` is the raw message.
    fn on_client_error(&self, _payload: &serde_json::Value) {}

    /// The server referenced a lobby this client does not know.
    fn on_sync_fault(&self, _error: &LobbyClientError) {}

    /// The client entered Closed. Called at most once.
    fn on_closed(&self, _reason: &CloseReason) {}
}

/// A notification, as delivered by [`ChannelObserver`].
#[derive(Debug, Clone)]
pub enum LobbyEvent {
    LobbiesChanged(LobbyChange),
    GameStarted { lobby: Arc<Lobby>, key: String },
    ClientError(serde_json::Value),
    /// Rendered error of a protocol-consistency fault
    SyncFault(String),
    Closed(CloseReason),
}

/// Observer that forwards every notification onto an unbounded channel.
///
/// # Example
///
/// ```rust,ignore
/// let (observer, mut events) = ChannelObserver::new();
/// let client = LobbyClient::connect(config, vec![Arc::new(observer)])?;
///
/// while let Some(event) = events.recv().await {
///     if let LobbyEvent::Closed(_) = event {
///         break;
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LobbyEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LobbyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: LobbyEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

impl LobbyObserver for ChannelObserver {
    fn on_lobbies_changed(&self, change: &LobbyChange) {
        self.emit(LobbyEvent::LobbiesChanged(change.clone()));
    }

    fn on_game_started(&self, lobby: &Arc<Lobby>, key: &str) {
        self.emit(LobbyEvent::GameStarted {
            lobby: Arc::clone(lobby),
            key: key.to_string(),
        });
    }

    fn on_client_error(&self, payload: &serde_json::Value) {
        self.emit(LobbyEvent::ClientError(payload.clone()));
    }

    fn on_sync_fault(&self, error: &LobbyClientError) {
        self.emit(LobbyEvent::SyncFault(error.to_string()));
    }

    fn on_closed(&self, reason: &CloseReason) {
        self.emit(LobbyEvent::Closed(reason.clone()));
    }
}
