//! Sync engine.
//!
//! [`LobbyClient`] is a handle onto a background transport loop. The loop
//! owns the [`Transport`], applies inbound messages to the shared
//! [`LobbyStore`] in delivery order and notifies observers. Command methods
//! serialize a [`ClientMessage`] onto an unbounded channel and return
//! immediately; their effect shows up only when the server answers with a
//! lobby event.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::new("wss://lobby.example.com/ws", token);
//! let (observer, mut events) = ChannelObserver::new();
//! let client = LobbyClient::connect(config, vec![Arc::new(observer)])?;
//!
//! client.join_lobby("friday-cube")?;
//! while let Some(event) = events.recv().await {
//!     if let LobbyEvent::GameStarted { key, .. } = event {
//!         launch_game(&key);
//!         break;
//!     }
//! }
//! client.close()?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{LobbyClientError, Result};
use crate::observer::LobbyObserver;
use crate::protocol::{ClientMessage, Inbound};
use crate::state::connection::{CloseReason, Connection, ConnectionEvent, ConnectionStatus};
use crate::state::lobby::{GameOptions, Lobby, LobbyOptions};
use crate::state::store::{LobbyStore, StoreUpdate};
use crate::transport::{Transport, WebSocketTransport};

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the transport loop.
struct Shared {
    store: LobbyStore,
    connection: Mutex<Connection>,
    observers: RwLock<Vec<Arc<dyn LobbyObserver>>>,
    shutdown: Notify,
}

impl Shared {
    fn new(observers: Vec<Arc<dyn LobbyObserver>>) -> Self {
        Self {
            store: LobbyStore::new(),
            connection: Mutex::new(Connection::new()),
            observers: RwLock::new(observers),
            shutdown: Notify::new(),
        }
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the observer list, so no lock is held while notifying.
    fn observers(&self) -> Vec<Arc<dyn LobbyObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Connecting -> Open. Fails if the client was closed meanwhile.
    fn open(&self) -> bool {
        self.connection().apply_mut(ConnectionEvent::Opened).is_ok()
    }

    /// Enter Closed (if not already there) and announce the final reason.
    fn finish(&self, reason: CloseReason) {
        let reason = {
            let mut connection = self.connection();
            connection.close(reason);
            match connection.status() {
                ConnectionStatus::Closed { reason } => reason.clone(),
                _ => return,
            }
        };
        info!(%reason, "lobby connection closed");
        for observer in self.observers() {
            observer.on_closed(&reason);
        }
    }

    /// Decode, apply and announce one inbound frame.
    fn handle_frame(&self, text: &str) {
        {
            let mut connection = self.connection();
            if connection.status().is_closed() {
                debug!("client closed, ignoring inbound frame");
                return;
            }
            connection.record_received();
        }

        let inbound = match Inbound::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, raw = text, "dropping undecodable message");
                return;
            }
        };

        match inbound {
            Inbound::Unknown(kind) => {
                debug!(%kind, "ignoring unknown message type");
            }
            Inbound::ServerError(payload) => {
                warn!(%payload, "server reported an error");
                for observer in self.observers() {
                    observer.on_client_error(&payload);
                }
            }
            Inbound::Lobby(message) => {
                let kind = message.kind();
                debug!(kind, "applying lobby message");
                match self.store.apply(message) {
                    Ok(Some(update)) => self.notify(update),
                    Ok(None) => debug!(kind, "message changed nothing"),
                    Err(e) => {
                        error!(error = %e, "lobby state diverged from server");
                        for observer in self.observers() {
                            observer.on_sync_fault(&e);
                        }
                    }
                }
            }
        }
    }

    fn notify(&self, update: StoreUpdate) {
        let observers = self.observers();
        for observer in &observers {
            observer.on_lobbies_changed(&update.change);
        }
        if let Some(start) = update.game_started {
            info!(lobby = %start.lobby.name, "game started");
            for observer in &observers {
                observer.on_game_started(&start.lobby, &start.key);
            }
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Client handle for the lobby server.
///
/// Reads (`get_lobbies`, `get_lobby`) and commands may be called from any
/// thread. Dropping the handle closes the connection.
pub struct LobbyClient {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LobbyClient {
    /// Connect to the server described by `config`.
    ///
    /// Returns as soon as the transport loop is spawned; the client is in
    /// Connecting until the WebSocket handshake completes. Commands issued
    /// meanwhile are sent after authentication. Must be called from within a
    /// tokio runtime.
    pub fn connect(config: ClientConfig, observers: Vec<Arc<dyn LobbyObserver>>) -> Result<Self> {
        config.validate()?;
        let ClientConfig {
            url,
            token,
            verify_tls,
        } = config;
        Self::spawn(
            async move { WebSocketTransport::connect(&url, verify_tls).await },
            token,
            observers,
        )
    }

    /// Start the sync engine on an already connected transport.
    pub fn start(
        transport: impl Transport,
        token: impl Into<String>,
        observers: Vec<Arc<dyn LobbyObserver>>,
    ) -> Result<Self> {
        Self::spawn(async move { Ok(transport) }, token.into(), observers)
    }

    fn spawn<F, T>(connect: F, token: String, observers: Vec<Arc<dyn LobbyObserver>>) -> Result<Self>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Transport,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LobbyClientError::Config(format!("no tokio runtime: {e}")))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(observers));
        let task = runtime.spawn(transport_loop(connect, token, cmd_rx, Arc::clone(&shared)));

        Ok(Self {
            cmd_tx,
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    // ── Observers ───────────────────────────────────────────────────

    /// Register another observer. It sees notifications from the next
    /// message on.
    pub fn subscribe(&self, observer: Arc<dyn LobbyObserver>) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Snapshot of every known lobby.
    pub fn get_lobbies(&self) -> HashMap<String, Arc<Lobby>> {
        self.shared.store.get_all()
    }

    /// Get lobby by name.
    pub fn get_lobby(&self, name: &str) -> Option<Arc<Lobby>> {
        self.shared.store.get(name)
    }

    /// When the server last sent a full lobby list.
    pub fn last_resync_at(&self) -> Option<DateTime<Utc>> {
        self.shared.store.last_resync_at()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.connection().status().clone()
    }

    /// Copy of the connection record (timestamps, frame counters).
    pub fn connection(&self) -> Connection {
        self.shared.connection().clone()
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Ask the server to create a lobby.
    pub fn create_lobby(
        &self,
        name: impl Into<String>,
        game_type: impl Into<String>,
        lobby_options: LobbyOptions,
        game_options: GameOptions,
    ) -> Result<()> {
        self.send(ClientMessage::Create {
            name: name.into(),
            game_type: game_type.into(),
            lobby_options,
            game_options,
        })
    }

    /// Change the game type of a lobby.
    pub fn set_game_type(
        &self,
        name: impl Into<String>,
        game_type: impl Into<String>,
        options: GameOptions,
    ) -> Result<()> {
        self.send(ClientMessage::GameType {
            name: name.into(),
            game_type: game_type.into(),
            options,
        })
    }

    /// Change the game options of a lobby.
    pub fn set_options(&self, name: impl Into<String>, options: GameOptions) -> Result<()> {
        self.send(ClientMessage::Options {
            name: name.into(),
            options,
        })
    }

    pub fn join_lobby(&self, name: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Join { name: name.into() })
    }

    pub fn leave_lobby(&self, name: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Leave { name: name.into() })
    }

    pub fn set_ready(&self, name: impl Into<String>, ready: bool) -> Result<()> {
        self.send(ClientMessage::Ready {
            name: name.into(),
            state: ready,
        })
    }

    pub fn start_game(&self, name: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Start { name: name.into() })
    }

    /// Close the connection.
    ///
    /// Commands fail with [`LobbyClientError::AlreadyClosed`] from here on;
    /// commands still queued are dropped.
    pub fn close(&self) -> Result<()> {
        {
            let mut connection = self.shared.connection();
            if connection.status().is_closed() {
                return Err(LobbyClientError::AlreadyClosed);
            }
            connection.close(CloseReason::Local);
        }
        self.shared.shutdown.notify_one();
        Ok(())
    }

    /// Wait for the transport loop to exit.
    pub async fn wait_closed(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("transport loop terminated with join error: {e}");
            }
        }
    }

    fn send(&self, message: ClientMessage) -> Result<()> {
        if let Some(e) = self.shared.connection().status().command_error() {
            return Err(e);
        }
        self.cmd_tx
            .send(message)
            .map_err(|_| LobbyClientError::ConnectionClosed)
    }
}

impl std::fmt::Debug for LobbyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyClient")
            .field("status", &self.status())
            .field("lobbies", &self.shared.store.len())
            .finish()
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background loop: connect, authenticate, then multiplex commands and
/// inbound frames until either side closes.
async fn transport_loop<F, T>(
    connect: F,
    token: String,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    shared: Arc<Shared>,
) where
    F: Future<Output = Result<T>> + Send,
    T: Transport,
{
    debug!("transport loop started");

    let connected = tokio::select! {
        biased;
        _ = shared.shutdown.notified() => None,
        connected = connect => Some(connected),
    };
    let mut transport = match connected {
        None => {
            shut_down(&shared, &mut cmd_rx, CloseReason::Local);
            return;
        }
        Some(Err(e)) => {
            error!(error = %e, "failed to connect");
            shut_down(&shared, &mut cmd_rx, CloseReason::Error(e.to_string()));
            return;
        }
        Some(Ok(transport)) => transport,
    };

    if !shared.open() {
        close_transport(&mut transport).await;
        shut_down(&shared, &mut cmd_rx, CloseReason::Local);
        return;
    }
    info!("lobby connection open, authenticating");

    // Authentication goes out before anything queued while connecting.
    let auth = ClientMessage::Authentication { token };
    if let Err(e) = send_message(&mut transport, &shared, &auth).await {
        error!(error = %e, "failed to send authentication");
        shut_down(&shared, &mut cmd_rx, CloseReason::Error(e.to_string()));
        return;
    }

    let reason = loop {
        tokio::select! {
            biased;

            _ = shared.shutdown.notified() => {
                debug!("shutdown requested");
                close_transport(&mut transport).await;
                break CloseReason::Local;
            }

            // Inbound frames win over queued commands.
            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => shared.handle_frame(&text),
                Some(Err(e)) => {
                    error!(error = %e, "transport receive error");
                    break CloseReason::Error(e.to_string());
                }
                None => {
                    debug!("transport closed by server");
                    break CloseReason::Remote;
                }
            },

            cmd = cmd_rx.recv() => match cmd {
                Some(message) => {
                    if let Err(e) = send_message(&mut transport, &shared, &message).await {
                        error!(error = %e, "transport send error");
                        break CloseReason::Error(e.to_string());
                    }
                }
                None => {
                    debug!("client handle dropped");
                    close_transport(&mut transport).await;
                    break CloseReason::Local;
                }
            },
        }
    };

    shut_down(&shared, &mut cmd_rx, reason);
    debug!("transport loop exited");
}

/// Enter Closed, then stop accepting commands and discard the ones still
/// queued. Returns how many were discarded.
fn shut_down(
    shared: &Shared,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    reason: CloseReason,
) -> usize {
    shared.finish(reason);
    cmd_rx.close();

    let mut dropped = 0usize;
    while cmd_rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(dropped, "discarding unsent commands");
    }
    dropped
}

async fn send_message<T: Transport>(
    transport: &mut T,
    shared: &Shared,
    message: &ClientMessage,
) -> Result<()> {
    debug!(kind = message.kind(), "sending client message");
    transport.send(message.to_text()?).await?;
    shared.connection().record_sent();
    Ok(())
}

async fn close_transport<T: Transport>(transport: &mut T) {
    if let Err(e) = transport.close().await {
        debug!(error = %e, "error while closing transport");
    }
}
