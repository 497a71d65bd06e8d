//! Lobby Client Library
//!
//! This crate keeps a local, thread-safe mirror of a multiplayer lobby
//! server's state and sends lobby commands to it.
//!
//! # Overview
//!
//! - **Lobby Model** - Lobbies, their members, readiness and lifecycle, as
//!   sent by the server.
//!
//! - **Lobby Store** - The lobby map. Every inbound message swaps whole
//!   `Arc<Lobby>` values, so snapshots never change under the reader.
//!
//! - **Sync Engine** - [`LobbyClient`] owns the connection, applies the
//!   server's event stream in order and tells observers what was created,
//!   modified or closed.
//!
//! - **Commands** - Fire-and-forget requests (`create_lobby`, `join_lobby`,
//!   `set_ready`, ...). Their effect is visible only once the server's event
//!   arrives.
//!
//! # Design Principles
//!
//! 1. **The server is authoritative** - Local state only ever changes in
//!    response to inbound messages.
//!
//! 2. **Whole-value replacement** - Updated fields replace the old value;
//!    nothing is merged.
//!
//! 3. **Notify outside the lock** - Observers may read the client from
//!    inside a callback.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lobby_client::{ChannelObserver, ClientConfig, LobbyClient, LobbyEvent};
//!
//! # async fn run() -> lobby_client::Result<()> {
//! let config = ClientConfig::new("wss://lobby.example.com/ws", "token");
//! let (observer, mut events) = ChannelObserver::new();
//! let client = LobbyClient::connect(config, vec![Arc::new(observer)])?;
//!
//! client.join_lobby("friday-cube")?;
//! client.set_ready("friday-cube", true)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LobbyEvent::GameStarted { key, .. } => {
//!             println!("session key: {key}");
//!             break;
//!         }
//!         LobbyEvent::Closed(_) => break,
//!         _ => {}
//!     }
//! }
//! client.close()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod state;
pub mod transport;

pub use client::LobbyClient;
pub use config::ClientConfig;
pub use error::{LobbyClientError, Result};
pub use observer::{ChannelObserver, LobbyEvent, LobbyObserver};
pub use protocol::{ClientMessage, Inbound, ServerMessage};
pub use state::*;
pub use transport::{Transport, WebSocketTransport};
