//! Local lobby state.
//!
//! This module provides the state types the sync engine maintains:
//!
//! - `lobby` - Lobby and user model, wire (de)serialization
//! - `store` - The lobby map and how inbound messages change it
//! - `connection` - Connection lifecycle state machine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          LobbyClient                              │
//! │                                                                   │
//! │  transport loop ──decode──▶ LobbyStore::apply ──▶ observers       │
//! │        ▲                    ┌────────────────┐                    │
//! │        │                    │ name →         │                    │
//! │   commands                  │   Arc<Lobby>   │◀── get_lobbies     │
//! │        │                    └────────────────┘    get_lobby       │
//! │        │                                                          │
//! │  ┌─────┴───────────────────────────────────────────────────┐     │
//! │  │ Connection:  Connecting ──▶ Open ──▶ Closed             │     │
//! │  └─────────────────────────────────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these types perform I/O.

pub mod connection;
pub mod lobby;
pub mod store;

// Re-export commonly used types
pub use connection::{
    CloseReason, Connection, ConnectionEvent, ConnectionStatus, InvalidTransition,
};
pub use lobby::{GameOptions, Lobby, LobbyOptions, LobbyState, User};
pub use store::{GameStart, LobbyChange, LobbyStore, StoreUpdate};
