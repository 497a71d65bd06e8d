//! Wire protocol.
//!
//! Every frame is a JSON object with a `type` discriminator. Outbound frames
//! are [`ClientMessage`]s; inbound frames decode to an [`Inbound`].

use serde::{Deserialize, Serialize};

use crate::error::{LobbyClientError, Result};
use crate::state::lobby::{GameOptions, Lobby, LobbyOptions};

/// Messages sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Authentication {
        token: String,
    },
    Create {
        name: String,
        game_type: String,
        lobby_options: LobbyOptions,
        game_options: GameOptions,
    },
    GameType {
        name: String,
        game_type: String,
        options: GameOptions,
    },
    Options {
        name: String,
        options: GameOptions,
    },
    Join {
        name: String,
    },
    Leave {
        name: String,
    },
    Ready {
        name: String,
        state: bool,
    },
    Start {
        name: String,
    },
}

impl ClientMessage {
    /// The `type` tag this message travels under.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::Create { .. } => "create",
            Self::GameType { .. } => "game_type",
            Self::Options { .. } => "options",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Ready { .. } => "ready",
            Self::Start { .. } => "start",
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Lobby-state messages sent from the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AllLobbies { lobbies: Vec<Lobby> },
    LobbyCreated { lobby: Lobby },
    LobbyUpdate { lobby: Lobby },
    LobbyClosed { name: String },
    GameStarted { lobby: Lobby, key: String },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AllLobbies { .. } => "all_lobbies",
            Self::LobbyCreated { .. } => "lobby_created",
            Self::LobbyUpdate { .. } => "lobby_update",
            Self::LobbyClosed { .. } => "lobby_closed",
            Self::GameStarted { .. } => "game_started",
        }
    }
}

const LOBBY_MESSAGE_TYPES: [&str; 5] = [
    "all_lobbies",
    "lobby_created",
    "lobby_update",
    "lobby_closed",
    "game_started",
];

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A message that changes lobby state.
    Lobby(ServerMessage),
    /// A server-reported error, carried verbatim.
    ServerError(serde_json::Value),
    /// A `type` this client does not understand.
    Unknown(String),
}

impl Inbound {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(LobbyClientError::MissingType)?;

        if kind == "error" {
            return Ok(Self::ServerError(value));
        }
        if !LOBBY_MESSAGE_TYPES.contains(&kind) {
            return Ok(Self::Unknown(kind.to_string()));
        }
        Ok(Self::Lobby(serde_json::from_value(value)?))
    }
}
