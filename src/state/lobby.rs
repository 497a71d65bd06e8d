//! Lobby model.
//!
//! A lobby is a named, pre-game grouping of users mirrored from the server.
//! Values here are never patched field by field: the store builds a new
//! [`Lobby`] for every change and swaps it in.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Game-specific options, opaque to this crate.
pub type GameOptions = serde_json::Map<String, serde_json::Value>;

/// A lobby member.
///
/// Identity is the username alone: two values with the same username compare
/// equal regardless of readiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub ready: bool,
}

impl User {
    pub fn new(username: impl Into<String>, ready: bool) -> Self {
        Self {
            username: username.into(),
            ready,
        }
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.username.hash(state);
    }
}

/// Lobby constraints, replaced wholesale on change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyOptions {
    /// Maximum number of members
    pub size: i64,

    /// Members required before a game can start
    pub minimum_size: i64,

    /// Whether every member must be ready to start
    pub require_ready: bool,

    /// Whether members are unreadied when the lobby configuration changes
    pub unready_on_change: bool,
}

impl LobbyOptions {
    pub fn new(size: i64, minimum_size: i64) -> Self {
        Self {
            size,
            minimum_size,
            require_ready: true,
            unready_on_change: true,
        }
    }

    pub fn with_require_ready(mut self, require_ready: bool) -> Self {
        self.require_ready = require_ready;
        self
    }

    pub fn with_unready_on_change(mut self, unready_on_change: bool) -> Self {
        self.unready_on_change = unready_on_change;
        self
    }
}

/// Lifecycle state reported by the server.
///
/// States this client does not know are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LobbyState {
    #[default]
    Open,
    Started,
    Other(String),
}

impl LobbyState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Started => "started",
            Self::Other(state) => state,
        }
    }
}

impl From<String> for LobbyState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "open" => Self::Open,
            "started" => Self::Started,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for LobbyState {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<LobbyState> for String {
    fn from(value: LobbyState) -> Self {
        match value {
            LobbyState::Other(state) => state,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for LobbyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lobby state as mirrored from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lobby {
    /// Unique lobby name
    pub name: String,

    /// Lifecycle state
    pub state: LobbyState,

    /// Membership constraints
    pub lobby_options: LobbyOptions,

    /// Game type selected for this lobby
    pub game_type: String,

    /// Options for the selected game type
    #[serde(default)]
    pub game_options: GameOptions,

    /// Members by username (a list on the wire)
    #[serde(with = "user_list")]
    pub users: HashMap<String, User>,

    /// Username of the owner
    pub owner: String,

    /// Session key, present once a game has started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// When this client last applied a change to the lobby
    #[serde(skip, default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Lobby {
    /// Create an open lobby owned (and joined) by `owner`.
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        game_type: impl Into<String>,
        lobby_options: LobbyOptions,
    ) -> Self {
        let owner = owner.into();
        let mut users = HashMap::new();
        users.insert(owner.clone(), User::new(owner.clone(), false));
        Self {
            name: name.into(),
            state: LobbyState::Open,
            lobby_options,
            game_type: game_type.into(),
            game_options: GameOptions::new(),
            users,
            owner,
            key: None,
            updated_at: Utc::now(),
        }
    }

    /// Decode a lobby from its wire representation.
    pub fn from_wire(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Encode to the wire representation.
    pub fn to_json(&self) -> serde_json::Value {
        // Every field serializes infallibly: string keys, plain values.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Copy of this lobby with the fields a `lobby_update` carries taken from
    /// `update`. Name, owner, options and key are kept.
    pub fn with_update(&self, update: Lobby) -> Self {
        Self {
            name: self.name.clone(),
            state: update.state,
            lobby_options: self.lobby_options,
            game_type: update.game_type,
            game_options: update.game_options,
            users: update.users,
            owner: self.owner.clone(),
            key: self.key.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Copy of this lobby after its game started.
    ///
    /// A key, once set, is never replaced.
    pub fn with_game_started(&self, state: LobbyState, key: &str) -> Self {
        Self {
            state,
            key: Some(self.key.clone().unwrap_or_else(|| key.to_string())),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Get a member by username.
    pub fn get_user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    /// Check if a user is a member.
    pub fn has_member(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Check if a user owns the lobby.
    pub fn is_owner(&self, username: &str) -> bool {
        self.owner == username
    }

    /// Count members.
    pub fn member_count(&self) -> usize {
        self.users.len()
    }

    /// Count ready members.
    pub fn ready_count(&self) -> usize {
        self.users.values().filter(|u| u.ready).count()
    }

    /// Check if lobby is full.
    pub fn is_full(&self) -> bool {
        self.member_count() as i64 >= self.lobby_options.size
    }

    /// Check if all members are ready.
    pub fn all_ready(&self) -> bool {
        !self.users.is_empty() && self.users.values().all(|u| u.ready)
    }

    /// Check if the server would accept a start request, as far as this
    /// client can tell.
    pub fn can_start(&self) -> bool {
        !self.is_started()
            && self.member_count() as i64 >= self.lobby_options.minimum_size
            && (!self.lobby_options.require_ready || self.all_ready())
    }

    pub fn is_started(&self) -> bool {
        self.key.is_some() || self.state == LobbyState::Started
    }
}

/// Users travel as a list and are held keyed by username.
mod user_list {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::User;

    pub fn serialize<S>(users: &HashMap<String, User>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut list: Vec<&User> = users.values().collect();
        list.sort_by(|a, b| a.username.cmp(&b.username));
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HashMap<String, User>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<User>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect())
    }
}
