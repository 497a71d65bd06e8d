//! Lobby store.
//!
//! The single source of truth for lobbies known to this client. Entries are
//! `Arc<Lobby>` values that are swapped, never mutated, so a snapshot handed
//! out by [`LobbyStore::get_all`] is unaffected by later messages.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::{LobbyClientError, Result};
use crate::protocol::ServerMessage;
use crate::state::lobby::Lobby;

/// Net effect of one inbound message on the store.
#[derive(Debug, Clone, Default)]
pub struct LobbyChange {
    pub created: HashMap<String, Arc<Lobby>>,
    pub modified: HashMap<String, Arc<Lobby>>,
    pub closed: HashSet<String>,
}

impl LobbyChange {
    pub fn created(lobbies: HashMap<String, Arc<Lobby>>) -> Self {
        Self {
            created: lobbies,
            ..Self::default()
        }
    }

    pub fn modified(lobby: Arc<Lobby>) -> Self {
        Self {
            modified: HashMap::from([(lobby.name.clone(), lobby)]),
            ..Self::default()
        }
    }

    pub fn closed(name: String) -> Self {
        Self {
            closed: HashSet::from([name]),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.closed.is_empty()
    }
}

/// A game start observed while applying a message.
#[derive(Debug, Clone)]
pub struct GameStart {
    pub lobby: Arc<Lobby>,
    pub key: String,
}

/// What the engine must announce after a message was applied.
#[derive(Debug, Clone)]
pub struct StoreUpdate {
    pub change: LobbyChange,
    /// Announced after `change`
    pub game_started: Option<GameStart>,
}

impl From<LobbyChange> for StoreUpdate {
    fn from(change: LobbyChange) -> Self {
        Self {
            change,
            game_started: None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    lobbies: HashMap<String, Arc<Lobby>>,
    last_resync_at: Option<DateTime<Utc>>,
}

/// Lobby store - mirrors every lobby the server has told us about.
#[derive(Debug, Default)]
pub struct LobbyStore {
    inner: Mutex<Inner>,
}

impl LobbyStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic elsewhere cannot leave an entry half-written: entries are
    // replaced whole, so a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point-in-time snapshot of all lobbies.
    pub fn get_all(&self) -> HashMap<String, Arc<Lobby>> {
        self.lock().lobbies.clone()
    }

    /// Get lobby by name.
    pub fn get(&self, name: &str) -> Option<Arc<Lobby>> {
        self.lock().lobbies.get(name).cloned()
    }

    /// Get all lobby names.
    pub fn names(&self) -> Vec<String> {
        self.lock().lobbies.keys().cloned().collect()
    }

    /// Count lobbies.
    pub fn len(&self) -> usize {
        self.lock().lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lobbies.is_empty()
    }

    /// When the last full resync was applied.
    pub fn last_resync_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_resync_at
    }

    /// Apply a lobby message.
    ///
    /// Returns `None` when the message changed nothing (closing a lobby that
    /// is not known). The lock is released before this returns; the caller
    /// notifies observers afterwards.
    pub(crate) fn apply(&self, message: ServerMessage) -> Result<Option<StoreUpdate>> {
        let mut inner = self.lock();

        match message {
            ServerMessage::AllLobbies { lobbies } => {
                let lobbies: HashMap<String, Arc<Lobby>> = lobbies
                    .into_iter()
                    .map(|lobby| (lobby.name.clone(), Arc::new(lobby)))
                    .collect();
                // Lobbies missing from the snapshot are dropped without a
                // closed notification.
                inner.lobbies = lobbies.clone();
                inner.last_resync_at = Some(Utc::now());
                Ok(Some(LobbyChange::created(lobbies).into()))
            }

            ServerMessage::LobbyCreated { lobby } => {
                let lobby = Arc::new(lobby);
                inner.lobbies.insert(lobby.name.clone(), Arc::clone(&lobby));
                Ok(Some(
                    LobbyChange::created(HashMap::from([(lobby.name.clone(), lobby)])).into(),
                ))
            }

            ServerMessage::LobbyUpdate { lobby } => {
                let current = inner.lobbies.get(&lobby.name).ok_or_else(|| {
                    LobbyClientError::UnknownLobby {
                        kind: "lobby_update",
                        name: lobby.name.clone(),
                    }
                })?;
                let updated = Arc::new(current.with_update(lobby));
                inner
                    .lobbies
                    .insert(updated.name.clone(), Arc::clone(&updated));
                Ok(Some(LobbyChange::modified(updated).into()))
            }

            ServerMessage::LobbyClosed { name } => Ok(inner
                .lobbies
                .remove(&name)
                .map(|_| LobbyChange::closed(name).into())),

            ServerMessage::GameStarted { lobby, key } => {
                let current = inner.lobbies.get(&lobby.name).ok_or_else(|| {
                    LobbyClientError::UnknownLobby {
                        kind: "game_started",
                        name: lobby.name.clone(),
                    }
                })?;
                let updated = Arc::new(current.with_game_started(lobby.state, &key));
                inner
                    .lobbies
                    .insert(updated.name.clone(), Arc::clone(&updated));

                let key = updated.key.clone().unwrap_or(key);
                Ok(Some(StoreUpdate {
                    change: LobbyChange::modified(Arc::clone(&updated)),
                    game_started: Some(GameStart {
                        lobby: updated,
                        key,
                    }),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::{LobbyOptions, LobbyState, User};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn lobby(name: &str, owner: &str) -> Lobby {
        Lobby::new(name, owner, "cube", LobbyOptions::new(4, 2))
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    fn store_with(lobbies: Vec<Lobby>) -> LobbyStore {
        let store = LobbyStore::new();
        store
            .apply(ServerMessage::AllLobbies { lobbies })
            .unwrap();
        store
    }

    #[test]
    fn test_store_starts_empty() {
        let store = LobbyStore::new();
        assert!(store.is_empty());
        assert!(store.get("L1").is_none());
        assert!(store.last_resync_at().is_none());
    }

    #[test]
    fn test_resync_replaces_not_merges() {
        let store = store_with(vec![lobby("A", "alice"), lobby("B", "bob")]);

        let update = store
            .apply(ServerMessage::AllLobbies {
                lobbies: vec![lobby("C", "carol")],
            })
            .unwrap()
            .unwrap();

        assert_eq!(store.names(), vec!["C".to_string()]);
        assert_eq!(
            sorted(update.change.created.keys().cloned().collect()),
            vec!["C".to_string()]
        );
        assert!(update.change.modified.is_empty());
        assert!(update.change.closed.is_empty());
        assert!(update.game_started.is_none());
        assert!(store.last_resync_at().is_some());
    }

    #[test]
    fn test_created_overwrites() {
        let store = store_with(vec![lobby("A", "alice")]);

        let update = store
            .apply(ServerMessage::LobbyCreated {
                lobby: lobby("A", "bob"),
            })
            .unwrap()
            .unwrap();

        assert_eq!(store.get("A").unwrap().owner, "bob");
        assert_eq!(update.change.created["A"].owner, "bob");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_close_unknown_is_noop() {
        let store = store_with(vec![lobby("A", "alice")]);

        let update = store
            .apply(ServerMessage::LobbyClosed {
                name: "missing".to_string(),
            })
            .unwrap();

        assert!(update.is_none());
        assert_eq!(store.names(), vec!["A".to_string()]);
    }

    #[test]
    fn test_close_known() {
        let store = store_with(vec![lobby("A", "alice")]);

        let update = store
            .apply(ServerMessage::LobbyClosed {
                name: "A".to_string(),
            })
            .unwrap()
            .unwrap();

        assert!(update.change.closed.contains("A"));
        assert!(update.change.created.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_replaces_fields() {
        let mut original = lobby("L", "alice");
        original.users = HashMap::from([("u1".to_string(), User::new("u1", false))]);
        original.game_options.insert("x".to_string(), json!(1));
        let store = store_with(vec![original]);

        let mut update = lobby("L", "someone-else");
        update.users = HashMap::from([("u2".to_string(), User::new("u2", true))]);
        update.game_options.insert("y".to_string(), json!(2));

        let applied = store
            .apply(ServerMessage::LobbyUpdate { lobby: update })
            .unwrap()
            .unwrap();

        let stored = store.get("L").unwrap();
        assert_eq!(stored.users.keys().cloned().collect::<Vec<_>>(), vec!["u2".to_string()]);
        assert!(stored.users["u2"].ready);
        assert_eq!(json!(stored.game_options), json!({"y": 2}));
        assert_eq!(stored.owner, "alice");
        assert_eq!(stored.key, None);
        assert!(Arc::ptr_eq(&stored, &applied.change.modified["L"]));
    }

    #[test]
    fn test_update_unknown_lobby_is_fault() {
        let store = LobbyStore::new();

        let result = store.apply(ServerMessage::LobbyUpdate {
            lobby: lobby("ghost", "alice"),
        });

        assert!(matches!(
            result,
            Err(LobbyClientError::UnknownLobby { kind: "lobby_update", ref name }) if name == "ghost"
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_game_started_unknown_lobby_is_fault() {
        let store = LobbyStore::new();

        let result = store.apply(ServerMessage::GameStarted {
            lobby: lobby("ghost", "alice"),
            key: "abc".to_string(),
        });

        assert!(matches!(
            result,
            Err(LobbyClientError::UnknownLobby { kind: "game_started", .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_game_started_pairs_modified_and_start() {
        let store = store_with(vec![lobby("L", "alice")]);

        let mut started = lobby("L", "alice");
        started.state = LobbyState::Started;
        let update = store
            .apply(ServerMessage::GameStarted {
                lobby: started,
                key: "abc".to_string(),
            })
            .unwrap()
            .unwrap();

        let modified = &update.change.modified["L"];
        assert_eq!(modified.key.as_deref(), Some("abc"));
        assert_eq!(modified.state, LobbyState::Started);

        let start = update.game_started.unwrap();
        assert_eq!(start.lobby.name, "L");
        assert_eq!(start.key, "abc");
    }

    #[test]
    fn test_key_survives_update() {
        let store = store_with(vec![lobby("L", "alice")]);
        store
            .apply(ServerMessage::GameStarted {
                lobby: lobby("L", "alice"),
                key: "abc".to_string(),
            })
            .unwrap();

        store
            .apply(ServerMessage::LobbyUpdate {
                lobby: lobby("L", "alice"),
            })
            .unwrap();

        assert_eq!(store.get("L").unwrap().key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let store = store_with(vec![lobby("L", "alice")]);
        let snapshot = store.get_all();

        let mut update = lobby("L", "alice");
        update.users.clear();
        store
            .apply(ServerMessage::LobbyUpdate { lobby: update })
            .unwrap();
        store
            .apply(ServerMessage::LobbyClosed {
                name: "L".to_string(),
            })
            .unwrap();

        assert_eq!(snapshot["L"].member_count(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_recreate_is_new_entity() {
        let store = store_with(vec![lobby("L", "alice")]);
        let before = store.get("L").unwrap();

        store
            .apply(ServerMessage::LobbyClosed {
                name: "L".to_string(),
            })
            .unwrap();
        store
            .apply(ServerMessage::LobbyCreated {
                lobby: lobby("L", "bob"),
            })
            .unwrap();

        let after = store.get("L").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.owner, "bob");
    }
}
