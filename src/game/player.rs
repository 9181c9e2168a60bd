//! Player registry
//!
//! Tracks the sessions that finished login, keyed by normalized display name.
//! Entries are owned by the session that created them; removal only succeeds
//! for that session so a stale teardown can never evict a newer login.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::auth::{normalize_name, Identity};
use crate::error::GameError;
use crate::net::session::{Session, SessionId};

/// A logged in player
#[derive(Debug, Clone)]
pub struct PlayerEntry {
    pub identity: Identity,
    pub session: Arc<Session>,
}

/// Thread-safe registry of online players
#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<String, PlayerEntry>,
}

impl PlayerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under `identity`
    pub fn initialize(&self, session: Arc<Session>, identity: &Identity) -> Result<(), GameError> {
        match self.players.entry(identity.key()) {
            Entry::Occupied(existing) if existing.get().session.id != session.id => {
                Err(GameError::AlreadyOnline(identity.name.clone()))
            }
            Entry::Occupied(mut existing) => {
                existing.get_mut().identity = identity.clone();
                Ok(())
            }
            Entry::Vacant(slot) => {
                info!(
                    session_id = session.id,
                    name = %identity.name,
                    "Player registered"
                );
                slot.insert(PlayerEntry {
                    identity: identity.clone(),
                    session,
                });
                Ok(())
            }
        }
    }

    /// Session of the player called `name` (case-insensitive)
    pub fn get(&self, name: &str) -> Option<Arc<Session>> {
        self.players
            .get(&normalize_name(name))
            .map(|entry| entry.session.clone())
    }

    /// Remove `name` if `session_id` owns it. Absent entries are a no-op.
    pub fn remove(&self, name: &str, session_id: SessionId) -> bool {
        let removed = self
            .players
            .remove_if(&normalize_name(name), |_, entry| entry.session.id == session_id)
            .is_some();
        if removed {
            debug!(session_id, name, "Player removed");
        }
        removed
    }

    /// Whether a player called `name` is online
    pub fn contains(&self, name: &str) -> bool {
        self.players.contains_key(&normalize_name(name))
    }

    /// Number of online players
    pub fn count(&self) -> usize {
        self.players.len()
    }

    /// Sessions of every online player
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self
            .players
            .iter()
            .map(|entry| entry.session.clone())
            .collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Identities of every online player
    pub fn identities(&self) -> Vec<Identity> {
        self.players
            .iter()
            .map(|entry| entry.identity.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, TestClient};

    #[test]
    fn test_initialize_and_lookup() {
        let state = test_state(true);
        let client = TestClient::connect(&state);
        let registry = PlayerRegistry::new();

        registry
            .initialize(client.session.clone(), &Identity::offline("Notch"))
            .unwrap();

        assert_eq!(registry.count(), 1);
        assert!(registry.contains("NOTCH"));
        assert_eq!(registry.get("notch").map(|s| s.id), Some(client.session.id));
        assert_eq!(registry.identities()[0].name, "Notch");
    }

    #[test]
    fn test_conflicting_initialize() {
        let state = test_state(true);
        let first = TestClient::connect(&state);
        let second = TestClient::connect(&state);
        let registry = PlayerRegistry::new();

        registry
            .initialize(first.session.clone(), &Identity::offline("Notch"))
            .unwrap();
        // Same session again is fine
        registry
            .initialize(first.session.clone(), &Identity::offline("Notch"))
            .unwrap();

        let err = registry
            .initialize(second.session.clone(), &Identity::offline("notch"))
            .unwrap_err();
        assert!(matches!(err, GameError::AlreadyOnline(_)));
        assert_eq!(registry.get("Notch").map(|s| s.id), Some(first.session.id));
    }

    #[test]
    fn test_remove_only_by_owner() {
        let state = test_state(true);
        let owner = TestClient::connect(&state);
        let other = TestClient::connect(&state);
        let registry = PlayerRegistry::new();

        registry
            .initialize(owner.session.clone(), &Identity::offline("Jeb"))
            .unwrap();

        assert!(!registry.remove("jeb", other.session.id));
        assert!(registry.contains("Jeb"));

        assert!(registry.remove("JEB", owner.session.id));
        assert!(!registry.remove("Jeb", owner.session.id));
        assert_eq!(registry.count(), 0);
        assert!(registry.sessions().is_empty());
    }
}
