//! Presence registry: which connection currently speaks for a user.
//!
//! The hub only needs three operations, so the map sits behind a trait. The
//! in-process implementation is enough for a single server; a deployment
//! with several instances would implement [`PresenceRegistry`] on top of a
//! shared key-value store instead.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

/// Identifier of one live WebSocket connection.
pub type ConnId = Uuid;

pub trait PresenceRegistry: Send + Sync {
    /// Point `user_id` at `conn_id`, replacing any previous connection.
    fn set(&self, user_id: Uuid, conn_id: ConnId);

    fn get(&self, user_id: Uuid) -> Option<ConnId>;

    /// Drop every user entry that points at `conn_id`. Entries that were
    /// already taken over by a newer connection are left alone.
    /// Returns the users that were removed.
    fn remove_connection(&self, conn_id: ConnId) -> Vec<Uuid>;
}

#[derive(Default)]
pub struct InMemoryRegistry {
    users: RwLock<HashMap<Uuid, ConnId>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceRegistry for InMemoryRegistry {
    fn set(&self, user_id: Uuid, conn_id: ConnId) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, conn_id);
    }

    fn get(&self, user_id: Uuid) -> Option<ConnId> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .copied()
    }

    fn remove_connection(&self, conn_id: ConnId) -> Vec<Uuid> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let gone: Vec<Uuid> = users
            .iter()
            .filter(|(_, c)| **c == conn_id)
            .map(|(u, _)| *u)
            .collect();
        for user_id in &gone {
            users.remove(user_id);
        }
        gone
    }
}
