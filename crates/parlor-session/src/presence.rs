//! Who is online, by live connection count.
//!
//! A user with three tabs open is online once. Only the 0→1 and 1→0
//! transitions produce an edge; everything between is silent, which is
//! what lets the disconnect watch ignore multi-connection churn.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use parlor_protocol::{ConnectionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEdge {
    /// First connection for the user.
    Online,
    /// Last connection gone.
    Offline,
}

#[derive(Default)]
pub struct PresenceTracker {
    connections: Mutex<HashMap<UserId, HashSet<ConnectionId>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, HashSet<ConnectionId>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a connection. Returns `Online` when this is the user's
    /// first; re-registering a known connection is a no-op.
    pub fn connect(&self, user: UserId, conn: ConnectionId) -> Option<PresenceEdge> {
        let mut connections = self.lock();
        let set = connections.entry(user).or_default();
        let was_empty = set.is_empty();
        if set.insert(conn) && was_empty {
            return Some(PresenceEdge::Online);
        }
        None
    }

    /// Removes a connection. Returns `Offline` when it was the user's
    /// last; unknown connections are a no-op.
    pub fn disconnect(&self, user: UserId, conn: ConnectionId) -> Option<PresenceEdge> {
        let mut connections = self.lock();
        let set = connections.get_mut(&user)?;
        if !set.remove(&conn) {
            return None;
        }
        if set.is_empty() {
            connections.remove(&user);
            return Some(PresenceEdge::Offline);
        }
        None
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.lock().contains_key(&user)
    }

    pub fn connection_count(&self, user: UserId) -> usize {
        self.lock().get(&user).map_or(0, HashSet::len)
    }
}

// =========================================================================
// Tests
// =========================================================================
