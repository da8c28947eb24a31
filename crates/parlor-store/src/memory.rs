//! In-process store over a plain `HashMap`. The mutex is held only for
//! the map operation itself; nothing awaits while holding it.

use std::collections::HashMap;
use std::sync::Mutex;

use parlor_engine::{PlayerPatch, Snapshot};
use parlor_protocol::GameId;
use tracing::{debug, trace};

use crate::{SnapshotStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    games: Mutex<HashMap<GameId, Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.games.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<GameId, Snapshot>>, StoreError> {
        self.games
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".into()))
    }
}

impl SnapshotStore for MemoryStore {
    async fn load(&self, game: GameId) -> Result<Snapshot, StoreError> {
        let games = self.lock()?;
        games.get(&game).cloned().ok_or(StoreError::NotFound(game))
    }

    async fn insert(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let mut games = self.lock()?;
        let id = snapshot.game_id;
        if games.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        trace!(game = %id, kind = %snapshot.kind, "game stored");
        games.insert(id, snapshot);
        Ok(())
    }

    async fn commit(
        &self,
        expected_marker: u64,
        mut snapshot: Snapshot,
        patches: &[PlayerPatch],
    ) -> Result<u64, StoreError> {
        let mut games = self.lock()?;
        let id = snapshot.game_id;
        let stored = games.get(&id).ok_or(StoreError::NotFound(id))?;

        if stored.turn_marker != expected_marker {
            debug!(
                game = %id,
                expected = expected_marker,
                found = stored.turn_marker,
                "conditional commit lost the race"
            );
            return Err(StoreError::MarkerConflict {
                game: id,
                expected: expected_marker,
                found: stored.turn_marker,
            });
        }

        let new_marker = expected_marker + 1;
        snapshot.turn_marker = new_marker;
        trace!(game = %id, marker = new_marker, changed = patches.len(), "snapshot committed");
        games.insert(id, snapshot);
        Ok(new_marker)
    }
}

// =========================================================================
// Tests
// =========================================================================
