//! Suppression of repeat state broadcasts.
//!
//! The fingerprint digests the fields that make two snapshots the "same
//! state" for a spectator: the seat roster, whose turn it is, lifecycle
//! status, move and update stamps, and the game data itself. How the
//! caller wrapped or re-serialized the snapshot never matters, and
//! neither does the write that produced it.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use parlor_engine::Snapshot;
use parlor_protocol::{EventKind, RoomCode};

/// Digest of the semantically relevant snapshot fields. The turn marker
/// stays out: it identifies the write, not the content, and the same
/// content re-published must still collide.
pub(crate) fn state_fingerprint(snapshot: &Snapshot) -> u64 {
    let mut hasher = DefaultHasher::new();
    snapshot.players.len().hash(&mut hasher);
    for player in &snapshot.players {
        (player.id, &player.name, player.score, player.is_active, player.position)
            .hash(&mut hasher);
    }
    snapshot.current_player_index.hash(&mut hasher);
    snapshot.status.to_string().hash(&mut hasher);
    snapshot.updated_at.timestamp_millis().hash(&mut hasher);
    snapshot
        .last_move_at
        .map(|t| t.timestamp_millis())
        .hash(&mut hasher);
    // serde_json maps are sorted, so equal values print equal strings.
    snapshot.data.to_string().hash(&mut hasher);
    hasher.finish()
}

type DedupeKey = (RoomCode, EventKind, u64);

/// Last-delivery times per `(room, event, fingerprint)` key.
#[derive(Default)]
pub(crate) struct DedupeCache {
    entries: Mutex<HashMap<DedupeKey, Instant>>,
}

impl DedupeCache {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DedupeKey, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a frame with this key may go out. Records the delivery
    /// time when it may; suppressed frames do not extend the window, so
    /// a state that keeps repeating still gets through once per window.
    pub(crate) fn should_deliver(&self, key: DedupeKey, debounce: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(&last) if now.duration_since(last) < debounce => false,
            _ => {
                entries.insert(key, now);
                true
            }
        }
    }

    /// Drops entries older than `ttl`.
    pub(crate) fn sweep(&self, ttl: Duration) {
        let now = Instant::now();
        self.lock().retain(|_, &mut last| now.duration_since(last) < ttl);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use parlor_engine::{GameKind, GameStatus, Player};
    use parlor_protocol::{GameId, UserId};

    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            game_id: GameId(1),
            kind: GameKind::Rps,
            players: vec![Player::new(UserId(1), "ada")],
            current_player_index: 0,
            status: GameStatus::Playing,
            data: serde_json::json!({ "round": 1 }),
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            last_move_at: None,
            turn_marker: 3,
        }
    }

    #[test]
    fn test_fingerprint_stable_for_equal_snapshots() {
        assert_eq!(state_fingerprint(&snapshot()), state_fingerprint(&snapshot()));
    }

    #[test]
    fn test_fingerprint_tracks_semantic_fields() {
        let base = state_fingerprint(&snapshot());

        let mut turn = snapshot();
        turn.current_player_index = 1;
        assert_ne!(state_fingerprint(&turn), base);

        let mut status = snapshot();
        status.status = GameStatus::Finished;
        assert_ne!(state_fingerprint(&status), base);

        let mut data = snapshot();
        data.data = serde_json::json!({ "round": 2 });
        assert_ne!(state_fingerprint(&data), base);

        let mut moved = snapshot();
        moved.last_move_at = Some(moved.updated_at);
        assert_ne!(state_fingerprint(&moved), base);
    }

    #[test]
    fn test_fingerprint_ignores_turn_marker() {
        let base = state_fingerprint(&snapshot());

        let mut rewritten = snapshot();
        rewritten.turn_marker = 99;
        assert_eq!(state_fingerprint(&rewritten), base);
    }

    #[test]
    fn test_fingerprint_tracks_roster_changes() {
        let base = state_fingerprint(&snapshot());

        let mut joined = snapshot();
        joined.players.push(Player::new(UserId(2), "bob"));
        assert_ne!(state_fingerprint(&joined), base);

        let mut departed = snapshot();
        departed.players[0].is_active = false;
        assert_ne!(state_fingerprint(&departed), base);

        let mut scored = snapshot();
        scored.players[0].score = 7;
        assert_ne!(state_fingerprint(&scored), base);
    }

    #[test]
    fn test_should_deliver_suppresses_within_window() {
        let cache = DedupeCache::default();
        let key = (RoomCode::new("AB12"), EventKind::StateChanged, 7u64);
        let window = Duration::from_secs(5);

        assert!(cache.should_deliver(key.clone(), window));
        assert!(!cache.should_deliver(key.clone(), window));
        assert!(!cache.should_deliver(key, window));
    }

    #[test]
    fn test_should_deliver_distinguishes_fingerprints() {
        let cache = DedupeCache::default();
        let window = Duration::from_secs(5);
        assert!(cache.should_deliver((RoomCode::new("AB12"), EventKind::StateChanged, 1), window));
        assert!(cache.should_deliver((RoomCode::new("AB12"), EventKind::StateChanged, 2), window));
        assert!(cache.should_deliver((RoomCode::new("CD34"), EventKind::StateChanged, 1), window));
    }

    #[test]
    fn test_sweep_drops_expired_entries() {
        let cache = DedupeCache::default();
        cache.should_deliver((RoomCode::new("AB12"), EventKind::StateChanged, 1), Duration::ZERO);
        assert_eq!(cache.len(), 1);

        cache.sweep(Duration::from_secs(60));
        assert_eq!(cache.len(), 1, "fresh entries survive the sweep");

        cache.sweep(Duration::ZERO);
        assert_eq!(cache.len(), 0);
    }
}
