//! Shared table bookkeeping embedded by every game machine: seating,
//! lifecycle status, turn rotation over active players, timestamps.
//!
//! Rules code stays in the game modules; everything a variant would
//! otherwise duplicate lives here.

use chrono::{DateTime, Utc};
use parlor_protocol::{GameId, UserId};
use rand::seq::SliceRandom;

use crate::error::EngineError;
use crate::snapshot::{GameKind, GameStatus, Player, Snapshot};

#[derive(Debug, Clone)]
pub struct Table {
    pub id: GameId,
    pub kind: GameKind,
    pub players: Vec<Player>,
    pub current: usize,
    pub status: GameStatus,
    pub turn_marker: u64,
    pub updated_at: DateTime<Utc>,
    pub last_move_at: Option<DateTime<Utc>>,
    min_players: u8,
    max_players: u8,
}

impl Table {
    pub fn new(id: GameId, kind: GameKind, min_players: u8, max_players: u8) -> Self {
        Self {
            id,
            kind,
            players: Vec::new(),
            current: 0,
            status: GameStatus::Waiting,
            turn_marker: 0,
            updated_at: Utc::now(),
            last_move_at: None,
            min_players,
            max_players,
        }
    }

    /// Rebuilds the bookkeeping from a persisted snapshot. The snapshot's
    /// structural invariants are checked here once so the rules code can
    /// trust them.
    pub fn from_snapshot(
        snap: &Snapshot,
        min_players: u8,
        max_players: u8,
    ) -> Result<Self, EngineError> {
        if snap.status == GameStatus::Playing {
            match snap.players.get(snap.current_player_index) {
                Some(p) if p.is_active => {}
                _ => {
                    return Err(EngineError::Corrupted(format!(
                        "current_player_index {} does not reference an active player",
                        snap.current_player_index
                    )));
                }
            }
        }
        Ok(Self {
            id: snap.game_id,
            kind: snap.kind,
            players: snap.players.clone(),
            current: snap.current_player_index,
            status: snap.status,
            turn_marker: snap.turn_marker,
            updated_at: snap.updated_at,
            last_move_at: snap.last_move_at,
            min_players,
            max_players,
        })
    }

    /// Seats a player. Only allowed before the game starts.
    pub fn join(&mut self, mut player: Player) -> Result<(), EngineError> {
        if self.status != GameStatus::Waiting {
            return Err(EngineError::WrongStatus(self.status));
        }
        if self.players.iter().any(|p| p.id == player.id) {
            return Err(EngineError::AlreadyJoined(player.id));
        }
        if self.players.len() >= self.max_players as usize {
            return Err(EngineError::GameFull(self.max_players));
        }
        player.position = self.players.len() as u8;
        self.players.push(player);
        self.touch();
        Ok(())
    }

    /// Moves the table from `waiting` to `playing` with the first seat as
    /// the initial actor.
    pub fn begin(&mut self) -> Result<(), EngineError> {
        if self.status != GameStatus::Waiting {
            return Err(EngineError::WrongStatus(self.status));
        }
        let have = self.players.len() as u8;
        if have < self.min_players || have > self.max_players {
            return Err(EngineError::BadPlayerCount {
                have,
                min: self.min_players,
                max: self.max_players,
            });
        }
        self.status = GameStatus::Playing;
        self.current = 0;
        self.touch();
        Ok(())
    }

    /// Randomizes seat order; positions are rewritten to match.
    pub fn shuffle_seats(&mut self) {
        let mut rng = rand::rng();
        self.players.shuffle(&mut rng);
        for (idx, player) in self.players.iter_mut().enumerate() {
            player.position = idx as u8;
        }
    }

    pub fn player(&self, id: UserId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: UserId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn require_player(&self, id: UserId) -> Result<&Player, EngineError> {
        self.player(id).ok_or(EngineError::UnknownPlayer(id))
    }

    pub fn require_playing(&self) -> Result<(), EngineError> {
        if self.status != GameStatus::Playing {
            return Err(EngineError::WrongStatus(self.status));
        }
        Ok(())
    }

    /// Checks that the game is live and it is `id`'s turn.
    pub fn require_turn(&self, id: UserId) -> Result<(), EngineError> {
        self.require_playing()?;
        self.require_player(id)?;
        match self.players.get(self.current) {
            Some(p) if p.id == id => Ok(()),
            _ => Err(EngineError::NotYourTurn(id)),
        }
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current)
    }

    pub fn active_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_active).count()
    }

    pub fn active_ids(&self) -> Vec<UserId> {
        self.players
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.id)
            .collect()
    }

    /// Advances `current` to the next active seat, wrapping. Leaves it
    /// unchanged when no other seat is active.
    pub fn advance_turn(&mut self) {
        let len = self.players.len();
        if len == 0 {
            return;
        }
        for step in 1..=len {
            let idx = (self.current + step) % len;
            if self.players[idx].is_active {
                self.current = idx;
                return;
            }
        }
    }

    pub fn finish(&mut self) {
        self.status = GameStatus::Finished;
        self.touch();
    }

    pub fn abandon(&mut self) {
        self.status = GameStatus::Abandoned;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Stamps both move-related timestamps.
    pub fn record_move(&mut self) {
        let now = Utc::now();
        self.last_move_at = Some(now);
        self.updated_at = now;
    }

    /// Marks a seat inactive. Returns `true` when it was that player's
    /// turn; if so and `advance` is set, the turn moves on.
    pub fn mark_inactive(
        &mut self,
        id: UserId,
        advance: bool,
    ) -> Result<bool, EngineError> {
        let idx = self
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or(EngineError::UnknownPlayer(id))?;
        self.players[idx].is_active = false;
        let was_their_turn = self.status == GameStatus::Playing && self.current == idx;
        if was_their_turn && advance {
            self.advance_turn();
        }
        self.touch();
        Ok(was_their_turn)
    }

    /// Builds the snapshot for this table around the game-specific data.
    pub fn snapshot_with(&self, data: serde_json::Value) -> Snapshot {
        Snapshot {
            game_id: self.id,
            kind: self.kind,
            players: self.players.clone(),
            current_player_index: self.current,
            status: self.status,
            data,
            updated_at: self.updated_at,
            last_move_at: self.last_move_at,
            turn_marker: self.turn_marker,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table_for(n: usize) -> Table {
        let mut table = Table::new(GameId(1), GameKind::Yatzy, 2, 4);
        for i in 0..n {
            table
                .join(Player::new(UserId(i as u64 + 1), format!("p{i}")))
                .unwrap();
        }
        table
    }

    #[test]
    fn test_join_assigns_positions_in_order() {
        let table = table_for(3);
        let positions: Vec<u8> = table.players.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_join_duplicate_rejected() {
        let mut table = table_for(1);
        let err = table.join(Player::new(UserId(1), "again")).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyJoined(UserId(1))));
    }

    #[test]
    fn test_join_after_start_rejected() {
        let mut table = table_for(2);
        table.begin().unwrap();
        let err = table.join(Player::new(UserId(9), "late")).unwrap_err();
        assert!(matches!(err, EngineError::WrongStatus(GameStatus::Playing)));
    }

    #[test]
    fn test_join_when_full_rejected() {
        let mut table = table_for(4);
        let err = table.join(Player::new(UserId(9), "fifth")).unwrap_err();
        assert!(matches!(err, EngineError::GameFull(4)));
    }

    #[test]
    fn test_begin_below_minimum_rejected() {
        let mut table = table_for(1);
        let err = table.begin().unwrap_err();
        assert!(matches!(
            err,
            EngineError::BadPlayerCount { have: 1, min: 2, max: 4 }
        ));
    }

    #[test]
    fn test_begin_sets_playing_and_first_actor() {
        let mut table = table_for(2);
        table.begin().unwrap();
        assert_eq!(table.status, GameStatus::Playing);
        assert_eq!(table.current, 0);
    }

    #[test]
    fn test_advance_turn_skips_inactive() {
        let mut table = table_for(3);
        table.begin().unwrap();
        table.players[1].is_active = false;

        table.advance_turn();
        assert_eq!(table.current, 2, "seat 1 is inactive and must be skipped");

        table.advance_turn();
        assert_eq!(table.current, 0);
    }

    #[test]
    fn test_advance_turn_sole_active_stays_put() {
        let mut table = table_for(2);
        table.begin().unwrap();
        table.players[1].is_active = false;

        table.advance_turn();
        assert_eq!(table.current, 0);
    }

    #[test]
    fn test_require_turn_wrong_player() {
        let mut table = table_for(2);
        table.begin().unwrap();
        let err = table.require_turn(UserId(2)).unwrap_err();
        assert!(matches!(err, EngineError::NotYourTurn(UserId(2))));
    }

    #[test]
    fn test_require_turn_unknown_player() {
        let mut table = table_for(2);
        table.begin().unwrap();
        let err = table.require_turn(UserId(42)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPlayer(UserId(42))));
    }

    #[test]
    fn test_mark_inactive_reports_turn_and_advances() {
        let mut table = table_for(3);
        table.begin().unwrap();

        let was_turn = table.mark_inactive(UserId(1), true).unwrap();
        assert!(was_turn);
        assert_eq!(table.current, 1);

        let was_turn = table.mark_inactive(UserId(3), true).unwrap();
        assert!(!was_turn, "seat 3 was not the current actor");
        assert_eq!(table.current, 1);
    }

    #[test]
    fn test_from_snapshot_rejects_bad_current_index() {
        let mut table = table_for(2);
        table.begin().unwrap();
        let mut snap = table.snapshot_with(serde_json::Value::Null);
        snap.current_player_index = 7;

        let err = Table::from_snapshot(&snap, 2, 4).unwrap_err();
        assert!(matches!(err, EngineError::Corrupted(_)));
    }

    #[test]
    fn test_from_snapshot_rejects_inactive_current_player() {
        let mut table = table_for(2);
        table.begin().unwrap();
        let mut snap = table.snapshot_with(serde_json::Value::Null);
        snap.players[0].is_active = false;

        let err = Table::from_snapshot(&snap, 2, 4).unwrap_err();
        assert!(matches!(err, EngineError::Corrupted(_)));
    }

    #[test]
    fn test_snapshot_round_trip_preserves_bookkeeping() {
        let mut table = table_for(2);
        table.begin().unwrap();
        table.record_move();
        let snap = table.snapshot_with(serde_json::json!({ "x": 1 }));

        let rebuilt = Table::from_snapshot(&snap, 2, 4).unwrap();
        assert_eq!(rebuilt.status, GameStatus::Playing);
        assert_eq!(rebuilt.players, table.players);
        assert_eq!(rebuilt.turn_marker, table.turn_marker);
        assert_eq!(rebuilt.last_move_at, table.last_move_at);
    }

    #[test]
    fn test_shuffle_seats_rewrites_positions() {
        let mut table = table_for(4);
        table.shuffle_seats();

        let positions: Vec<u8> = table.players.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);

        let mut ids: Vec<u64> = table.players.iter().map(|p| p.id.0).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4], "shuffle must not lose a seat");
    }
}
