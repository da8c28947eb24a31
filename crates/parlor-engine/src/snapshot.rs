//! The persisted game state model.
//!
//! A [`Snapshot`] is the whole serialized state of one game at a point in
//! time. The store replaces snapshots wholesale; there is no move log.
//! `turn_marker` is the optimistic-concurrency version stamp: it strictly
//! increases with every accepted write, and conditional commits compare
//! against it.

use chrono::{DateTime, Utc};
use parlor_protocol::{GameId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Game kind and lifecycle status
// ---------------------------------------------------------------------------

/// Token selecting a game variant. Only the registry may branch on this.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Yatzy,
    TicTacToe,
    Rps,
    Sleuth,
}

impl GameKind {
    /// Wire token, identical to the serde representation.
    pub fn token(&self) -> &'static str {
        match self {
            GameKind::Yatzy => "yatzy",
            GameKind::TicTacToe => "tic_tac_toe",
            GameKind::Rps => "rps",
            GameKind::Sleuth => "sleuth",
        }
    }

    /// Parses a wire token. Unknown tokens are reported verbatim so the
    /// caller can surface them.
    pub fn parse(token: &str) -> Result<Self, crate::EngineError> {
        match token {
            "yatzy" => Ok(GameKind::Yatzy),
            "tic_tac_toe" => Ok(GameKind::TicTacToe),
            "rps" => Ok(GameKind::Rps),
            "sleuth" => Ok(GameKind::Sleuth),
            other => Err(crate::EngineError::UnknownKind(other.to_owned())),
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Lifecycle status of a game.
///
/// `waiting → playing → {finished, abandoned, cancelled}`; the three
/// right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Playing,
    Finished,
    Abandoned,
    Cancelled,
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GameStatus::Finished | GameStatus::Abandoned | GameStatus::Cancelled
        )
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Playing => "playing",
            GameStatus::Finished => "finished",
            GameStatus::Abandoned => "abandoned",
            GameStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Player and Move
// ---------------------------------------------------------------------------

/// One seat at the table. `id` references the external identity provider;
/// `position` is the seat order used for turn rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: UserId,
    pub name: String,
    pub score: i64,
    pub is_active: bool,
    pub position: u8,
}

impl Player {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            score: 0,
            is_active: true,
            position: 0,
        }
    }
}

/// One move as seen by the rules engine. Transient: only the resulting
/// snapshot is persisted. `player` and `timestamp` are stamped server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    #[serde(rename = "type")]
    pub kind: String,
    pub player: UserId,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Move {
    pub fn new(
        kind: impl Into<String>,
        player: UserId,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            player,
            data,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Full serialized state of one game.
///
/// Invariants: while `status` is `playing`, `current_player_index` indexes
/// an active player; `turn_marker` strictly increases with every accepted
/// write. `data` is the game-specific state, opaque to everything except
/// the machine that owns the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub game_id: GameId,
    pub kind: GameKind,
    pub players: Vec<Player>,
    pub current_player_index: usize,
    pub status: GameStatus,
    pub data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    pub last_move_at: Option<DateTime<Utc>>,
    pub turn_marker: u64,
}

impl Snapshot {
    /// The player whose turn it is, if the index is in range.
    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }

    pub fn player(&self, id: UserId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_active).count()
    }
}

// ---------------------------------------------------------------------------
// Per-player change detection
// ---------------------------------------------------------------------------

/// The per-player fields a store write may touch individually: score,
/// active flag, seat. Name changes are not tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPatch {
    pub id: UserId,
    pub score: Option<i64>,
    pub is_active: Option<bool>,
    pub position: Option<u8>,
}

impl PlayerPatch {
    pub fn is_empty(&self) -> bool {
        self.score.is_none() && self.is_active.is_none() && self.position.is_none()
    }
}

/// Computes the patches for players whose tracked fields differ between
/// two snapshots. Players new in `after` produce a full patch.
pub fn changed_players(before: &Snapshot, after: &Snapshot) -> Vec<PlayerPatch> {
    let mut patches = Vec::new();
    for player in &after.players {
        let patch = match before.player(player.id) {
            Some(old) => PlayerPatch {
                id: player.id,
                score: (player.score != old.score).then_some(player.score),
                is_active: (player.is_active != old.is_active)
                    .then_some(player.is_active),
                position: (player.position != old.position)
                    .then_some(player.position),
            },
            None => PlayerPatch {
                id: player.id,
                score: Some(player.score),
                is_active: Some(player.is_active),
                position: Some(player.position),
            },
        };
        if !patch.is_empty() {
            patches.push(patch);
        }
    }
    patches
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_players(players: Vec<Player>) -> Snapshot {
        Snapshot {
            game_id: GameId(1),
            kind: GameKind::TicTacToe,
            players,
            current_player_index: 0,
            status: GameStatus::Playing,
            data: serde_json::Value::Null,
            updated_at: Utc::now(),
            last_move_at: None,
            turn_marker: 1,
        }
    }

    fn seated(id: u64, score: i64, position: u8) -> Player {
        Player {
            id: UserId(id),
            name: format!("p{id}"),
            score,
            is_active: true,
            position,
        }
    }

    #[test]
    fn test_game_kind_token_round_trip() {
        for kind in [
            GameKind::Yatzy,
            GameKind::TicTacToe,
            GameKind::Rps,
            GameKind::Sleuth,
        ] {
            assert_eq!(GameKind::parse(kind.token()).unwrap(), kind);
        }
    }

    #[test]
    fn test_game_kind_parse_unknown_fails() {
        let err = GameKind::parse("chess").unwrap_err();
        assert!(err.to_string().contains("chess"));
    }

    #[test]
    fn test_game_kind_serde_matches_token() {
        let json = serde_json::to_string(&GameKind::TicTacToe).unwrap();
        assert_eq!(json, "\"tic_tac_toe\"");
    }

    #[test]
    fn test_game_status_terminal_states() {
        assert!(!GameStatus::Waiting.is_terminal());
        assert!(!GameStatus::Playing.is_terminal());
        assert!(GameStatus::Finished.is_terminal());
        assert!(GameStatus::Abandoned.is_terminal());
        assert!(GameStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_snapshot_serializes_expected_field_names() {
        let snap = snapshot_with_players(vec![seated(5, 0, 0)]);
        let json: serde_json::Value = serde_json::to_value(&snap).unwrap();

        assert_eq!(json["game_id"], 1);
        assert_eq!(json["kind"], "tic_tac_toe");
        assert_eq!(json["status"], "playing");
        assert_eq!(json["current_player_index"], 0);
        assert_eq!(json["turn_marker"], 1);
        assert_eq!(json["players"][0]["id"], 5);
        assert_eq!(json["players"][0]["is_active"], true);
    }

    #[test]
    fn test_move_type_field_is_renamed() {
        let mv = Move::new("roll", UserId(1), serde_json::json!({}));
        let json: serde_json::Value = serde_json::to_value(&mv).unwrap();
        assert_eq!(json["type"], "roll");
        assert_eq!(json["player"], 1);
    }

    #[test]
    fn test_changed_players_empty_when_identical() {
        let before = snapshot_with_players(vec![seated(1, 10, 0), seated(2, 5, 1)]);
        let after = before.clone();
        assert!(changed_players(&before, &after).is_empty());
    }

    #[test]
    fn test_changed_players_only_touched_fields() {
        let before = snapshot_with_players(vec![seated(1, 10, 0), seated(2, 5, 1)]);
        let mut after = before.clone();
        after.players[1].score = 8;

        let patches = changed_players(&before, &after);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].id, UserId(2));
        assert_eq!(patches[0].score, Some(8));
        assert_eq!(patches[0].is_active, None);
        assert_eq!(patches[0].position, None);
    }

    #[test]
    fn test_changed_players_inactive_flag() {
        let before = snapshot_with_players(vec![seated(1, 0, 0)]);
        let mut after = before.clone();
        after.players[0].is_active = false;

        let patches = changed_players(&before, &after);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].is_active, Some(false));
    }

    #[test]
    fn test_changed_players_new_player_is_full_patch() {
        let before = snapshot_with_players(vec![seated(1, 0, 0)]);
        let mut after = before.clone();
        after.players.push(seated(2, 0, 1));

        let patches = changed_players(&before, &after);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].id, UserId(2));
        assert_eq!(patches[0].score, Some(0));
        assert_eq!(patches[0].is_active, Some(true));
        assert_eq!(patches[0].position, Some(1));
    }

    #[test]
    fn test_current_player_out_of_range_is_none() {
        let mut snap = snapshot_with_players(vec![seated(1, 0, 0)]);
        snap.current_player_index = 9;
        assert!(snap.current_player().is_none());
    }
}
