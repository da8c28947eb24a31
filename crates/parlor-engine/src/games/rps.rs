//! Rock-paper-scissors, first to a target number of round wins.
//!
//! Both players submit simultaneously; a round resolves when every
//! active player has a pending choice. There is no turn order here, so
//! the current-player index stays parked on seat 0.

use std::collections::BTreeMap;

use parlor_protocol::{GameId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::games::{decode_data, encode_data, parse_move_data};
use crate::machine::{GameMachine, Outcome};
use crate::snapshot::{GameKind, GameStatus, Move, Player, Snapshot};
use crate::table::Table;

pub const MIN_PLAYERS: u8 = 2;
pub const MAX_PLAYERS: u8 = 2;

pub const MOVE_CHOOSE: &str = "choose";

pub const DEFAULT_TARGET_WINS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Rock,
    Paper,
    Scissors,
}

impl Choice {
    pub fn beats(self, other: Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Rock, Choice::Scissors)
                | (Choice::Paper, Choice::Rock)
                | (Choice::Scissors, Choice::Paper)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RoundResult {
    Draw,
    Won { by: UserId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RpsData {
    target_wins: u32,
    round: u32,
    /// Choices submitted for the round in progress. Hidden resolution:
    /// cleared the instant the round resolves.
    pending: BTreeMap<UserId, Choice>,
    /// The previous round, revealed.
    last_round: Option<(BTreeMap<UserId, Choice>, RoundResult)>,
    winner: Option<UserId>,
}

impl RpsData {
    fn with_target(target_wins: u32) -> Self {
        Self {
            target_wins,
            round: 1,
            pending: BTreeMap::new(),
            last_round: None,
            winner: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChooseParams {
    choice: Choice,
}

#[derive(Debug)]
pub struct RpsMachine {
    table: Table,
    data: RpsData,
}

impl RpsMachine {
    pub fn new(id: GameId) -> Self {
        Self::with_target(id, DEFAULT_TARGET_WINS)
    }

    pub fn with_target(id: GameId, target_wins: u32) -> Self {
        Self {
            table: Table::new(id, GameKind::Rps, MIN_PLAYERS, MAX_PLAYERS),
            data: RpsData::with_target(target_wins.max(1)),
        }
    }

    pub fn from_snapshot(snap: &Snapshot) -> Result<Self, EngineError> {
        if snap.kind != GameKind::Rps {
            return Err(EngineError::Corrupted(format!(
                "snapshot is for {}, not rps",
                snap.kind
            )));
        }
        Ok(Self {
            table: Table::from_snapshot(snap, MIN_PLAYERS, MAX_PLAYERS)?,
            data: decode_data(snap)?,
        })
    }

    fn resolve_round(&mut self) {
        let choices = std::mem::take(&mut self.data.pending);
        let distinct: Vec<Choice> = {
            let mut seen = Vec::new();
            for &c in choices.values() {
                if !seen.contains(&c) {
                    seen.push(c);
                }
            }
            seen
        };

        let result = if distinct.len() != 2 {
            // All identical (or all three thrown, impossible with two
            // players): nobody scores.
            RoundResult::Draw
        } else {
            let winning = if distinct[0].beats(distinct[1]) {
                distinct[0]
            } else {
                distinct[1]
            };
            let by = choices
                .iter()
                .find(|&(_, &c)| c == winning)
                .map(|(&id, _)| id);
            match by {
                Some(by) => RoundResult::Won { by },
                None => RoundResult::Draw,
            }
        };

        if let RoundResult::Won { by } = result {
            if let Some(p) = self.table.player_mut(by) {
                p.score += 1;
                if p.score >= self.data.target_wins as i64 {
                    self.data.winner = Some(by);
                }
            }
        }

        self.data.last_round = Some((choices, result));
        self.data.round += 1;
        if self.data.winner.is_some() {
            self.table.finish();
        }
    }
}

impl GameMachine for RpsMachine {
    fn kind(&self) -> GameKind {
        GameKind::Rps
    }

    fn join(&mut self, player: Player) -> Result<(), EngineError> {
        self.table.join(player)
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.table.begin()
    }

    fn validate(&self, mv: &Move) -> Result<(), EngineError> {
        self.table.require_playing()?;
        let player = self.table.require_player(mv.player)?;
        if !player.is_active {
            return Err(EngineError::InvalidMove(format!(
                "{} is no longer in the game",
                mv.player
            )));
        }
        if mv.kind != MOVE_CHOOSE {
            return Err(EngineError::InvalidMove(format!(
                "unknown move '{}'",
                mv.kind
            )));
        }
        parse_move_data::<ChooseParams>(mv)?;
        if self.data.pending.contains_key(&mv.player) {
            return Err(EngineError::InvalidMove(
                "already chose this round".into(),
            ));
        }
        Ok(())
    }

    fn apply(&mut self, mv: &Move) -> Result<(), EngineError> {
        let params: ChooseParams = parse_move_data(mv)?;
        self.data.pending.insert(mv.player, params.choice);
        self.table.record_move();

        if self.data.pending.len() >= self.table.active_count() {
            self.resolve_round();
        }
        Ok(())
    }

    fn outcome(&self) -> Option<Outcome> {
        if self.table.status != GameStatus::Finished {
            return None;
        }
        Some(match self.data.winner {
            Some(winner) => Outcome::winner(winner),
            None => Outcome::Draw,
        })
    }

    fn mark_inactive(&mut self, user: UserId) -> Result<(), EngineError> {
        self.table.mark_inactive(user, true)?;
        self.data.pending.remove(&user);
        match self.table.status {
            GameStatus::Playing => match self.table.active_ids().as_slice() {
                [last] => {
                    let last = *last;
                    self.data.winner = Some(last);
                    self.table.finish();
                }
                [] => self.table.abandon(),
                _ => {}
            },
            GameStatus::Waiting if self.table.active_count() == 0 => {
                self.table.abandon();
            }
            _ => {}
        }
        Ok(())
    }

    fn suggest_move(&self, user: UserId) -> Option<Move> {
        if self.table.status != GameStatus::Playing {
            return None;
        }
        let player = self.table.player(user)?;
        if !player.is_active || self.data.pending.contains_key(&user) {
            return None;
        }
        use rand::seq::IndexedRandom;
        let mut rng = rand::rng();
        let choice = *[Choice::Rock, Choice::Paper, Choice::Scissors].choose(&mut rng)?;
        let data = serde_json::to_value(ChooseParams { choice }).ok()?;
        Some(Move::new(MOVE_CHOOSE, user, data))
    }

    fn snapshot(&self) -> Result<Snapshot, EngineError> {
        Ok(self.table.snapshot_with(encode_data(&self.data)?))
    }
}

// =========================================================================
// Tests
// =========================================================================
