//! Sleuth, a social deduction game. One player is secretly the
//! imposter; the rest share a prompt. Play moves through four phases:
//!
//!   reveal       all players confirm they have seen their role
//!   questioning  round-robin questions, capped by count or clock
//!   voting       every active player casts one vote
//!   results      plurality accusation, winners scored
//!
//! Phase barriers re-check on departures so a leaver can never wedge
//! the game.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use parlor_protocol::{GameId, UserId};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::games::{decode_data, encode_data, parse_move_data};
use crate::machine::{GameMachine, Outcome};
use crate::snapshot::{GameKind, GameStatus, Move, Player, Snapshot};
use crate::table::Table;

pub const MIN_PLAYERS: u8 = 3;
pub const MAX_PLAYERS: u8 = 8;

pub const MOVE_READY: &str = "ready";
pub const MOVE_QUESTION: &str = "question";
pub const MOVE_VOTE: &str = "vote";

/// Each player asks twice on average before the vote.
const QUESTIONS_PER_PLAYER: u32 = 2;
const QUESTION_WINDOW_SECS: i64 = 180;

const PROMPTS: [&str; 8] = [
    "the night train",
    "a lighthouse",
    "the museum vault",
    "a space station",
    "the casino floor",
    "a submarine",
    "the opera house",
    "a polar research base",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Reveal,
    Questioning,
    Voting,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Sleuth,
    Imposter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub from: UserId,
    pub to: UserId,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SleuthData {
    phase: Phase,
    roles: BTreeMap<UserId, Role>,
    prompt: String,
    ready: BTreeSet<UserId>,
    questions: Vec<Question>,
    question_quota: u32,
    questioning_ends_at: Option<DateTime<Utc>>,
    votes: BTreeMap<UserId, UserId>,
    accused: Option<UserId>,
    winners: Vec<UserId>,
}

impl Default for SleuthData {
    fn default() -> Self {
        Self {
            phase: Phase::Reveal,
            roles: BTreeMap::new(),
            prompt: String::new(),
            ready: BTreeSet::new(),
            questions: Vec::new(),
            question_quota: 0,
            questioning_ends_at: None,
            votes: BTreeMap::new(),
            accused: None,
            winners: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuestionParams {
    target: UserId,
    text: String,
}

#[derive(Debug, Deserialize)]
struct VoteParams {
    suspect: UserId,
}

#[derive(Debug)]
pub struct SleuthMachine {
    table: Table,
    data: SleuthData,
}

impl SleuthMachine {
    pub fn new(id: GameId) -> Self {
        Self {
            table: Table::new(id, GameKind::Sleuth, MIN_PLAYERS, MAX_PLAYERS),
            data: SleuthData::default(),
        }
    }

    pub fn from_snapshot(snap: &Snapshot) -> Result<Self, EngineError> {
        if snap.kind != GameKind::Sleuth {
            return Err(EngineError::Corrupted(format!(
                "snapshot is for {}, not sleuth",
                snap.kind
            )));
        }
        Ok(Self {
            table: Table::from_snapshot(snap, MIN_PLAYERS, MAX_PLAYERS)?,
            data: decode_data(snap)?,
        })
    }

    pub fn phase(&self) -> Phase {
        self.data.phase
    }

    fn imposter(&self) -> Option<UserId> {
        self.data
            .roles
            .iter()
            .find(|&(_, &role)| role == Role::Imposter)
            .map(|(&id, _)| id)
    }

    fn is_active(&self, user: UserId) -> bool {
        self.table.player(user).is_some_and(|p| p.is_active)
    }

    fn require_active(&self, user: UserId) -> Result<(), EngineError> {
        self.table.require_player(user)?;
        if !self.is_active(user) {
            return Err(EngineError::InvalidMove(format!(
                "{user} is no longer in the game"
            )));
        }
        Ok(())
    }

    fn require_phase(&self, phase: Phase) -> Result<(), EngineError> {
        if self.data.phase != phase {
            return Err(EngineError::InvalidMove(format!(
                "move not allowed during the {:?} phase",
                self.data.phase
            )));
        }
        Ok(())
    }

    fn all_active_ready(&self) -> bool {
        let active = self.table.active_ids();
        !active.is_empty() && active.iter().all(|id| self.data.ready.contains(id))
    }

    fn all_active_voted(&self) -> bool {
        let active = self.table.active_ids();
        !active.is_empty() && active.iter().all(|id| self.data.votes.contains_key(id))
    }

    fn questioning_over(&self, now: DateTime<Utc>) -> bool {
        self.data.questions.len() as u32 >= self.data.question_quota
            || self
                .data
                .questioning_ends_at
                .is_some_and(|ends| now >= ends)
    }

    fn enter_questioning(&mut self) {
        self.data.phase = Phase::Questioning;
        self.data.questioning_ends_at =
            Some(Utc::now() + Duration::seconds(QUESTION_WINDOW_SECS));
        if let Some(first) = self.table.players.iter().position(|p| p.is_active) {
            self.table.current = first;
        }
        self.table.touch();
    }

    fn enter_voting(&mut self) {
        self.data.phase = Phase::Voting;
        self.data.questioning_ends_at = None;
        self.table.touch();
    }

    /// Scores `winners` and closes the game.
    fn conclude(&mut self, winners: Vec<UserId>) {
        for &id in &winners {
            if let Some(p) = self.table.player_mut(id) {
                p.score += 1;
            }
        }
        self.data.winners = winners;
        self.data.phase = Phase::Results;
        self.table.finish();
    }

    fn active_sleuths(&self) -> Vec<UserId> {
        self.table
            .players
            .iter()
            .filter(|p| p.is_active && self.data.roles.get(&p.id) == Some(&Role::Sleuth))
            .map(|p| p.id)
            .collect()
    }

    /// Plurality wins; a shared top count accuses nobody, which lets the
    /// imposter walk.
    fn tally_votes(&mut self) {
        let mut counts: BTreeMap<UserId, u32> = BTreeMap::new();
        for &suspect in self.data.votes.values() {
            *counts.entry(suspect).or_insert(0) += 1;
        }
        let top = counts.values().copied().max().unwrap_or(0);
        let leaders: Vec<UserId> = counts
            .iter()
            .filter(|&(_, &n)| n == top)
            .map(|(&s, _)| s)
            .collect();
        self.data.accused = match leaders.as_slice() {
            [single] if top > 0 => Some(*single),
            _ => None,
        };

        let imposter = self.imposter();
        let winners = if imposter.is_some() && self.data.accused == imposter {
            self.active_sleuths()
        } else {
            imposter.into_iter().collect()
        };
        self.conclude(winners);
    }

    /// Re-runs the current phase barrier. After a departure the
    /// remaining players may already satisfy it.
    fn check_barrier(&mut self) {
        match self.data.phase {
            Phase::Reveal => {
                if self.all_active_ready() {
                    self.enter_questioning();
                }
            }
            Phase::Questioning => {
                if self.questioning_over(Utc::now()) {
                    self.enter_voting();
                }
            }
            Phase::Voting => {
                if self.all_active_voted() {
                    self.tally_votes();
                }
            }
            Phase::Results => {}
        }
    }
}

impl GameMachine for SleuthMachine {
    fn kind(&self) -> GameKind {
        GameKind::Sleuth
    }

    fn join(&mut self, player: Player) -> Result<(), EngineError> {
        self.table.join(player)
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.table.begin()?;
        self.table.shuffle_seats();

        let mut rng = rand::rng();
        let imposter_seat = rng.random_range(0..self.table.players.len());
        for (seat, player) in self.table.players.iter().enumerate() {
            let role = if seat == imposter_seat {
                Role::Imposter
            } else {
                Role::Sleuth
            };
            self.data.roles.insert(player.id, role);
        }
        self.data.prompt = PROMPTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(PROMPTS[0])
            .to_string();
        self.data.question_quota =
            QUESTIONS_PER_PLAYER * self.table.players.len() as u32;
        Ok(())
    }

    fn validate(&self, mv: &Move) -> Result<(), EngineError> {
        self.table.require_playing()?;
        self.require_active(mv.player)?;
        match mv.kind.as_str() {
            MOVE_READY => {
                self.require_phase(Phase::Reveal)?;
                if self.data.ready.contains(&mv.player) {
                    return Err(EngineError::InvalidMove(
                        "already marked ready".into(),
                    ));
                }
                Ok(())
            }
            MOVE_QUESTION => {
                self.require_phase(Phase::Questioning)?;
                self.table.require_turn(mv.player)?;
                let params: QuestionParams = parse_move_data(mv)?;
                if params.target == mv.player {
                    return Err(EngineError::InvalidMove(
                        "cannot question yourself".into(),
                    ));
                }
                if !self.is_active(params.target) {
                    return Err(EngineError::InvalidMove(format!(
                        "{} is not an active player",
                        params.target
                    )));
                }
                if params.text.trim().is_empty() {
                    return Err(EngineError::InvalidMove(
                        "question text is empty".into(),
                    ));
                }
                Ok(())
            }
            MOVE_VOTE => {
                self.require_phase(Phase::Voting)?;
                if self.data.votes.contains_key(&mv.player) {
                    return Err(EngineError::InvalidMove("already voted".into()));
                }
                let params: VoteParams = parse_move_data(mv)?;
                if !self.is_active(params.suspect) {
                    return Err(EngineError::InvalidMove(format!(
                        "{} is not an active player",
                        params.suspect
                    )));
                }
                Ok(())
            }
            other => Err(EngineError::InvalidMove(format!("unknown move '{other}'"))),
        }
    }

    fn apply(&mut self, mv: &Move) -> Result<(), EngineError> {
        match mv.kind.as_str() {
            MOVE_READY => {
                self.data.ready.insert(mv.player);
                self.table.record_move();
                if self.all_active_ready() {
                    self.enter_questioning();
                }
            }
            MOVE_QUESTION => {
                let params: QuestionParams = parse_move_data(mv)?;
                self.data.questions.push(Question {
                    from: mv.player,
                    to: params.target,
                    text: params.text,
                });
                self.table.record_move();
                self.table.advance_turn();
                // Cutoff is lazy: the question that crosses the count or
                // the clock closes the phase behind it.
                if self.questioning_over(mv.timestamp) {
                    self.enter_voting();
                }
            }
            MOVE_VOTE => {
                let params: VoteParams = parse_move_data(mv)?;
                self.data.votes.insert(mv.player, params.suspect);
                self.table.record_move();
                if self.all_active_voted() {
                    self.tally_votes();
                }
            }
            other => {
                return Err(EngineError::InvalidMove(format!("unknown move '{other}'")));
            }
        }
        Ok(())
    }

    fn outcome(&self) -> Option<Outcome> {
        if self.table.status != GameStatus::Finished {
            return None;
        }
        Some(if self.data.winners.is_empty() {
            Outcome::Draw
        } else {
            Outcome::Winners(self.data.winners.clone())
        })
    }

    fn mark_inactive(&mut self, user: UserId) -> Result<(), EngineError> {
        self.table.mark_inactive(user, true)?;
        self.data.ready.remove(&user);
        self.data.votes.remove(&user);

        if self.table.status != GameStatus::Playing {
            return Ok(());
        }
        if self.data.roles.get(&user) == Some(&Role::Imposter) {
            // The imposter fleeing is a confession.
            let sleuths = self.active_sleuths();
            self.conclude(sleuths);
            return Ok(());
        }
        if self.table.active_count() < MIN_PLAYERS as usize {
            let winners = self.imposter().into_iter().collect();
            self.conclude(winners);
            return Ok(());
        }
        self.check_barrier();
        Ok(())
    }

    fn suggest_move(&self, user: UserId) -> Option<Move> {
        if self.table.status != GameStatus::Playing || !self.is_active(user) {
            return None;
        }
        match self.data.phase {
            Phase::Reveal => {
                if self.data.ready.contains(&user) {
                    return None;
                }
                Some(Move::new(MOVE_READY, user, serde_json::Value::Null))
            }
            Phase::Questioning => {
                if self.table.require_turn(user).is_err() {
                    return None;
                }
                let mut rng = rand::rng();
                let others: Vec<UserId> = self
                    .table
                    .active_ids()
                    .into_iter()
                    .filter(|&id| id != user)
                    .collect();
                let target = *others.choose(&mut rng)?;
                Some(Move::new(
                    MOVE_QUESTION,
                    user,
                    serde_json::json!({
                        "target": target,
                        "text": "What is the first thing you noticed here?",
                    }),
                ))
            }
            Phase::Voting => {
                if self.data.votes.contains_key(&user) {
                    return None;
                }
                let mut rng = rand::rng();
                let others: Vec<UserId> = self
                    .table
                    .active_ids()
                    .into_iter()
                    .filter(|&id| id != user)
                    .collect();
                let suspect = *others.choose(&mut rng)?;
                Some(Move::new(
                    MOVE_VOTE,
                    user,
                    serde_json::json!({ "suspect": suspect }),
                ))
            }
            Phase::Results => None,
        }
    }

    fn snapshot(&self) -> Result<Snapshot, EngineError> {
        Ok(self.table.snapshot_with(encode_data(&self.data)?))
    }
}

// =========================================================================
// Tests
// =========================================================================
