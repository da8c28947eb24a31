//! Yatzy: up to three rolls per turn with held dice, thirteen scoring
//! categories, and a 35 point bonus for an upper section of 63+.

use std::collections::BTreeMap;

use parlor_protocol::{GameId, UserId};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::games::{decode_data, encode_data, parse_move_data};
use crate::machine::{GameMachine, Outcome};
use crate::snapshot::{GameKind, GameStatus, Move, Player, Snapshot};
use crate::table::Table;

pub const MIN_PLAYERS: u8 = 1;
pub const MAX_PLAYERS: u8 = 6;

pub const MOVE_ROLL: &str = "roll";
pub const MOVE_SCORE: &str = "score";

const MAX_ROLLS_PER_TURN: u8 = 3;
const UPPER_BONUS_THRESHOLD: u32 = 63;
const UPPER_BONUS: u32 = 35;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ones,
    Twos,
    Threes,
    Fours,
    Fives,
    Sixes,
    ThreeOfAKind,
    FourOfAKind,
    FullHouse,
    SmallStraight,
    LargeStraight,
    Yatzy,
    Chance,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::Ones,
        Category::Twos,
        Category::Threes,
        Category::Fours,
        Category::Fives,
        Category::Sixes,
        Category::ThreeOfAKind,
        Category::FourOfAKind,
        Category::FullHouse,
        Category::SmallStraight,
        Category::LargeStraight,
        Category::Yatzy,
        Category::Chance,
    ];

    /// The die face counted by an upper-section category.
    fn upper_face(self) -> Option<u8> {
        match self {
            Category::Ones => Some(1),
            Category::Twos => Some(2),
            Category::Threes => Some(3),
            Category::Fours => Some(4),
            Category::Fives => Some(5),
            Category::Sixes => Some(6),
            _ => None,
        }
    }

    fn token(self) -> &'static str {
        match self {
            Category::Ones => "ones",
            Category::Twos => "twos",
            Category::Threes => "threes",
            Category::Fours => "fours",
            Category::Fives => "fives",
            Category::Sixes => "sixes",
            Category::ThreeOfAKind => "three_of_a_kind",
            Category::FourOfAKind => "four_of_a_kind",
            Category::FullHouse => "full_house",
            Category::SmallStraight => "small_straight",
            Category::LargeStraight => "large_straight",
            Category::Yatzy => "yatzy",
            Category::Chance => "chance",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

fn face_counts(dice: &[u8; 5]) -> [u8; 7] {
    let mut counts = [0u8; 7];
    for &d in dice {
        counts[d as usize] += 1;
    }
    counts
}

/// Points `dice` are worth in `category` under standard scoring.
pub fn score_for(category: Category, dice: &[u8; 5]) -> u32 {
    let counts = face_counts(dice);
    let sum: u32 = dice.iter().map(|&d| u32::from(d)).sum();
    let face_sum = |face: u8| u32::from(counts[face as usize]) * u32::from(face);

    match category {
        Category::Ones => face_sum(1),
        Category::Twos => face_sum(2),
        Category::Threes => face_sum(3),
        Category::Fours => face_sum(4),
        Category::Fives => face_sum(5),
        Category::Sixes => face_sum(6),
        Category::ThreeOfAKind => {
            if counts.iter().any(|&c| c >= 3) { sum } else { 0 }
        }
        Category::FourOfAKind => {
            if counts.iter().any(|&c| c >= 4) { sum } else { 0 }
        }
        Category::FullHouse => {
            let has_three = counts.iter().any(|&c| c == 3);
            let has_pair = counts.iter().any(|&c| c == 2);
            if has_three && has_pair { 25 } else { 0 }
        }
        Category::SmallStraight => {
            let run = |faces: [u8; 4]| faces.iter().all(|&f| counts[f as usize] >= 1);
            if run([1, 2, 3, 4]) || run([2, 3, 4, 5]) || run([3, 4, 5, 6]) {
                30
            } else {
                0
            }
        }
        Category::LargeStraight => {
            let run = |faces: [u8; 5]| faces.iter().all(|&f| counts[f as usize] >= 1);
            if run([1, 2, 3, 4, 5]) || run([2, 3, 4, 5, 6]) {
                40
            } else {
                0
            }
        }
        Category::Yatzy => {
            if counts.iter().any(|&c| c == 5) { 50 } else { 0 }
        }
        Category::Chance => sum,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreCard {
    filled: BTreeMap<Category, u32>,
}

impl ScoreCard {
    pub fn upper_total(&self) -> u32 {
        self.filled
            .iter()
            .filter(|(c, _)| c.upper_face().is_some())
            .map(|(_, &points)| points)
            .sum()
    }

    pub fn bonus(&self) -> u32 {
        if self.upper_total() >= UPPER_BONUS_THRESHOLD {
            UPPER_BONUS
        } else {
            0
        }
    }

    pub fn total(&self) -> u32 {
        self.filled.values().sum::<u32>() + self.bonus()
    }

    pub fn is_complete(&self) -> bool {
        self.filled.len() == Category::ALL.len()
    }

    pub fn is_filled(&self, category: Category) -> bool {
        self.filled.contains_key(&category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct YatzyData {
    dice: [u8; 5],
    rolls_used: u8,
    cards: BTreeMap<UserId, ScoreCard>,
    winner: Option<UserId>,
}

impl Default for YatzyData {
    fn default() -> Self {
        Self {
            dice: [1; 5],
            rolls_used: 0,
            cards: BTreeMap::new(),
            winner: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RollParams {
    /// Indices of dice to keep. Ignored on the first roll of a turn.
    #[serde(default)]
    hold: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScoreParams {
    category: Category,
}

#[derive(Debug)]
pub struct YatzyMachine {
    table: Table,
    data: YatzyData,
}

impl YatzyMachine {
    pub fn new(id: GameId) -> Self {
        Self {
            table: Table::new(id, GameKind::Yatzy, MIN_PLAYERS, MAX_PLAYERS),
            data: YatzyData::default(),
        }
    }

    pub fn from_snapshot(snap: &Snapshot) -> Result<Self, EngineError> {
        if snap.kind != GameKind::Yatzy {
            return Err(EngineError::Corrupted(format!(
                "snapshot is for {}, not yatzy",
                snap.kind
            )));
        }
        Ok(Self {
            table: Table::from_snapshot(snap, MIN_PLAYERS, MAX_PLAYERS)?,
            data: decode_data(snap)?,
        })
    }

    fn card(&self, user: UserId) -> Option<&ScoreCard> {
        self.data.cards.get(&user)
    }

    fn all_active_complete(&self) -> bool {
        self.table
            .players
            .iter()
            .filter(|p| p.is_active)
            .all(|p| self.card(p.id).is_some_and(ScoreCard::is_complete))
    }

    /// Winner by card total among active players. A shared maximum means
    /// no winner.
    fn leader(&self) -> Option<UserId> {
        let mut best: Option<(UserId, u32)> = None;
        let mut tied = false;
        for player in self.table.players.iter().filter(|p| p.is_active) {
            let total = self.card(player.id).map_or(0, ScoreCard::total);
            match best {
                Some((_, top)) if total > top => {
                    best = Some((player.id, total));
                    tied = false;
                }
                Some((_, top)) if total == top => tied = true,
                None => best = Some((player.id, total)),
                _ => {}
            }
        }
        match (best, tied) {
            (Some((id, _)), false) => Some(id),
            _ => None,
        }
    }

    fn finish_by_totals(&mut self) {
        self.data.winner = self.leader();
        self.table.finish();
    }

    /// Moves the turn past players whose cards are already full.
    fn skip_complete_cards(&mut self) {
        for _ in 0..self.table.players.len() {
            let done = self
                .table
                .current_player()
                .and_then(|p| self.card(p.id))
                .is_some_and(ScoreCard::is_complete);
            if !done {
                return;
            }
            self.table.advance_turn();
        }
    }
}

impl GameMachine for YatzyMachine {
    fn kind(&self) -> GameKind {
        GameKind::Yatzy
    }

    fn join(&mut self, player: Player) -> Result<(), EngineError> {
        let id = player.id;
        self.table.join(player)?;
        self.data.cards.insert(id, ScoreCard::default());
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.table.begin()
    }

    fn validate(&self, mv: &Move) -> Result<(), EngineError> {
        self.table.require_turn(mv.player)?;
        match mv.kind.as_str() {
            MOVE_ROLL => {
                if self.data.rolls_used >= MAX_ROLLS_PER_TURN {
                    return Err(EngineError::InvalidMove(
                        "no rolls left this turn".into(),
                    ));
                }
                let params: RollParams = parse_move_data(mv)?;
                if let Some(&idx) = params.hold.iter().find(|&&i| i >= 5) {
                    return Err(EngineError::InvalidMove(format!(
                        "hold index {idx} is out of range"
                    )));
                }
                Ok(())
            }
            MOVE_SCORE => {
                if self.data.rolls_used == 0 {
                    return Err(EngineError::InvalidMove("roll before scoring".into()));
                }
                let params: ScoreParams = parse_move_data(mv)?;
                let filled = self
                    .card(mv.player)
                    .is_some_and(|card| card.is_filled(params.category));
                if filled {
                    return Err(EngineError::InvalidMove(format!(
                        "'{}' already scored",
                        params.category
                    )));
                }
                Ok(())
            }
            other => Err(EngineError::InvalidMove(format!("unknown move '{other}'"))),
        }
    }

    fn apply(&mut self, mv: &Move) -> Result<(), EngineError> {
        match mv.kind.as_str() {
            MOVE_ROLL => {
                let params: RollParams = parse_move_data(mv)?;
                let first = self.data.rolls_used == 0;
                let mut rng = rand::rng();
                for i in 0..5 {
                    if first || !params.hold.contains(&i) {
                        self.data.dice[i] = rng.random_range(1..=6);
                    }
                }
                self.data.rolls_used += 1;
                self.table.record_move();
            }
            MOVE_SCORE => {
                let params: ScoreParams = parse_move_data(mv)?;
                let points = score_for(params.category, &self.data.dice);
                let card = self.data.cards.entry(mv.player).or_default();
                card.filled.insert(params.category, points);
                let total = card.total();
                if let Some(p) = self.table.player_mut(mv.player) {
                    p.score = i64::from(total);
                }
                self.data.rolls_used = 0;
                self.table.record_move();

                if self.all_active_complete() {
                    self.finish_by_totals();
                } else {
                    self.table.advance_turn();
                    self.skip_complete_cards();
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
        Some(match self.data.winner {
            Some(winner) => Outcome::winner(winner),
            None => Outcome::Draw,
        })
    }

    fn mark_inactive(&mut self, user: UserId) -> Result<(), EngineError> {
        let was_turn = self.table.mark_inactive(user, true)?;
        if was_turn {
            // Departing mid-turn surrenders the unused rolls.
            self.data.rolls_used = 0;
        }
        match self.table.status {
            GameStatus::Playing => match self.table.active_ids().as_slice() {
                [last] => {
                    self.data.winner = Some(*last);
                    self.table.finish();
                }
                [] => self.table.abandon(),
                _ => {
                    if self.all_active_complete() {
                        self.finish_by_totals();
                    } else {
                        self.skip_complete_cards();
                    }
                }
            },
            GameStatus::Waiting if self.table.active_count() == 0 => {
                self.table.abandon();
            }
            _ => {}
        }
        Ok(())
    }

    fn suggest_move(&self, user: UserId) -> Option<Move> {
        if self.table.require_turn(user).is_err() {
            return None;
        }
        let card = self.card(user)?;

        if self.data.rolls_used < MAX_ROLLS_PER_TURN {
            // Keep the most common face, reroll the rest. First roll
            // takes everything fresh.
            let hold = if self.data.rolls_used == 0 {
                Vec::new()
            } else {
                let counts = face_counts(&self.data.dice);
                let modal = (1..=6u8)
                    .max_by_key(|&f| counts[f as usize])
                    .unwrap_or(1);
                (0..5).filter(|&i| self.data.dice[i] == modal).collect()
            };
            let data = serde_json::to_value(RollParams { hold }).ok()?;
            return Some(Move::new(MOVE_ROLL, user, data));
        }

        let category = Category::ALL
            .iter()
            .copied()
            .filter(|&c| !card.is_filled(c))
            .max_by_key(|&c| score_for(c, &self.data.dice))?;
        let data = serde_json::to_value(ScoreParams { category }).ok()?;
        Some(Move::new(MOVE_SCORE, user, data))
    }

    fn snapshot(&self) -> Result<Snapshot, EngineError> {
        Ok(self.table.snapshot_with(encode_data(&self.data)?))
    }
}

// =========================================================================
// Tests
// =========================================================================
