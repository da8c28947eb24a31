//! Maps a [`GameKind`] to the code that builds or restores its machine.
//! Everything above the engine goes through here; no other module
//! matches on game kinds.

use std::collections::HashMap;

use parlor_protocol::GameId;

use crate::error::EngineError;
use crate::games::{rps, sleuth, tictactoe, yatzy};
use crate::games::rps::RpsMachine;
use crate::games::sleuth::SleuthMachine;
use crate::games::tictactoe::TicTacToeMachine;
use crate::games::yatzy::YatzyMachine;
use crate::machine::GameMachine;
use crate::snapshot::{GameKind, Snapshot};

/// Static facts about a registered game, for lobby listings and seat
/// count checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameInfo {
    pub kind: GameKind,
    pub name: &'static str,
    pub min_players: u8,
    pub max_players: u8,
    pub summary: &'static str,
}

pub type CreateFn = fn(GameId) -> Box<dyn GameMachine>;
pub type RestoreFn = fn(&Snapshot) -> Result<Box<dyn GameMachine>, EngineError>;

struct Entry {
    info: GameInfo,
    create: CreateFn,
    restore: RestoreFn,
}

pub struct GameRegistry {
    games: HashMap<GameKind, Entry>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self { games: HashMap::new() }
    }

    /// All four built-in games.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(
            GameInfo {
                kind: GameKind::Yatzy,
                name: "Yatzy",
                min_players: yatzy::MIN_PLAYERS,
                max_players: yatzy::MAX_PLAYERS,
                summary: "Roll dice, fill thirteen categories, chase the bonus.",
            },
            create_yatzy,
            restore_yatzy,
        );
        registry.register(
            GameInfo {
                kind: GameKind::TicTacToe,
                name: "Tic-Tac-Toe",
                min_players: tictactoe::MIN_PLAYERS,
                max_players: tictactoe::MAX_PLAYERS,
                summary: "Three in a row wins.",
            },
            create_tictactoe,
            restore_tictactoe,
        );
        registry.register(
            GameInfo {
                kind: GameKind::Rps,
                name: "Rock-Paper-Scissors",
                min_players: rps::MIN_PLAYERS,
                max_players: rps::MAX_PLAYERS,
                summary: "Best of simultaneous throws, first to three.",
            },
            create_rps,
            restore_rps,
        );
        registry.register(
            GameInfo {
                kind: GameKind::Sleuth,
                name: "Sleuth",
                min_players: sleuth::MIN_PLAYERS,
                max_players: sleuth::MAX_PLAYERS,
                summary: "Question the table and vote out the imposter.",
            },
            create_sleuth,
            restore_sleuth,
        );
        registry
    }

    pub fn register(&mut self, info: GameInfo, create: CreateFn, restore: RestoreFn) {
        self.games.insert(info.kind, Entry { info, create, restore });
    }

    /// Builds a fresh machine for `kind`.
    pub fn create(
        &self,
        kind: GameKind,
        id: GameId,
    ) -> Result<Box<dyn GameMachine>, EngineError> {
        let entry = self
            .games
            .get(&kind)
            .ok_or_else(|| EngineError::UnknownKind(kind.to_string()))?;
        Ok((entry.create)(id))
    }

    /// Rehydrates a machine from a snapshot, dispatching on its kind.
    pub fn restore(&self, snap: &Snapshot) -> Result<Box<dyn GameMachine>, EngineError> {
        let entry = self
            .games
            .get(&snap.kind)
            .ok_or_else(|| EngineError::UnknownKind(snap.kind.to_string()))?;
        (entry.restore)(snap)
    }

    pub fn info(&self, kind: GameKind) -> Option<&GameInfo> {
        self.games.get(&kind).map(|entry| &entry.info)
    }

    pub fn kinds(&self) -> Vec<GameKind> {
        let mut kinds: Vec<GameKind> = self.games.keys().copied().collect();
        kinds.sort_by_key(|k| k.token());
        kinds
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn create_yatzy(id: GameId) -> Box<dyn GameMachine> {
    Box::new(YatzyMachine::new(id))
}

fn restore_yatzy(snap: &Snapshot) -> Result<Box<dyn GameMachine>, EngineError> {
    Ok(Box::new(YatzyMachine::from_snapshot(snap)?))
}

fn create_tictactoe(id: GameId) -> Box<dyn GameMachine> {
    Box::new(TicTacToeMachine::new(id))
}

fn restore_tictactoe(snap: &Snapshot) -> Result<Box<dyn GameMachine>, EngineError> {
    Ok(Box::new(TicTacToeMachine::from_snapshot(snap)?))
}

fn create_rps(id: GameId) -> Box<dyn GameMachine> {
    Box::new(RpsMachine::new(id))
}

fn restore_rps(snap: &Snapshot) -> Result<Box<dyn GameMachine>, EngineError> {
    Ok(Box::new(RpsMachine::from_snapshot(snap)?))
}

fn create_sleuth(id: GameId) -> Box<dyn GameMachine> {
    Box::new(SleuthMachine::new(id))
}

fn restore_sleuth(snap: &Snapshot) -> Result<Box<dyn GameMachine>, EngineError> {
    Ok(Box::new(SleuthMachine::from_snapshot(snap)?))
}

// =========================================================================
// Tests
// =========================================================================
