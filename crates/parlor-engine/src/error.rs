//! Engine errors. Variants split along the lines callers map to wire
//! codes: invalid input, wrong actor, and unreadable state.

use parlor_protocol::UserId;

use crate::snapshot::GameStatus;

/// Errors from rule evaluation, lifecycle operations, and rehydration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The move is illegal in the current state. Nothing was mutated.
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// The move came from a player whose turn it is not.
    #[error("it is not {0}'s turn")]
    NotYourTurn(UserId),

    /// The user is not seated at this game.
    #[error("{0} is not in this game")]
    UnknownPlayer(UserId),

    /// The operation requires a different lifecycle status.
    #[error("game is {0}, operation rejected")]
    WrongStatus(GameStatus),

    /// All seats are taken.
    #[error("game is full ({0} seats)")]
    GameFull(u8),

    /// The user already holds a seat.
    #[error("{0} already joined")]
    AlreadyJoined(UserId),

    /// Start was requested outside the allowed player-count range.
    #[error("cannot start with {have} players, need {min}..={max}")]
    BadPlayerCount { have: u8, min: u8, max: u8 },

    /// The game-type token is not registered.
    #[error("unknown game type '{0}'")]
    UnknownKind(String),

    /// The persisted snapshot cannot be rehydrated. Fatal for this game;
    /// never auto-repaired.
    #[error("corrupted game state: {0}")]
    Corrupted(String),
}
