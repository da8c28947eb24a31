//! The trait every game variant implements. Machines are short-lived:
//! the caller rebuilds one from a snapshot, feeds it exactly one move,
//! takes a fresh snapshot and throws the machine away.

use parlor_protocol::UserId;

use crate::error::EngineError;
use crate::snapshot::{GameKind, Move, Player, Snapshot};

/// Final result of a finished game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// One or more winners, in seat order.
    Winners(Vec<UserId>),
    /// Nobody won.
    Draw,
}

impl Outcome {
    pub fn winner(user: UserId) -> Self {
        Outcome::Winners(vec![user])
    }

    pub fn is_winner(&self, user: UserId) -> bool {
        match self {
            Outcome::Winners(ids) => ids.contains(&user),
            Outcome::Draw => false,
        }
    }
}

/// A rules engine for one game kind.
///
/// Implementations hold all state in memory and know nothing about
/// storage, transport or scheduling. `validate` must not mutate; every
/// state change goes through `apply`.
pub trait GameMachine: std::fmt::Debug + Send {
    fn kind(&self) -> GameKind;

    /// Seats a player before the game starts.
    fn join(&mut self, player: Player) -> Result<(), EngineError>;

    /// Starts the game once enough players are seated.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Checks a move against the current state without changing anything.
    fn validate(&self, mv: &Move) -> Result<(), EngineError>;

    /// Applies a previously validated move.
    fn apply(&mut self, mv: &Move) -> Result<(), EngineError>;

    /// Validates then applies in one step.
    fn make_move(&mut self, mv: &Move) -> Result<(), EngineError> {
        self.validate(mv)?;
        self.apply(mv)
    }

    /// The result, once the game has finished.
    fn outcome(&self) -> Option<Outcome>;

    /// Removes a departed player from play, forfeiting or finishing as
    /// the rules require.
    fn mark_inactive(&mut self, user: UserId) -> Result<(), EngineError>;

    /// Proposes a legal move for `user`, or `None` when the machine has
    /// nothing for them to do. Used to drive bot seats.
    fn suggest_move(&self, user: UserId) -> Option<Move>;

    /// Serializes the full state for persistence.
    fn snapshot(&self) -> Result<Snapshot, EngineError>;
}
