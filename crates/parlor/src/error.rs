//! Unified error type for the Parlor framework.

use parlor_engine::EngineError;
use parlor_protocol::{GameId, ProtocolError, UserId};
use parlor_session::SessionError;
use parlor_store::StoreError;
use parlor_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When embedding the `parlor` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate. The
/// `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParlorError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, rate limit).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A rules error from the game machines.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A persistence error, including lost write races.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The acting user holds no active seat at the game.
    #[error("{user} is not an active participant of {game}")]
    NotAParticipant { user: UserId, game: GameId },

    /// A bot turn for this `(game, bot)` pair is already running.
    #[error("a turn for {bot} in {game} is already in progress")]
    BotBusy { game: GameId, bot: UserId },

    /// The bot turn hit its wall-clock ceiling and was abandoned.
    #[error("turn for {bot} in {game} exceeded its time ceiling")]
    BotTimeout { game: GameId, bot: UserId },

    /// The bot has nothing to do right now.
    #[error("{bot} has no move to make in {game}")]
    NotBotsTurn { game: GameId, bot: UserId },

    /// The requested bot is not seated at the game.
    #[error("{bot} is not seated at {game}")]
    UnknownBot { game: GameId, bot: UserId },

    /// No broadcast room is bound to the game.
    #[error("no room is bound to {0}")]
    UnknownRoom(GameId),
}

impl ParlorError {
    /// HTTP-style status code for the wire.
    ///
    /// Validation problems are 400, failed handshake auth 401, acting
    /// without a seat 403, missing things 404, lost races and held locks
    /// 409, rate limiting 429, unreadable state 500, infrastructure that
    /// stayed down through the retry 503.
    pub fn status(&self) -> u16 {
        match self {
            ParlorError::Engine(EngineError::Corrupted(_)) => 500,
            ParlorError::Engine(_) => 400,
            ParlorError::Store(StoreError::NotFound(_)) => 404,
            ParlorError::Store(StoreError::AlreadyExists(_)) => 409,
            ParlorError::Store(StoreError::MarkerConflict { .. }) => 409,
            ParlorError::Store(StoreError::Unavailable(_)) => 503,
            ParlorError::Session(SessionError::AuthFailed(_)) => 401,
            ParlorError::Session(SessionError::RateLimited(_)) => 429,
            ParlorError::Protocol(_) => 400,
            ParlorError::Transport(_) => 503,
            ParlorError::NotAParticipant { .. } => 403,
            ParlorError::BotBusy { .. } => 409,
            ParlorError::BotTimeout { .. } => 503,
            ParlorError::NotBotsTurn { .. } => 400,
            ParlorError::UnknownBot { .. } => 404,
            ParlorError::UnknownRoom(_) => 404,
        }
    }
}
