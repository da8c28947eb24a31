use parlor_protocol::GameId;

/// Persistence errors. `MarkerConflict` is the normal outcome of losing
/// a write race and is never retried by the store itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("game {0} not found")]
    NotFound(GameId),

    #[error("game {0} already exists")]
    AlreadyExists(GameId),

    /// Conditional write lost: another writer committed since the
    /// caller's read.
    #[error("stale turn marker for {game}: expected {expected}, found {found}")]
    MarkerConflict {
        game: GameId,
        expected: u64,
        found: u64,
    },

    /// Backend trouble that may clear on retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
