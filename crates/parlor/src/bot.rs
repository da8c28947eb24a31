//! Drives moves for bot seats through the same pipeline human moves use.
//!
//! A bot turn is one or more discrete moves (roll, roll, score), each
//! persisted and broadcast individually so spectators watch it happen.
//! The `(game, bot)` lock keeps two triggers from replaying the same
//! turn; the wall-clock ceiling keeps a wedged turn from holding that
//! lock forever.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use parlor_engine::Snapshot;
use parlor_protocol::{GameId, MoveFrame, RoomCode, UserId};
use parlor_store::SnapshotStore;
use tracing::{debug, warn};

use crate::coordinator::Coordinator;
use crate::ParlorError;

#[derive(Debug, Clone, Copy)]
pub struct BotConfig {
    /// Hard wall-clock ceiling for one `take_turn` call.
    pub turn_ceiling: Duration,
    /// Most discrete moves one call will make. A turn normally ends on
    /// its own when play passes on; this bounds solo games where it
    /// never does.
    pub max_moves: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            turn_ceiling: Duration::from_secs(10),
            max_moves: 8,
        }
    }
}

/// What one bot turn did.
#[derive(Debug, Clone)]
pub struct BotReport {
    pub moves: usize,
    pub snapshot: Snapshot,
}

type LockSet = Arc<Mutex<HashSet<(GameId, UserId)>>>;

/// Releases the `(game, bot)` slot on every exit path, including the
/// ceiling cancelling the turn mid-move.
struct BotLock {
    locks: LockSet,
    key: (GameId, UserId),
}

impl BotLock {
    fn acquire(locks: &LockSet, game: GameId, bot: UserId) -> Option<Self> {
        let mut held = locks.lock().unwrap_or_else(PoisonError::into_inner);
        if held.insert((game, bot)) {
            Some(Self { locks: Arc::clone(locks), key: (game, bot) })
        } else {
            None
        }
    }
}

impl Drop for BotLock {
    fn drop(&mut self) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct BotRunner<S: SnapshotStore> {
    coordinator: Arc<Coordinator<S>>,
    locks: LockSet,
    config: BotConfig,
}

impl<S: SnapshotStore> BotRunner<S> {
    pub fn new(coordinator: Arc<Coordinator<S>>, config: BotConfig) -> Self {
        Self {
            coordinator,
            locks: Arc::new(Mutex::new(HashSet::new())),
            config,
        }
    }

    /// Plays one turn for `bot`, persisting and broadcasting after each
    /// discrete move.
    ///
    /// A second call for the same `(game, bot)` while one is running is
    /// rejected immediately rather than queued. Triggering a bot whose
    /// turn it is not is a validation error; pointing at a game or seat
    /// that does not exist is not-found.
    pub async fn take_turn(
        &self,
        game: GameId,
        room: &RoomCode,
        bot: UserId,
    ) -> Result<BotReport, ParlorError> {
        let _lock = BotLock::acquire(&self.locks, game, bot)
            .ok_or(ParlorError::BotBusy { game, bot })?;

        match tokio::time::timeout(self.config.turn_ceiling, self.drive(game, room, bot)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%game, %bot, ceiling = ?self.config.turn_ceiling, "bot turn hit ceiling");
                Err(ParlorError::BotTimeout { game, bot })
            }
        }
    }

    async fn drive(
        &self,
        game: GameId,
        room: &RoomCode,
        bot: UserId,
    ) -> Result<BotReport, ParlorError> {
        let mut snapshot = self.coordinator.snapshot(game).await?;
        if snapshot.player(bot).is_none() {
            return Err(ParlorError::UnknownBot { game, bot });
        }

        let mut moves = 0;
        while moves < self.config.max_moves && !snapshot.status.is_terminal() {
            let machine = self.coordinator.rehydrate(&snapshot)?;
            let Some(mv) = machine.suggest_move(bot) else { break };

            let frame = MoveFrame::new(mv.kind, mv.data);
            let receipt = self.coordinator.submit_move(game, room, bot, frame).await?;
            snapshot = receipt.snapshot;
            moves += 1;
        }

        if moves == 0 {
            return Err(ParlorError::NotBotsTurn { game, bot });
        }
        debug!(%game, %bot, moves, "bot turn complete");
        Ok(BotReport { moves, snapshot })
    }
}
