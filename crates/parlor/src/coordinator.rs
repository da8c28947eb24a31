//! Move pipeline: load, authorize, rehydrate, apply, persist, broadcast.
//!
//! Every game mutation runs through [`Coordinator::mutate`]: read the
//! snapshot and its `turn_marker`, rebuild the machine, apply the change,
//! then write the whole new snapshot back conditioned on the marker still
//! holding. Two racing writers both get through the rules; the store
//! accepts exactly one. The loser surfaces a conflict and never
//! overwrites; callers refetch and retry at their own pace.
//!
//! Broadcasts happen after the write and are fire-and-forget: a mutation
//! is successful once persisted, whatever happens to delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use parlor_engine::{
    EngineError, GameKind, GameMachine, GameRegistry, Move, Player, PlayerPatch, Snapshot,
    changed_players,
};
use parlor_gateway::{Gateway, Publish};
use parlor_protocol::{GameId, MoveFrame, RoomCode, UserId};
use parlor_store::SnapshotStore;
use tracing::{debug, error, info, trace, warn};

use crate::ParlorError;

/// One pause before the single retry of a transient store failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// An accepted move: the snapshot it produced and the marker that
/// totally orders it within the game.
#[derive(Debug, Clone)]
pub struct MoveReceipt {
    pub snapshot: Snapshot,
    pub turn_marker: u64,
}

/// Which game a room is showing, both ways round.
#[derive(Default)]
struct TableDirectory {
    by_game: HashMap<GameId, RoomCode>,
    by_room: HashMap<RoomCode, GameId>,
}

impl TableDirectory {
    /// Binds `room` to `game`. A room moving on to a new game drops its
    /// old binding.
    fn bind(&mut self, game: GameId, room: RoomCode) {
        if let Some(previous) = self.by_room.insert(room.clone(), game) {
            self.by_game.remove(&previous);
        }
        self.by_game.insert(game, room);
    }
}

/// Applies game mutations against a [`SnapshotStore`] and announces the
/// results through a [`Gateway`].
///
/// The coordinator is the only writer of snapshots. It holds no game
/// state itself; machines are rebuilt per request and discarded.
pub struct Coordinator<S: SnapshotStore> {
    registry: Arc<GameRegistry>,
    store: Arc<S>,
    gateway: Arc<Gateway>,
    tables: Mutex<TableDirectory>,
    next_game_id: AtomicU64,
}

impl<S: SnapshotStore> Coordinator<S> {
    pub fn new(registry: Arc<GameRegistry>, store: Arc<S>, gateway: Arc<Gateway>) -> Self {
        Self {
            registry,
            store,
            gateway,
            tables: Mutex::new(TableDirectory::default()),
            next_game_id: AtomicU64::new(1),
        }
    }

    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::clone(&self.gateway)
    }

    /// The room a game broadcasts to, if one is bound.
    pub fn room_of(&self, game: GameId) -> Option<RoomCode> {
        self.lock_tables().by_game.get(&game).cloned()
    }

    /// The game a room is currently showing.
    pub fn game_of(&self, room: &RoomCode) -> Option<GameId> {
        self.lock_tables().by_room.get(room).copied()
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, TableDirectory> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuilds the rules machine for a snapshot. The registry is the
    /// single dispatch point on game kind.
    pub fn rehydrate(&self, snapshot: &Snapshot) -> Result<Box<dyn GameMachine>, EngineError> {
        self.registry.restore(snapshot)
    }

    /// Creates an empty game of `kind`, binds it to `room`, and persists
    /// the waiting snapshot.
    pub async fn create_game(
        &self,
        kind: GameKind,
        room: RoomCode,
    ) -> Result<Snapshot, ParlorError> {
        let game = GameId(self.next_game_id.fetch_add(1, Ordering::Relaxed));
        let machine = self.registry.create(kind, game)?;
        let snapshot = machine.snapshot()?;
        self.store.insert(snapshot.clone()).await?;
        self.lock_tables().bind(game, room.clone());
        info!(%game, %kind, %room, "game created");
        self.broadcast(game, &room, &snapshot);
        Ok(snapshot)
    }

    /// Seats `user` at a waiting game.
    pub async fn join_game(
        &self,
        game: GameId,
        room: &RoomCode,
        user: UserId,
        name: &str,
    ) -> Result<Snapshot, ParlorError> {
        let player = Player::new(user, name);
        let snapshot = self
            .mutate(game, room, move |_, machine| {
                machine.join(player)?;
                Ok(true)
            })
            .await?;
        debug!(%game, %user, "player joined");
        Ok(snapshot)
    }

    /// Starts a waiting game once enough players are seated.
    pub async fn start_game(&self, game: GameId, room: &RoomCode) -> Result<Snapshot, ParlorError> {
        let snapshot = self
            .mutate(game, room, |_, machine| {
                machine.start()?;
                Ok(true)
            })
            .await?;
        info!(%game, status = %snapshot.status, "game started");
        Ok(snapshot)
    }

    /// Applies one move for `user`. The server stamps the actor and the
    /// timestamp; nothing from the frame besides type and payload is
    /// trusted.
    ///
    /// Rejections persist nothing. A lost write race surfaces as a
    /// conflict for the caller to refetch on.
    pub async fn submit_move(
        &self,
        game: GameId,
        room: &RoomCode,
        user: UserId,
        frame: MoveFrame,
    ) -> Result<MoveReceipt, ParlorError> {
        let snapshot = self
            .mutate(game, room, move |before, machine| {
                match before.player(user) {
                    Some(seat) if seat.is_active => {}
                    _ => return Err(ParlorError::NotAParticipant { user, game }),
                }
                let mv = Move::new(frame.kind, user, frame.data);
                machine.make_move(&mv)?;
                Ok(true)
            })
            .await?;
        debug!(%game, %user, marker = snapshot.turn_marker, "move accepted");
        Ok(MoveReceipt { turn_marker: snapshot.turn_marker, snapshot })
    }

    /// Converts an expired disconnect grace into the same mutation an
    /// explicit leave would make. A game that already ended is left
    /// untouched.
    pub async fn mark_departed(
        &self,
        game: GameId,
        room: &RoomCode,
        user: UserId,
    ) -> Result<Snapshot, ParlorError> {
        let snapshot = self
            .mutate(game, room, move |before, machine| {
                if before.status.is_terminal() {
                    return Ok(false);
                }
                machine.mark_inactive(user)?;
                Ok(true)
            })
            .await?;
        info!(%game, %user, status = %snapshot.status, "player departed");
        Ok(snapshot)
    }

    /// Current persisted state of a game.
    pub async fn snapshot(&self, game: GameId) -> Result<Snapshot, ParlorError> {
        Ok(self.store.load(game).await?)
    }

    /// The shared load → rehydrate → op → CAS-persist → broadcast path.
    ///
    /// `op` sees the pre-state and the live machine; returning `Ok(false)`
    /// skips the write and hands back the loaded snapshot unchanged.
    async fn mutate<F>(&self, game: GameId, room: &RoomCode, op: F) -> Result<Snapshot, ParlorError>
    where
        F: FnOnce(&Snapshot, &mut dyn GameMachine) -> Result<bool, ParlorError>,
    {
        let before = self.store.load(game).await?;
        let expected = before.turn_marker;
        let mut machine = self.registry.restore(&before)?;

        if !op(&before, machine.as_mut())? {
            return Ok(before);
        }

        let mut after = machine.snapshot()?;
        let patches = changed_players(&before, &after);
        let marker = self.commit_once_retried(expected, &after, &patches).await?;
        after.turn_marker = marker;

        self.broadcast(game, room, &after);
        Ok(after)
    }

    /// One commit, retried a single time when the store reports transient
    /// trouble. Conflicts are never retried: the snapshot the caller
    /// mutated is stale by definition.
    async fn commit_once_retried(
        &self,
        expected: u64,
        snapshot: &Snapshot,
        patches: &[PlayerPatch],
    ) -> Result<u64, ParlorError> {
        match self.store.commit(expected, snapshot.clone(), patches).await {
            Err(err) if err.is_transient() => {
                warn!(
                    game = %snapshot.game_id,
                    error = %err,
                    "commit hit transient store failure, retrying once"
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
                Ok(self.store.commit(expected, snapshot.clone(), patches).await?)
            }
            other => Ok(other?),
        }
    }

    /// Fire-and-forget state announcement. Never fails the mutation.
    fn broadcast(&self, game: GameId, room: &RoomCode, snapshot: &Snapshot) {
        match self.gateway.publish_state(room, snapshot) {
            Ok(Publish::Sent { seq, receivers }) => {
                trace!(%game, %room, seq, receivers, "state broadcast");
            }
            Ok(Publish::Duplicate) => {
                debug!(%game, %room, "state broadcast suppressed as duplicate");
            }
            Err(err) => {
                error!(%game, %room, error = %err, "state broadcast failed");
            }
        }
    }
}
