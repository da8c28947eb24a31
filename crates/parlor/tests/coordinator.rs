//! Integration tests for the move pipeline: persist, conflict, retry,
//! broadcast, and the bot path that reuses all of it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parlor::prelude::*;
use parlor_engine::PlayerPatch;

// =========================================================================
// Store doubles
// =========================================================================

/// Delegates to a [`MemoryStore`] after a fixed pause on `load`. Gives
/// concurrent callers a real window to collide in.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SnapshotStore for SlowStore {
    async fn load(&self, game: GameId) -> Result<Snapshot, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.load(game).await
    }

    async fn insert(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.inner.insert(snapshot).await
    }

    async fn commit(
        &self,
        expected_marker: u64,
        snapshot: Snapshot,
        patches: &[PlayerPatch],
    ) -> Result<u64, StoreError> {
        self.inner.commit(expected_marker, snapshot, patches).await
    }
}

/// Fails the first `failures` commits with a transient error, counting
/// every attempt.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }
}

impl SnapshotStore for FlakyStore {
    async fn load(&self, game: GameId) -> Result<Snapshot, StoreError> {
        self.inner.load(game).await
    }

    async fn insert(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.inner.insert(snapshot).await
    }

    async fn commit(
        &self,
        expected_marker: u64,
        snapshot: Snapshot,
        patches: &[PlayerPatch],
    ) -> Result<u64, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        self.inner.commit(expected_marker, snapshot, patches).await
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn coordinator_over<S: SnapshotStore>(store: S) -> (Arc<Coordinator<S>>, Arc<Gateway>) {
    let gateway = Arc::new(Gateway::default());
    let coordinator = Arc::new(Coordinator::new(
        Arc::new(GameRegistry::standard()),
        Arc::new(store),
        Arc::clone(&gateway),
    ));
    (coordinator, gateway)
}

fn fixture() -> (Arc<Coordinator<MemoryStore>>, Arc<Gateway>) {
    coordinator_over(MemoryStore::new())
}

/// Tic-tac-toe with `UserId(1)` (seat 0, to move) and `UserId(2)`.
async fn playing_tictactoe<S: SnapshotStore>(
    coordinator: &Coordinator<S>,
    room: &str,
) -> (GameId, RoomCode) {
    let room = RoomCode::new(room);
    let snap = coordinator
        .create_game(GameKind::TicTacToe, room.clone())
        .await
        .unwrap();
    let game = snap.game_id;
    coordinator.join_game(game, &room, UserId(1), "ada").await.unwrap();
    coordinator.join_game(game, &room, UserId(2), "bob").await.unwrap();
    coordinator.start_game(game, &room).await.unwrap();
    (game, room)
}

/// Yatzy where `first` holds seat 0 and is to move.
async fn playing_yatzy<S: SnapshotStore>(
    coordinator: &Coordinator<S>,
    room: &str,
    first: UserId,
    second: UserId,
) -> (GameId, RoomCode) {
    let room = RoomCode::new(room);
    let snap = coordinator
        .create_game(GameKind::Yatzy, room.clone())
        .await
        .unwrap();
    let game = snap.game_id;
    coordinator.join_game(game, &room, first, "first").await.unwrap();
    coordinator.join_game(game, &room, second, "second").await.unwrap();
    coordinator.start_game(game, &room).await.unwrap();
    (game, room)
}

fn place(cell: usize) -> MoveFrame {
    MoveFrame::new("place", serde_json::json!({ "cell": cell }))
}

// =========================================================================
// Lifecycle and persistence
// =========================================================================

#[tokio::test]
async fn test_create_join_start_persists_playing_snapshot() {
    let (coordinator, _) = fixture();
    let (game, _room) = playing_tictactoe(coordinator.as_ref(), "T3-A").await;

    let snap = coordinator.snapshot(game).await.unwrap();
    assert_eq!(snap.status, GameStatus::Playing);
    assert_eq!(snap.players.len(), 2);
    assert_eq!(snap.current_player_index, 0);
    // Insert wrote marker 0; two joins and a start each bumped it.
    assert_eq!(snap.turn_marker, 3);
}

#[tokio::test]
async fn test_create_game_binds_room_both_ways() {
    let (coordinator, _) = fixture();
    let room = RoomCode::new("T3-B");
    let snap = coordinator
        .create_game(GameKind::TicTacToe, room.clone())
        .await
        .unwrap();

    assert_eq!(coordinator.room_of(snap.game_id), Some(room.clone()));
    assert_eq!(coordinator.game_of(&room), Some(snap.game_id));
}

#[tokio::test]
async fn test_room_rebinds_when_it_hosts_a_new_game() {
    let (coordinator, _) = fixture();
    let room = RoomCode::new("T3-C");
    let first = coordinator
        .create_game(GameKind::TicTacToe, room.clone())
        .await
        .unwrap();
    let second = coordinator
        .create_game(GameKind::Rps, room.clone())
        .await
        .unwrap();

    assert_eq!(coordinator.game_of(&room), Some(second.game_id));
    assert_eq!(coordinator.room_of(first.game_id), None);
    assert_eq!(coordinator.room_of(second.game_id), Some(room));
}

#[tokio::test]
async fn test_snapshot_of_missing_game_is_not_found() {
    let (coordinator, _) = fixture();
    let err = coordinator.snapshot(GameId(999)).await.unwrap_err();
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn test_submit_move_bumps_marker_and_returns_receipt() {
    let (coordinator, _) = fixture();
    let (game, room) = playing_tictactoe(coordinator.as_ref(), "T3-D").await;
    let before = coordinator.snapshot(game).await.unwrap();

    let receipt = coordinator
        .submit_move(game, &room, UserId(1), place(4))
        .await
        .unwrap();

    assert_eq!(receipt.turn_marker, before.turn_marker + 1);
    assert_eq!(receipt.snapshot.turn_marker, receipt.turn_marker);
    assert_eq!(receipt.snapshot.current_player_index, 1);
    assert_eq!(receipt.snapshot.data["board"][4], "x");

    let persisted = coordinator.snapshot(game).await.unwrap();
    assert_eq!(persisted, receipt.snapshot);
}

#[tokio::test]
async fn test_rejected_move_persists_nothing() {
    let (coordinator, _) = fixture();
    let (game, room) = playing_tictactoe(coordinator.as_ref(), "T3-E").await;
    let before = coordinator.snapshot(game).await.unwrap();

    // Seat 1 moving out of turn.
    let err = coordinator
        .submit_move(game, &room, UserId(2), place(0))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 400);

    let after = coordinator.snapshot(game).await.unwrap();
    assert_eq!(after, before, "a rejected move must leave the store untouched");
}

#[tokio::test]
async fn test_submit_move_without_a_seat_is_forbidden() {
    let (coordinator, _) = fixture();
    let (game, room) = playing_tictactoe(coordinator.as_ref(), "T3-F").await;

    let err = coordinator
        .submit_move(game, &room, UserId(77), place(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ParlorError::NotAParticipant { .. }));
    assert_eq!(err.status(), 403);
}

#[tokio::test]
async fn test_departed_player_cannot_move_again() {
    let (coordinator, _) = fixture();
    // Three seats so one departure leaves the game running.
    let room = RoomCode::new("YZ-A");
    let snap = coordinator
        .create_game(GameKind::Yatzy, room.clone())
        .await
        .unwrap();
    let game = snap.game_id;
    for (user, name) in [(UserId(1), "ada"), (UserId(2), "bob"), (UserId(3), "eve")] {
        coordinator.join_game(game, &room, user, name).await.unwrap();
    }
    coordinator.start_game(game, &room).await.unwrap();

    let snap = coordinator.mark_departed(game, &room, UserId(2)).await.unwrap();
    assert_eq!(snap.status, GameStatus::Playing);

    let err = coordinator
        .submit_move(
            game,
            &room,
            UserId(2),
            MoveFrame::new("roll", serde_json::json!({ "hold": [] })),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), 403, "an inactive seat is no longer a participant");
}

// =========================================================================
// Write races
// =========================================================================

#[tokio::test]
async fn test_concurrent_moves_accept_exactly_one() {
    let store = SlowStore { inner: MemoryStore::new(), delay: Duration::from_millis(20) };
    let (coordinator, _) = coordinator_over(store);
    let (game, room) = playing_tictactoe(coordinator.as_ref(), "T3-G").await;
    let marker_before = coordinator.snapshot(game).await.unwrap().turn_marker;

    // Both submissions overlap inside the slow load; the store takes one.
    let (a, b) = tokio::join!(
        coordinator.submit_move(game, &room, UserId(1), place(0)),
        coordinator.submit_move(game, &room, UserId(1), place(8)),
    );

    assert!(a.is_ok() != b.is_ok(), "exactly one writer may win a marker value");
    // The loser is either a marker conflict or, having read the winner's
    // state, an ordinary turn rejection. Both leave the store coherent.
    let loser = if a.is_ok() { b.unwrap_err() } else { a.unwrap_err() };
    assert!(matches!(loser.status(), 400 | 409), "got {loser}");

    let after = coordinator.snapshot(game).await.unwrap();
    assert_eq!(after.turn_marker, marker_before + 1);
}

// =========================================================================
// Transient failures
// =========================================================================

#[tokio::test]
async fn test_transient_commit_failure_retried_once_and_succeeds() {
    let (coordinator, _) = coordinator_over(FlakyStore::new(1));
    let room = RoomCode::new("T3-H");
    let snap = coordinator
        .create_game(GameKind::TicTacToe, room.clone())
        .await
        .unwrap();

    // The first commit of this join fails; the retry lands it.
    coordinator
        .join_game(snap.game_id, &room, UserId(1), "ada")
        .await
        .unwrap();

    let persisted = coordinator.snapshot(snap.game_id).await.unwrap();
    assert_eq!(persisted.players.len(), 1);
}

#[tokio::test]
async fn test_persistent_outage_surfaces_503_after_one_retry() {
    let flaky = Arc::new(FlakyStore::new(usize::MAX));
    let gateway = Arc::new(Gateway::default());
    let coordinator = Coordinator::new(
        Arc::new(GameRegistry::standard()),
        Arc::clone(&flaky),
        gateway,
    );
    let room = RoomCode::new("T3-I");
    // Creation inserts without a commit, so it still works.
    let snap = coordinator
        .create_game(GameKind::TicTacToe, room.clone())
        .await
        .unwrap();

    let err = coordinator
        .join_game(snap.game_id, &room, UserId(1), "ada")
        .await
        .unwrap_err();
    assert_eq!(err.status(), 503);
    assert_eq!(
        flaky.attempts.load(Ordering::SeqCst),
        2,
        "one retry, never more"
    );
}

// =========================================================================
// Broadcasts
// =========================================================================

#[tokio::test]
async fn test_every_accepted_mutation_reaches_subscribers_in_order() {
    let (coordinator, gateway) = fixture();
    let room = RoomCode::new("T3-J");
    let (_, mut rx) = gateway.subscribe(&room, ConnectionId(1));

    let snap = coordinator
        .create_game(GameKind::TicTacToe, room.clone())
        .await
        .unwrap();
    let game = snap.game_id;
    coordinator.join_game(game, &room, UserId(1), "ada").await.unwrap();
    coordinator.join_game(game, &room, UserId(2), "bob").await.unwrap();
    coordinator.start_game(game, &room).await.unwrap();
    coordinator
        .submit_move(game, &room, UserId(1), place(4))
        .await
        .unwrap();

    let mut last_seq = 0;
    let mut last_status = GameStatus::Waiting;
    for _ in 0..5 {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("mutation frame missing")
            .unwrap();
        assert_eq!(frame.event, EventKind::StateChanged);
        assert!(frame.seq > last_seq, "room sequence must climb");
        last_seq = frame.seq;
        let body: Snapshot = serde_json::from_value(frame.body).unwrap();
        last_status = body.status;
    }
    assert_eq!(last_status, GameStatus::Playing);
}

#[tokio::test]
async fn test_mutation_succeeds_with_no_subscribers_at_all() {
    let (coordinator, gateway) = fixture();
    let (game, room) = playing_tictactoe(coordinator.as_ref(), "T3-K").await;

    coordinator
        .submit_move(game, &room, UserId(1), place(0))
        .await
        .unwrap();
    assert_eq!(gateway.subscriber_count(&room), 0);
}

// =========================================================================
// Departure
// =========================================================================

#[tokio::test]
async fn test_mark_departed_forfeits_running_tictactoe() {
    let (coordinator, _) = fixture();
    let (game, room) = playing_tictactoe(coordinator.as_ref(), "T3-L").await;

    let snap = coordinator.mark_departed(game, &room, UserId(2)).await.unwrap();
    assert_eq!(snap.status, GameStatus::Finished);
    assert!(!snap.player(UserId(2)).unwrap().is_active);
    assert_eq!(snap.player(UserId(1)).unwrap().score, 1, "remaining player wins");
}

#[tokio::test]
async fn test_mark_departed_on_finished_game_changes_nothing() {
    let (coordinator, _) = fixture();
    let (game, room) = playing_tictactoe(coordinator.as_ref(), "T3-M").await;
    let finished = coordinator.mark_departed(game, &room, UserId(2)).await.unwrap();

    let snap = coordinator.mark_departed(game, &room, UserId(1)).await.unwrap();
    assert_eq!(snap, finished, "terminal games are left exactly as they ended");
}

// =========================================================================
// Bot turns
// =========================================================================

#[tokio::test]
async fn test_bot_plays_one_full_yatzy_turn() {
    let (coordinator, _) = fixture();
    let (game, room) = playing_yatzy(coordinator.as_ref(), "YZ-B", UserId(9), UserId(1)).await;
    let bots = BotRunner::new(Arc::clone(&coordinator), BotConfig::default());

    let report = bots.take_turn(game, &room, UserId(9)).await.unwrap();

    // Three rolls and a score, each persisted individually.
    assert_eq!(report.moves, 4);
    assert_eq!(report.snapshot.current_player_index, 1, "turn passed on");
    let persisted = coordinator.snapshot(game).await.unwrap();
    assert_eq!(persisted.turn_marker, report.snapshot.turn_marker);
}

#[tokio::test]
async fn test_bot_turn_broadcasts_each_discrete_move() {
    let (coordinator, gateway) = fixture();
    let (game, room) = playing_yatzy(coordinator.as_ref(), "YZ-C", UserId(9), UserId(1)).await;
    let (_, mut rx) = gateway.subscribe(&room, ConnectionId(1));
    let bots = BotRunner::new(Arc::clone(&coordinator), BotConfig::default());

    let report = bots.take_turn(game, &room, UserId(9)).await.unwrap();

    let mut frames = 0;
    while let Ok(Some(_)) =
        tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
    {
        frames += 1;
    }
    assert_eq!(frames, report.moves, "spectators watch every step, not a digest");
}

#[tokio::test]
async fn test_bot_out_of_turn_is_a_validation_error() {
    let (coordinator, _) = fixture();
    // Human holds seat 0 and the opening turn.
    let (game, room) = playing_yatzy(coordinator.as_ref(), "YZ-D", UserId(1), UserId(9)).await;
    let bots = BotRunner::new(Arc::clone(&coordinator), BotConfig::default());

    let err = bots.take_turn(game, &room, UserId(9)).await.unwrap_err();
    assert!(matches!(err, ParlorError::NotBotsTurn { .. }));
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn test_bot_without_a_seat_is_not_found() {
    let (coordinator, _) = fixture();
    let (game, room) = playing_yatzy(coordinator.as_ref(), "YZ-E", UserId(1), UserId(2)).await;
    let bots = BotRunner::new(Arc::clone(&coordinator), BotConfig::default());

    let err = bots.take_turn(game, &room, UserId(9)).await.unwrap_err();
    assert!(matches!(err, ParlorError::UnknownBot { .. }));
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn test_bot_missing_game_is_not_found() {
    let (coordinator, _) = fixture();
    let bots = BotRunner::new(Arc::clone(&coordinator), BotConfig::default());

    let err = bots
        .take_turn(GameId(404), &RoomCode::new("YZ-F"), UserId(9))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn test_second_trigger_while_running_is_rejected_not_queued() {
    let store = SlowStore { inner: MemoryStore::new(), delay: Duration::from_millis(40) };
    let (coordinator, _) = coordinator_over(store);
    let (game, room) = playing_yatzy(coordinator.as_ref(), "YZ-G", UserId(9), UserId(1)).await;
    let bots = BotRunner::new(Arc::clone(&coordinator), BotConfig::default());

    // The first call parks in the slow load holding the lock; the second
    // must bounce straight off it.
    let (first, second) = tokio::join!(
        bots.take_turn(game, &room, UserId(9)),
        bots.take_turn(game, &room, UserId(9)),
    );

    let (winner, loser) = if first.is_ok() { (first, second) } else { (second, first) };
    assert_eq!(winner.unwrap().moves, 4);
    let err = loser.unwrap_err();
    assert!(matches!(err, ParlorError::BotBusy { .. }));
    assert_eq!(err.status(), 409);
}

#[tokio::test]
async fn test_ceiling_times_out_and_releases_the_lock() {
    let store = SlowStore { inner: MemoryStore::new(), delay: Duration::from_millis(100) };
    let (coordinator, _) = coordinator_over(store);
    let (game, room) = playing_yatzy(coordinator.as_ref(), "YZ-H", UserId(9), UserId(1)).await;
    let config = BotConfig { turn_ceiling: Duration::from_millis(20), max_moves: 8 };
    let bots = BotRunner::new(Arc::clone(&coordinator), config);

    let err = bots.take_turn(game, &room, UserId(9)).await.unwrap_err();
    assert!(matches!(err, ParlorError::BotTimeout { .. }));
    assert_eq!(err.status(), 503);

    // A timed-out turn must not wedge the pair: the next trigger gets the
    // ceiling again, not already-in-progress.
    let err = bots.take_turn(game, &room, UserId(9)).await.unwrap_err();
    assert!(matches!(err, ParlorError::BotTimeout { .. }));
}
