//! Per-connection handler: handshake, routing, and lifecycle bookkeeping.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Hello → validate version → authenticate token → Welcome
//!   2. Register the connection with the presence tracker
//!   3. Loop: receive envelopes → rate-limit check → dispatch system
//!      messages and game commands
//!   4. On any exit, a drop guard forgets the rate-limit window, leaves
//!      every room, and, if this was the user's last connection,
//!      publishes the offline edge and arms the disconnect grace timers
//!
//! Room events flow the other way on the same socket: subscribing spawns
//! a pump task that forwards gateway frames out through the send half,
//! which is locked independently of the receive half.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parlor_engine::Snapshot;
use parlor_protocol::{
    Codec, ConnectionId, Envelope, EventFrame, EventKind, GameCommand, Payload, ProtocolError,
    RoomCode, SystemMessage, UserId,
};
use parlor_session::{Authenticator, PresenceEdge};
use parlor_store::SnapshotStore;
use parlor_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::ParlorError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Drop guard that runs disconnect bookkeeping when the handler exits,
/// even if it exits by panic.
///
/// All of the cleanup is synchronous except the departure action itself,
/// which the disconnect watch runs on its own timer task after the grace
/// window.
struct ConnectionGuard<S: SnapshotStore, A: Authenticator, C: Codec> {
    user: UserId,
    conn_id: ConnectionId,
    rooms: HashSet<RoomCode>,
    state: Arc<ServerState<S, A, C>>,
}

impl<S: SnapshotStore, A: Authenticator, C: Codec> Drop for ConnectionGuard<S, A, C> {
    fn drop(&mut self) {
        let state = &self.state;
        state.limiter.forget(self.conn_id);
        state.gateway.drop_connection(self.conn_id);

        let offline = matches!(
            state.presence.disconnect(self.user, self.conn_id),
            Some(PresenceEdge::Offline)
        );
        if !offline {
            return;
        }

        // Last connection gone: announce it and start the grace clocks.
        // Reconnecting and resubscribing before a deadline disarms that
        // room's timer; expiry marks the player departed.
        for room in self.rooms.drain() {
            let user = self.user;
            state
                .gateway
                .publish(&room, EventKind::Presence, presence_body(user, false));

            let Some(game) = state.coordinator.game_of(&room) else {
                continue;
            };
            let coordinator = Arc::clone(&state.coordinator);
            let action_room = room.clone();
            state.watch.schedule(room, user, move || async move {
                if let Err(e) = coordinator.mark_departed(game, &action_room, user).await {
                    debug!(%game, %user, error = %e, "departure mark skipped");
                }
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, A, C>>,
) -> Result<(), ParlorError>
where
    S: SnapshotStore,
    A: Authenticator,
    C: Codec + Clone + 'static,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    let user = perform_handshake(&conn, &state).await?;
    info!(%conn_id, %user, "user authenticated");

    // Only the connection that takes the user online announces presence;
    // extra tabs stay silent.
    let announce = matches!(
        state.presence.connect(user, conn_id),
        Some(PresenceEdge::Online)
    );
    let mut guard = ConnectionGuard {
        user,
        conn_id,
        rooms: HashSet::new(),
        state: Arc::clone(&state),
    };

    // Envelope sequence for everything we send; the Welcome used 0.
    let seq = Arc::new(AtomicU64::new(1));

    loop {
        let data = match tokio::time::timeout(IDLE_TIMEOUT, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                info!(%user, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                debug!(%user, error = %e, "recv error");
                break;
            }
            Err(_) => {
                info!(%user, "connection idle timeout");
                break;
            }
        };

        if let Err(e) = state.limiter.check(conn_id) {
            send_error(&conn, &state.codec, 429, &e.to_string(), &seq).await?;
            continue;
        }

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                debug!(%user, error = %e, "failed to decode envelope");
                continue;
            }
        };

        match envelope.payload {
            Payload::System(msg) => {
                let should_close =
                    handle_system_message(&conn, &state, &mut guard, user, msg, &seq, announce)
                        .await?;
                if should_close {
                    break;
                }
            }
            Payload::Command(cmd) => {
                handle_command(&conn, &state, user, cmd, &seq).await?;
            }
            Payload::Event(_) => {
                debug!(%user, "ignoring client-sent event frame");
            }
        }
    }

    // guard drops here → presence, limiter, gateway and grace bookkeeping.
    Ok(())
}

/// Performs the initial handshake: receive Hello, validate, auth, send
/// Welcome.
async fn perform_handshake<S, A, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<S, A, C>>,
) -> Result<UserId, ParlorError>
where
    S: SnapshotStore,
    A: Authenticator,
    C: Codec,
{
    let seq = AtomicU64::new(0);

    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(
                ProtocolError::InvalidMessage("connection closed before hello".into()).into(),
            );
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("hello timed out".into()).into());
        }
    };

    let envelope: Envelope = state.codec.decode(&data)?;

    let (version, token) = match envelope.payload {
        Payload::System(SystemMessage::Hello { version, token }) => (version, token),
        _ => {
            send_error(conn, &state.codec, 400, "expected Hello", &seq).await?;
            return Err(ProtocolError::InvalidMessage("first message must be Hello".into()).into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            conn,
            &state.codec,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            &seq,
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let token = token.unwrap_or_default();
    let user = match state.auth.authenticate(&token).await {
        Ok(user) => user,
        Err(e) => {
            send_error(conn, &state.codec, 401, "unauthorized", &seq).await?;
            return Err(e.into());
        }
    };

    send_system(
        conn,
        &state.codec,
        &seq,
        SystemMessage::Welcome { user_id: user, server_time: now_millis() },
    )
    .await?;

    Ok(user)
}

/// Handles a system message. Returns `true` if the connection should
/// close.
async fn handle_system_message<S, A, C>(
    conn: &Arc<WebSocketConnection>,
    state: &Arc<ServerState<S, A, C>>,
    guard: &mut ConnectionGuard<S, A, C>,
    user: UserId,
    msg: SystemMessage,
    seq: &Arc<AtomicU64>,
    announce: bool,
) -> Result<bool, ParlorError>
where
    S: SnapshotStore,
    A: Authenticator,
    C: Codec + Clone + 'static,
{
    match msg {
        SystemMessage::Heartbeat { client_time } => {
            send_system(
                conn,
                &state.codec,
                seq,
                SystemMessage::HeartbeatAck { client_time, server_time: now_millis() },
            )
            .await?;
        }

        SystemMessage::Subscribe { room } => {
            if state.watch.cancel(&room, user) {
                debug!(%user, %room, "rejoined within grace");
            }

            let (room_seq, rx) = state.gateway.subscribe(&room, guard.conn_id);
            spawn_event_pump(Arc::clone(conn), state.codec.clone(), Arc::clone(seq), rx);

            send_system(
                conn,
                &state.codec,
                seq,
                SystemMessage::Subscribed { room: room.clone(), seq: room_seq },
            )
            .await?;

            // Late joiners need a baseline before their first delta. The
            // push reuses the room's current sequence so idempotent
            // clients slot it in cleanly.
            if let Some(game) = state.coordinator.game_of(&room) {
                match state.coordinator.snapshot(game).await {
                    Ok(snapshot) => {
                        push_state(conn, &state.codec, seq, &room, room_seq, &snapshot).await?;
                    }
                    Err(e) => {
                        debug!(%room, %game, error = %e, "initial state push skipped");
                    }
                }
            }

            let first_subscribe = guard.rooms.insert(room.clone());
            if announce && first_subscribe {
                state
                    .gateway
                    .publish(&room, EventKind::Presence, presence_body(user, true));
            }
        }

        SystemMessage::Unsubscribe { room } => {
            state.gateway.unsubscribe(&room, guard.conn_id);
            guard.rooms.remove(&room);
            debug!(%user, %room, "unsubscribed");
        }

        SystemMessage::Goodbye { reason } => {
            info!(%user, %reason, "client said goodbye");
            return Ok(true);
        }

        _ => {
            debug!(%user, "ignoring unexpected system message");
        }
    }

    Ok(false)
}

/// Routes a game command into the coordinator or the bot runner.
///
/// Successful mutations answer through the room broadcast; only
/// rejections get a direct error reply.
async fn handle_command<S, A, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<S, A, C>>,
    user: UserId,
    cmd: GameCommand,
    seq: &Arc<AtomicU64>,
) -> Result<(), ParlorError>
where
    S: SnapshotStore,
    A: Authenticator,
    C: Codec,
{
    match cmd {
        GameCommand::SubmitMove { game, mv } => {
            let result = match state.coordinator.room_of(game) {
                Some(room) => state
                    .coordinator
                    .submit_move(game, &room, user, mv)
                    .await
                    .map(|_| ()),
                None => Err(ParlorError::UnknownRoom(game)),
            };
            if let Err(e) = result {
                debug!(%user, %game, error = %e, "move rejected");
                send_error(conn, &state.codec, e.status(), &e.to_string(), seq).await?;
            }
        }

        GameCommand::BotTurn { game, bot } => {
            let result = match state.coordinator.room_of(game) {
                Some(room) => state.bots.take_turn(game, &room, bot).await.map(|_| ()),
                None => Err(ParlorError::UnknownRoom(game)),
            };
            if let Err(e) = result {
                debug!(%user, %game, %bot, error = %e, "bot turn rejected");
                send_error(conn, &state.codec, e.status(), &e.to_string(), seq).await?;
            }
        }
    }

    Ok(())
}

/// Forwards gateway frames to the socket until the room channel or the
/// connection closes. Sends go through the writer half, so a parked
/// receive never delays them.
fn spawn_event_pump<C: Codec>(
    conn: Arc<WebSocketConnection>,
    codec: C,
    seq: Arc<AtomicU64>,
    mut rx: UnboundedReceiver<EventFrame>,
) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let envelope = Envelope {
                seq: seq.fetch_add(1, Ordering::Relaxed),
                timestamp: now_millis(),
                payload: Payload::Event(frame),
            };
            let bytes = match codec.encode(&envelope) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(error = %e, "event encode failed");
                    continue;
                }
            };
            if conn.send(&bytes).await.is_err() {
                break;
            }
        }
    });
}

/// Sends one full-snapshot event frame directly to this connection.
async fn push_state<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    seq: &AtomicU64,
    room: &RoomCode,
    room_seq: u64,
    snapshot: &Snapshot,
) -> Result<(), ParlorError> {
    let body = serde_json::to_value(snapshot).map_err(ProtocolError::Encode)?;
    let frame = EventFrame {
        room: room.clone(),
        seq: room_seq,
        event: EventKind::StateChanged,
        body,
    };
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: now_millis(),
        payload: Payload::Event(frame),
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Sends a system message envelope to the client.
async fn send_system<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    seq: &AtomicU64,
    msg: SystemMessage,
) -> Result<(), ParlorError> {
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: now_millis(),
        payload: Payload::System(msg),
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Sends a `SystemMessage::Error` envelope to the client.
async fn send_error<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    code: u16,
    message: &str,
    seq: &AtomicU64,
) -> Result<(), ParlorError> {
    send_system(
        conn,
        codec,
        seq,
        SystemMessage::Error { code, message: message.to_string() },
    )
    .await
}

fn presence_body(user: UserId, online: bool) -> serde_json::Value {
    serde_json::json!({ "user": user, "online": online })
}

/// Increments and returns the next per-connection sequence number.
fn next_seq(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::Relaxed)
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
