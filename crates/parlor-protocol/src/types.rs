//! Types that travel on the wire between clients and the server.
//!
//! Everything here serializes to JSON with stable shapes; the tests at the
//! bottom pin those shapes so client SDKs don't break silently.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identity of an actor (human or bot), issued by the external
/// identity provider. Serializes as a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Identifier of one game instance (one snapshot row in the store).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// Identifier of one live connection, assigned by the transport on accept.
/// A user may hold several connections at once.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Short-code name of a broadcast room. Minted by the external lobby; the
/// engine only routes on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(code: &str) -> Self {
        Self(code.to_owned())
    }
}

// ---------------------------------------------------------------------------
// SystemMessage — connection plumbing
// ---------------------------------------------------------------------------

/// Framework-level messages: handshake, room subscription, keep-alive,
/// errors. Internally tagged so the JSON reads `{ "type": "Hello", ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Client → server: first message on a fresh connection.
    Hello { version: u16, token: Option<String> },

    /// Server → client: handshake accepted. `server_time` is unix millis.
    Welcome { user_id: UserId, server_time: u64 },

    /// Client → server: start receiving events for this room.
    Subscribe { room: RoomCode },

    /// Server → client: subscription confirmed. `seq` is the room's current
    /// event sequence, so the client knows where the stream picks up.
    Subscribed { room: RoomCode, seq: u64 },

    /// Client → server: stop receiving events for this room.
    Unsubscribe { room: RoomCode },

    /// Client → server keep-alive. `client_time` is echoed back verbatim.
    Heartbeat { client_time: u64 },

    /// Server → client reply to [`SystemMessage::Heartbeat`].
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Either direction: orderly shutdown of this connection.
    Goodbye { reason: String },

    /// Server → client: a request failed. `code` follows HTTP conventions.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// GameCommand — requests that mutate a game
// ---------------------------------------------------------------------------

/// A move as submitted by a client: type token plus game-specific payload.
/// The server stamps the acting user and timestamp; clients cannot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl MoveFrame {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self { kind: kind.into(), data }
    }
}

/// Client → server requests routed into the move pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameCommand {
    /// Apply one move to a game as the authenticated user.
    SubmitMove {
        game: GameId,
        #[serde(rename = "move")]
        mv: MoveFrame,
    },

    /// Run a full bot turn for `bot` in `game`.
    BotTurn { game: GameId, bot: UserId },
}

// ---------------------------------------------------------------------------
// EventFrame — server → subscribers fan-out
// ---------------------------------------------------------------------------

/// Kinds of room events the gateway emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Full-snapshot replacement; `body` is the serialized snapshot.
    StateChanged,
    /// A user's room presence flipped; `body` is `{user, online}`.
    Presence,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::StateChanged => f.write_str("state_changed"),
            EventKind::Presence => f.write_str("presence"),
        }
    }
}

/// One event delivered to room subscribers.
///
/// `seq` increases monotonically per room and only for delivered frames;
/// a gap therefore always means a missed event, never a suppressed
/// duplicate. Clients apply frames idempotently, highest `seq` wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFrame {
    pub room: RoomCode,
    pub seq: u64,
    pub event: EventKind,
    pub body: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Envelope — the top-level wire format
// ---------------------------------------------------------------------------

/// Content of an envelope. Adjacently tagged:
/// `{ "type": "Command", "data": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    System(SystemMessage),
    Command(GameCommand),
    Event(EventFrame),
}

/// Top-level wrapper for every message on the wire.
///
/// `seq` here is per connection and per direction (each side counts its own
/// sends); the room-scoped sequence lives inside [`EventFrame`].
/// `timestamp` is unix millis at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
