//! Real-time fan-out for Parlor rooms.
//!
//! The [`Gateway`] hands every subscriber an unbounded channel and pushes
//! [`EventFrame`]s into it, fire-and-forget. Delivered frames consume a
//! per-room sequence number; state broadcasts suppressed as duplicates do
//! not, so subscribers can read any sequence gap as a missed event.
//!
//! Publishing never fails a caller's mutation: closed subscribers are
//! pruned and logged, and the only error surfaced is the (practically
//! unreachable) snapshot serialization failure, which callers log and
//! swallow.

mod dedupe;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use parlor_engine::Snapshot;
use parlor_protocol::{ConnectionId, EventFrame, EventKind, RoomCode};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::dedupe::{DedupeCache, state_fingerprint};

#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Identical state frames within this window are suppressed.
    pub debounce: Duration,
    /// Dedupe entries older than this are dropped by the sweep.
    pub dedupe_ttl: Duration,
    /// How often [`Gateway::spawn_sweeper`] runs the sweep.
    pub sweep_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
            dedupe_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// What happened to a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// Frame delivered (to zero or more subscribers) at this sequence.
    Sent { seq: u64, receivers: usize },
    /// Suppressed as a repeat within the debounce window. No sequence
    /// number was consumed.
    Duplicate,
}

struct RoomChannel {
    seq: u64,
    subscribers: HashMap<ConnectionId, UnboundedSender<EventFrame>>,
}

impl RoomChannel {
    fn new() -> Self {
        Self { seq: 0, subscribers: HashMap::new() }
    }
}

/// Room registry and broadcast fan-out.
///
/// Room channels persist for the life of the gateway so sequence numbers
/// never restart while a room is in play.
pub struct Gateway {
    rooms: Mutex<HashMap<RoomCode, RoomChannel>>,
    dedupe: DedupeCache,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            dedupe: DedupeCache::default(),
            config,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RoomCode, RoomChannel>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `conn` to a room. Returns the room's current sequence number
    /// (the subscriber will see strictly greater ones) and the frame
    /// stream.
    pub fn subscribe(
        &self,
        room: &RoomCode,
        conn: ConnectionId,
    ) -> (u64, UnboundedReceiver<EventFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rooms = self.lock();
        let channel = rooms.entry(room.clone()).or_insert_with(RoomChannel::new);
        channel.subscribers.insert(conn, tx);
        trace!(room = %room, connection = %conn, seq = channel.seq, "subscribed");
        (channel.seq, rx)
    }

    pub fn unsubscribe(&self, room: &RoomCode, conn: ConnectionId) {
        if let Some(channel) = self.lock().get_mut(room) {
            channel.subscribers.remove(&conn);
        }
    }

    /// Removes `conn` from every room. Used when a connection closes.
    pub fn drop_connection(&self, conn: ConnectionId) {
        for channel in self.lock().values_mut() {
            channel.subscribers.remove(&conn);
        }
    }

    pub fn subscriber_count(&self, room: &RoomCode) -> usize {
        self.lock().get(room).map_or(0, |c| c.subscribers.len())
    }

    /// Broadcasts a snapshot as a `state_changed` frame, unless an
    /// equivalent one already went out within the debounce window.
    pub fn publish_state(
        &self,
        room: &RoomCode,
        snapshot: &Snapshot,
    ) -> Result<Publish, serde_json::Error> {
        let fingerprint = state_fingerprint(snapshot);
        let key = (room.clone(), EventKind::StateChanged, fingerprint);
        if !self.dedupe.should_deliver(key, self.config.debounce) {
            debug!(room = %room, fingerprint, "state broadcast suppressed as duplicate");
            return Ok(Publish::Duplicate);
        }
        let body = serde_json::to_value(snapshot)?;
        Ok(self.deliver(room, EventKind::StateChanged, body))
    }

    /// Broadcasts a non-state event. Not deduplicated: presence flips
    /// and the like are meaningful even when repeated.
    pub fn publish(&self, room: &RoomCode, event: EventKind, body: serde_json::Value) -> Publish {
        self.deliver(room, event, body)
    }

    fn deliver(&self, room: &RoomCode, event: EventKind, body: serde_json::Value) -> Publish {
        let mut rooms = self.lock();
        let channel = rooms.entry(room.clone()).or_insert_with(RoomChannel::new);
        channel.seq += 1;
        let frame = EventFrame {
            room: room.clone(),
            seq: channel.seq,
            event,
            body,
        };

        let mut receivers = 0;
        let mut closed = Vec::new();
        for (&conn, tx) in &channel.subscribers {
            if tx.send(frame.clone()).is_ok() {
                receivers += 1;
            } else {
                closed.push(conn);
            }
        }
        for conn in closed {
            channel.subscribers.remove(&conn);
            debug!(room = %room, connection = %conn, "pruned closed subscriber");
        }

        trace!(room = %room, seq = channel.seq, %event, receivers, "frame delivered");
        Publish::Sent { seq: channel.seq, receivers }
    }

    /// Drops expired dedupe entries. [`spawn_sweeper`](Self::spawn_sweeper)
    /// calls this on an interval; callers without a runtime can call it
    /// directly.
    pub fn sweep(&self) {
        self.dedupe.sweep(self.config.dedupe_ttl);
    }

    /// Runs [`sweep`](Self::sweep) every `sweep_interval` until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(gateway.config.sweep_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                gateway.sweep();
            }
        })
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

// =========================================================================
// Tests
// =========================================================================
