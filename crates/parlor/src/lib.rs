//! # Parlor
//!
//! Server-authoritative turn engine for real-time parlor games.
//!
//! Clients submit intents; the server is the only rule arbiter. Every
//! accepted mutation rewrites a whole game [`Snapshot`](prelude::Snapshot)
//! behind an optimistic `turn_marker` check and is fanned out to room
//! subscribers with per-room sequence numbers and duplicate suppression.
//! Machines are stateless between requests: rebuilt from the snapshot,
//! fed one move, thrown away.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parlor::prelude::*;
//!
//! # struct MyAuth;
//! # impl Authenticator for MyAuth {
//! #     async fn authenticate(&self, t: &str) -> Result<UserId, SessionError> {
//! #         t.parse().map(UserId).map_err(|_| SessionError::AuthFailed("bad".into()))
//! #     }
//! # }
//! # async fn start() -> Result<(), ParlorError> {
//! let registry = Arc::new(GameRegistry::standard());
//! let store = Arc::new(MemoryStore::new());
//! let gateway = Arc::new(Gateway::default());
//! let coordinator = Arc::new(Coordinator::new(registry, store, gateway));
//!
//! let server = ParlorServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(Arc::clone(&coordinator), MyAuth)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod bot;
mod coordinator;
mod error;
mod handler;
mod server;

pub use bot::{BotConfig, BotReport, BotRunner};
pub use coordinator::{Coordinator, MoveReceipt};
pub use error::ParlorError;
pub use server::{PROTOCOL_VERSION, ParlorServer, ParlorServerBuilder};

/// Everything an embedding process typically needs.
pub mod prelude {
    pub use crate::{
        BotConfig, BotReport, BotRunner, Coordinator, MoveReceipt, PROTOCOL_VERSION, ParlorError,
        ParlorServer, ParlorServerBuilder,
    };

    pub use parlor_engine::{
        EngineError, GameInfo, GameKind, GameMachine, GameRegistry, GameStatus, Move, Outcome,
        Player, Snapshot,
    };
    pub use parlor_gateway::{Gateway, GatewayConfig, Publish};
    pub use parlor_protocol::{
        Codec, ConnectionId, Envelope, EventFrame, EventKind, GameCommand, GameId, JsonCodec,
        MoveFrame, Payload, RoomCode, SystemMessage, UserId,
    };
    pub use parlor_session::{
        Authenticator, DisconnectWatch, PresenceTracker, RateLimitConfig, SessionError,
    };
    pub use parlor_store::{MemoryStore, SnapshotStore, StoreError};
}
