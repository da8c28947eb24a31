//! Wire protocol for Parlor.
//!
//! Defines the vocabulary shared by every other crate:
//!
//! - identifiers ([`UserId`], [`GameId`], [`ConnectionId`], [`RoomCode`])
//! - wire messages ([`Envelope`], [`SystemMessage`], [`GameCommand`],
//!   [`EventFrame`])
//! - the [`Codec`] seam with the default [`JsonCodec`]
//!
//! The protocol layer knows nothing about rules, persistence, or
//! connections; it only fixes message shapes.

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ConnectionId, Envelope, EventFrame, EventKind, GameCommand, GameId,
    MoveFrame, Payload, RoomCode, SystemMessage, UserId,
};
