//! Connection-lifecycle services for Parlor.
//!
//! This crate owns everything about a player's connections that is not
//! game state:
//!
//! 1. **Authentication**: resolving a handshake token to a [`UserId`]
//!    ([`Authenticator`] trait)
//! 2. **Presence**: who is online, with edges only on the first and last
//!    connection ([`PresenceTracker`])
//! 3. **Disconnect grace**: departure timers that give a dropped player
//!    time to come back ([`DisconnectWatch`])
//! 4. **Rate limiting**: per-connection event ceilings ([`RateLimiter`])
//!
//! Nothing here knows about games. The server layer wires presence edges
//! into the disconnect watch and the watch's expiry action into the game
//! departure path.
//!
//! [`UserId`]: parlor_protocol::UserId

mod auth;
mod error;
mod limiter;
mod presence;
mod watch;

pub use auth::Authenticator;
pub use error::SessionError;
pub use limiter::{RateLimitConfig, RateLimiter};
pub use presence::{PresenceEdge, PresenceTracker};
pub use watch::{DEFAULT_GRACE, DisconnectWatch, PendingDisconnect};
