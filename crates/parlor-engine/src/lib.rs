//! Game rules for Parlor.
//!
//! Machines are stateless between requests: every move load-rebuilds the
//! machine from the stored [`Snapshot`], applies exactly one [`Move`] and
//! snapshots the result. Nothing here touches storage or the network.
//!
//! # Key types
//!
//! - [`GameMachine`]: the trait each game variant implements
//! - [`GameRegistry`]: builds and restores machines by [`GameKind`]
//! - [`Snapshot`]: whole-state persistence unit with the `turn_marker`
//!   concurrency stamp
//! - [`Table`]: seating and turn bookkeeping shared by all variants

mod error;
mod machine;
mod registry;
mod snapshot;
mod table;

pub mod games;

pub use error::EngineError;
pub use machine::{GameMachine, Outcome};
pub use registry::{CreateFn, GameInfo, GameRegistry, RestoreFn};
pub use snapshot::{
    GameKind, GameStatus, Move, Player, PlayerPatch, Snapshot, changed_players,
};
pub use table::Table;
