//! Snapshot persistence for Parlor.
//!
//! The store keeps whole [`Snapshot`]s; there is no move log. Writes are
//! conditional: [`SnapshotStore::commit`] succeeds only while the stored
//! `turn_marker` still equals the value the caller read, which gives the
//! move pipeline exactly-once application without any global lock.
//!
//! [`MemoryStore`] is the in-process implementation. Other backends plug
//! in behind the same trait.

#![allow(async_fn_in_trait)]

mod error;
mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

use parlor_engine::{PlayerPatch, Snapshot};
use parlor_protocol::GameId;

pub trait SnapshotStore: Send + Sync + 'static {
    /// Fetches the current snapshot of a game.
    fn load(
        &self,
        game: GameId,
    ) -> impl std::future::Future<Output = Result<Snapshot, StoreError>> + Send;

    /// Stores a brand new game. Fails if the id is taken.
    fn insert(
        &self,
        snapshot: Snapshot,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Replaces the snapshot if the stored `turn_marker` still equals
    /// `expected_marker`, bumping the marker past it. Returns the new
    /// marker. `patches` carries the per-player fields this write
    /// changed, for backends that keep player rows separately.
    fn commit(
        &self,
        expected_marker: u64,
        snapshot: Snapshot,
        patches: &[PlayerPatch],
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;
}
