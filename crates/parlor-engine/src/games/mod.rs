//! The built-in game variants.

pub mod rps;
pub mod sleuth;
pub mod tictactoe;
pub mod yatzy;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::EngineError;
use crate::snapshot::{Move, Snapshot};

/// Deserializes a move payload into the variant's parameter struct.
/// A `null` payload reads as an empty object so parameterless moves
/// ("ready") need no body.
pub(crate) fn parse_move_data<T: DeserializeOwned>(mv: &Move) -> Result<T, EngineError> {
    let data = if mv.data.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        mv.data.clone()
    };
    serde_json::from_value(data)
        .map_err(|e| EngineError::InvalidMove(format!("bad '{}' payload: {e}", mv.kind)))
}

/// Serializes game state into the snapshot `data` field.
pub(crate) fn encode_data<T: Serialize>(data: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(data)
        .map_err(|e| EngineError::Corrupted(format!("game data failed to serialize: {e}")))
}

/// Reads game state back out of a persisted snapshot.
pub(crate) fn decode_data<T: DeserializeOwned>(snap: &Snapshot) -> Result<T, EngineError> {
    serde_json::from_value(snap.data.clone())
        .map_err(|e| EngineError::Corrupted(format!("game data failed to deserialize: {e}")))
}
