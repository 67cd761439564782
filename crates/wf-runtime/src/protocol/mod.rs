//! The three protocols a runtime speaks.
//!
//! - graph (build and edit the current graph)
//! - network (start and stop a network for it, report its traffic)
//! - component (describe what the loader can instantiate)

pub mod component;
pub mod graph;
pub mod network;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{RuntimeError, RuntimeResult};

pub use component::ComponentProtocol;
pub use graph::GraphProtocol;
pub use network::NetworkProtocol;

/// Decode a command payload; `null` reads as an empty payload.
pub(crate) fn parse<T>(command: &str, payload: Value) -> RuntimeResult<T>
where
    T: DeserializeOwned + Default,
{
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload).map_err(|source| RuntimeError::Payload {
        command: command.to_string(),
        source,
    })
}
