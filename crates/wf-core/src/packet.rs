//! Information packets.

use serde_json::{Value, json};

use crate::error::FlowError;

/// The value carried by a socket `data` event.
pub type Packet = Value;

/// Render an error the way it travels over an error port or a transport.
pub fn error_packet(err: &FlowError) -> Packet {
    json!({ "message": err.to_string() })
}
