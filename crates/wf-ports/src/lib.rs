//! wf-ports: connections and attachment points between processes.
//!
//! Provides:
//! - [`InternalSocket`]: a stateful point-to-point channel (connect, groups, data, disconnect)
//! - [`Port`]: a named attachment point wrapping one socket, or many for array ports
//! - [`PortMap`]: the ordered set of ports a component exposes
//!
//! Delivery is synchronous: a `send` on an outport runs the downstream
//! handlers before it returns.

pub mod port;
pub mod port_map;
pub mod socket;

pub use port::{Port, PortEvent, PortKind};
pub use port_map::PortMap;
pub use socket::{Endpoint, InternalSocket, SocketEvent, create_socket};
