//! wf-core: shared foundation for wireflow.
//!
//! Contains:
//! - error (fatal engine conditions shared by every layer)
//! - packet (the value type carried through sockets)
//! - emitter (per-entity event subscriptions)
//! - scheduler (single-threaded run-loop with timers)

pub mod emitter;
pub mod error;
pub mod packet;
pub mod scheduler;

// Re-exports: nice ergonomics for downstream crates
pub use emitter::{Emitter, ListenerId};
pub use error::{FlowError, FlowResult};
pub use packet::{Packet, error_packet};
pub use scheduler::{Clock, Scheduler, Task};
