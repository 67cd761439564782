//! wf-runtime: drive wireflow graphs over a message transport.
//!
//! A [`Runtime`] speaks three protocols:
//! - `graph`: `clear` a graph, then edit it; every change is echoed back
//! - `network`: `start` and `stop` a network for the graph and report its
//!   traffic (`started`, socket events, `stopped`)
//! - `component`: `list` describes every registered component
//!
//! Messages go out to listeners added with [`Runtime::add_listener`] or
//! [`Runtime::add_transport`]. [`GraphProvider`] gets a graph and network
//! going either from a local file or from a client using the runtime.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use serde_json::json;
//! use wf_core::Scheduler;
//! use wf_network::ComponentLoader;
//! use wf_runtime::{Runtime, RuntimeOptions};
//!
//! let loader = ComponentLoader::new("/", Rc::new(Scheduler::new()));
//! let runtime = Runtime::new(loader, RuntimeOptions::default());
//! runtime.add_listener(|message| {
//!     println!("{} {}", message.protocol, message.command);
//!     Ok(())
//! });
//! runtime.receive("graph", "clear", json!({"baseDir": "/"}), None).unwrap();
//! assert_eq!(runtime.graph().unwrap().name(), "wireflow runtime");
//! ```

pub mod error;
pub mod message;
pub mod protocol;
pub mod provider;
pub mod runtime;

pub use error::{RuntimeError, RuntimeResult};
pub use message::Message;
pub use protocol::component::{ComponentDescription, PortDescription};
pub use protocol::graph::DEFAULT_GRAPH_NAME;
pub use provider::{GraphProvider, ProviderKind, ProviderOptions};
pub use runtime::{Runtime, RuntimeOptions, Transport};
