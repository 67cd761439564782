//! wf-network: components and the network that runs them.
//!
//! Contains:
//! - component (the `Component` trait, `ComponentBase`, `ComponentContext`)
//! - async_component (load-tracking wrapper that serializes async work)
//! - loader (name -> component factory registry)
//! - subgraph (the built-in `Graph` component)
//! - network (graph-driven process wiring and run accounting)
//! - event (what a network reports while it runs)

pub mod async_component;
pub mod component;
pub mod event;
pub mod loader;
pub mod network;
pub mod subgraph;

pub use async_component::{AsyncComponent, AsyncHandler, AsyncJob};
pub use component::{Component, ComponentBase, ComponentContext};
pub use event::{NetworkEvent, SocketActivity};
pub use loader::{ComponentLoader, Factory};
pub use network::{Network, NetworkState, Process, create_network};
pub use subgraph::{GraphSource, SubgraphComponent};
