//! wf-graph: declarative flow graph model for wireflow.
//!
//! Provides:
//! - The mutable [`Graph`] (nodes, edges, initial packets, exports, groups)
//! - [`GraphEvent`] change notifications for every successful mutation
//! - The persisted [`GraphDocument`] format (JSON or YAML)
//! - Graphviz DOT and yUML renderings
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use wf_graph::Graph;
//!
//! let graph = Graph::new("hello");
//! graph.add_node("Foo", "core/Repeat", None).unwrap();
//! graph.add_node("Bar", "core/Drop", None).unwrap();
//! graph.add_edge("Foo", "out", "Bar", "in", None).unwrap();
//! graph.add_initial(json!("Hello, world!"), "Foo", "in", None).unwrap();
//!
//! let doc = graph.to_json();
//! assert_eq!(doc.processes.len(), 2);
//! assert_eq!(doc.connections.len(), 2);
//! ```

pub mod document;
pub mod error;
pub mod event;
pub mod export;
pub mod graph;

pub use document::{ConnectionDef, EndpointDef, GraphDocument, ProcessDef, load_file, save_file};
pub use error::{GraphError, GraphResult};
pub use event::GraphEvent;
pub use graph::{
    ComponentRef, Edge, Export, Graph, Group, Initial, InitialData, Metadata, Node, PortAddress,
};
