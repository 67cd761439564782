//! Core graph data structures.

use std::cell::RefCell;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use wf_core::{Emitter, FlowResult, ListenerId};

use crate::document::GraphDocument;
use crate::event::GraphEvent;

/// Free-form metadata attached to graph entities.
pub type Metadata = serde_json::Map<String, Value>;

/// A `{node, port}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortAddress {
    pub node: String,
    pub port: String,
}

impl PortAddress {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }

    pub fn matches(&self, node: &str, port: &str) -> bool {
        self.node == node && self.port == port
    }
}

/// What a node instantiates: a registered component name or an inline graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentRef {
    Name(String),
    Graph(Box<GraphDocument>),
}

impl ComponentRef {
    /// The component name, if this is not an inline graph.
    pub fn name(&self) -> Option<&str> {
        match self {
            ComponentRef::Name(name) => Some(name),
            ComponentRef::Graph(_) => None,
        }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentRef::Name(name) => write!(f, "{}", name),
            ComponentRef::Graph(doc) => write!(f, "graph:{}", doc.name()),
        }
    }
}

impl From<&str> for ComponentRef {
    fn from(name: &str) -> Self {
        ComponentRef::Name(name.to_string())
    }
}

impl From<String> for ComponentRef {
    fn from(name: String) -> Self {
        ComponentRef::Name(name)
    }
}

impl From<GraphDocument> for ComponentRef {
    fn from(doc: GraphDocument) -> Self {
        ComponentRef::Graph(Box::new(doc))
    }
}

/// A process declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub component: ComponentRef,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A connection from an outport to an inport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: PortAddress,
    pub to: PortAddress,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialData {
    pub data: Value,
}

/// An initial information packet delivered to an inport at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initial {
    pub from: InitialData,
    pub to: PortAddress,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Publishes an inner `node.port` under a public name. Both are lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    pub public: String,
    pub private: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Export {
    /// Node part of the private name.
    pub fn node(&self) -> &str {
        self.private.split('.').next().unwrap_or_default()
    }

    /// Port part of the private name.
    pub fn port(&self) -> &str {
        self.private.split_once('.').map(|(_, port)| port).unwrap_or_default()
    }
}

/// A named set of nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Default)]
struct GraphState {
    properties: Metadata,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    initializers: Vec<Initial>,
    exports: Vec<Export>,
    groups: Vec<Group>,
}

/// A flow graph.
///
/// All mutation goes through `&self` methods; the collections sit behind a
/// `RefCell` that is released before any [`GraphEvent`] is emitted, so a
/// listener may read or mutate the graph again while handling an event.
///
/// Mutations that reference unknown nodes are silent no-ops and return `None`
/// (or an empty list). The `Err` side only carries failures raised by
/// listeners, such as a network failing to wire a new edge.
#[derive(Debug)]
pub struct Graph {
    name: RefCell<String>,
    base_dir: RefCell<Option<String>>,
    state: RefCell<GraphState>,
    events: Emitter<GraphEvent>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("")
    }
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: RefCell::new(name.into()),
            base_dir: RefCell::new(None),
            state: RefCell::new(GraphState::default()),
            events: Emitter::new(),
        }
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.borrow_mut() = name.into();
    }

    /// Directory components are resolved against, if set.
    pub fn base_dir(&self) -> Option<String> {
        self.base_dir.borrow().clone()
    }

    pub fn set_base_dir(&self, base_dir: Option<String>) {
        *self.base_dir.borrow_mut() = base_dir;
    }

    pub fn properties(&self) -> Metadata {
        self.state.borrow().properties.clone()
    }

    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        self.state.borrow_mut().properties.insert(key.into(), value);
    }

    /// Listen to every future mutation.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&GraphEvent) -> FlowResult<()> + 'static,
    {
        self.events.on(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // ---------------------------------------------------------------------
    // Queries (snapshots)
    // ---------------------------------------------------------------------

    pub fn nodes(&self) -> Vec<Node> {
        self.state.borrow().nodes.clone()
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.state.borrow().nodes.iter().find(|n| n.id == id).cloned()
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.state.borrow().nodes.iter().any(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().nodes.is_empty()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.state.borrow().edges.clone()
    }

    pub fn initializers(&self) -> Vec<Initial> {
        self.state.borrow().initializers.clone()
    }

    pub fn exports(&self) -> Vec<Export> {
        self.state.borrow().exports.clone()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.state.borrow().groups.clone()
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    /// Add a node. Returns `None` if the id is taken.
    pub fn add_node(
        &self,
        id: impl Into<String>,
        component: impl Into<ComponentRef>,
        metadata: Option<Metadata>,
    ) -> FlowResult<Option<Node>> {
        let node = Node {
            id: id.into(),
            component: component.into(),
            metadata: metadata.unwrap_or_default(),
        };
        {
            let mut state = self.state.borrow_mut();
            if state.nodes.iter().any(|n| n.id == node.id) {
                debug!(node = %node.id, "node already exists");
                return Ok(None);
            }
            state.nodes.push(node.clone());
        }
        self.events.emit(&GraphEvent::AddNode(node.clone()))?;
        Ok(Some(node))
    }

    /// Remove a node together with every edge, initial, export and group
    /// membership that references it.
    ///
    /// Export private names are lowercase, so an export only goes with the
    /// node when no other node shares its lowercased id. Events are emitted
    /// once the graph is fully updated.
    pub fn remove_node(&self, id: &str) -> FlowResult<Option<Node>> {
        let (node, edges, initials, exports) = {
            let mut state = self.state.borrow_mut();
            let Some(index) = state.nodes.iter().position(|n| n.id == id) else {
                return Ok(None);
            };
            let node = state.nodes.remove(index);

            let edges: Vec<Edge> = state
                .edges
                .extract_if(.., |e| e.from.node == id || e.to.node == id)
                .collect();
            let initials: Vec<Initial> = state
                .initializers
                .extract_if(.., |i| i.to.node == id)
                .collect();
            let lowered = id.to_lowercase();
            let shared = state.nodes.iter().any(|n| n.id.to_lowercase() == lowered);
            let exports: Vec<Export> = if shared {
                Vec::new()
            } else {
                state
                    .exports
                    .extract_if(.., |e| e.node() == lowered)
                    .collect()
            };
            for group in state.groups.iter_mut() {
                group.nodes.retain(|n| n != id);
            }
            (node, edges, initials, exports)
        };

        for edge in edges {
            self.events.emit(&GraphEvent::RemoveEdge(edge))?;
        }
        for initial in initials {
            self.events.emit(&GraphEvent::RemoveInitial(initial))?;
        }
        for export in exports {
            self.events.emit(&GraphEvent::RemoveExport(export))?;
        }
        self.events.emit(&GraphEvent::RemoveNode(node.clone()))?;
        Ok(Some(node))
    }

    /// Rename a node and every reference to it.
    ///
    /// Returns false when `old_id` is unknown or `new_id` is already taken.
    pub fn rename_node(&self, old_id: &str, new_id: &str) -> FlowResult<bool> {
        {
            let mut state = self.state.borrow_mut();
            if old_id == new_id
                || state.nodes.iter().any(|n| n.id == new_id)
                || !state.nodes.iter().any(|n| n.id == old_id)
            {
                return Ok(false);
            }

            for node in state.nodes.iter_mut().filter(|n| n.id == old_id) {
                node.id = new_id.to_string();
            }
            for edge in state.edges.iter_mut() {
                if edge.from.node == old_id {
                    edge.from.node = new_id.to_string();
                }
                if edge.to.node == old_id {
                    edge.to.node = new_id.to_string();
                }
            }
            for initial in state.initializers.iter_mut() {
                if initial.to.node == old_id {
                    initial.to.node = new_id.to_string();
                }
            }
            let old_lower = old_id.to_lowercase();
            let new_lower = new_id.to_lowercase();
            for export in state.exports.iter_mut() {
                if export.node() == old_lower {
                    export.private = format!("{}.{}", new_lower, export.port());
                }
            }
            for group in state.groups.iter_mut() {
                for member in group.nodes.iter_mut().filter(|n| *n == old_id) {
                    *member = new_id.to_string();
                }
            }
        }

        self.events.emit(&GraphEvent::RenameNode {
            from: old_id.to_string(),
            to: new_id.to_string(),
        })?;
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Edges
    // ---------------------------------------------------------------------

    /// Connect `out_node.out_port` to `in_node.in_port`.
    ///
    /// Returns `None` when either node is unknown.
    pub fn add_edge(
        &self,
        out_node: &str,
        out_port: &str,
        in_node: &str,
        in_port: &str,
        metadata: Option<Metadata>,
    ) -> FlowResult<Option<Edge>> {
        if !self.has_node(out_node) || !self.has_node(in_node) {
            debug!(out_node, in_node, "edge references unknown node");
            return Ok(None);
        }
        let edge = Edge {
            from: PortAddress::new(out_node, out_port),
            to: PortAddress::new(in_node, in_port),
            metadata: metadata.unwrap_or_default(),
        };
        self.state.borrow_mut().edges.push(edge.clone());
        self.events.emit(&GraphEvent::AddEdge(edge.clone()))?;
        Ok(Some(edge))
    }

    /// Remove edges attached to `node.port` on either side.
    ///
    /// With `other`, only edges whose opposite end is exactly that
    /// `(node, port)` are removed.
    pub fn remove_edge(
        &self,
        node: &str,
        port: &str,
        other: Option<(&str, &str)>,
    ) -> FlowResult<Vec<Edge>> {
        let opposite = |end: &PortAddress| match other {
            Some((other_node, other_port)) => end.matches(other_node, other_port),
            None => true,
        };
        let removed: Vec<Edge> = self
            .state
            .borrow_mut()
            .edges
            .extract_if(.., |e| {
                (e.from.matches(node, port) && opposite(&e.to))
                    || (e.to.matches(node, port) && opposite(&e.from))
            })
            .collect();
        for edge in &removed {
            self.events.emit(&GraphEvent::RemoveEdge(edge.clone()))?;
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Initial packets
    // ---------------------------------------------------------------------

    /// Register an initial packet for `node.port`. Returns `None` for an unknown node.
    pub fn add_initial(
        &self,
        data: Value,
        node: &str,
        port: &str,
        metadata: Option<Metadata>,
    ) -> FlowResult<Option<Initial>> {
        if !self.has_node(node) {
            debug!(node, "initial references unknown node");
            return Ok(None);
        }
        let initial = Initial {
            from: InitialData { data },
            to: PortAddress::new(node, port),
            metadata: metadata.unwrap_or_default(),
        };
        self.state.borrow_mut().initializers.push(initial.clone());
        self.events.emit(&GraphEvent::AddInitial(initial.clone()))?;
        Ok(Some(initial))
    }

    pub fn remove_initial(&self, node: &str, port: &str) -> FlowResult<Vec<Initial>> {
        let removed: Vec<Initial> = self
            .state
            .borrow_mut()
            .initializers
            .extract_if(.., |i| i.to.matches(node, port))
            .collect();
        for initial in &removed {
            self.events.emit(&GraphEvent::RemoveInitial(initial.clone()))?;
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Exports
    // ---------------------------------------------------------------------

    /// Export `private` (`node.port`) as `public`. Both names are lowercased.
    pub fn add_export(
        &self,
        private: &str,
        public: &str,
        metadata: Option<Metadata>,
    ) -> FlowResult<Option<Export>> {
        let export = Export {
            public: public.to_lowercase(),
            private: private.to_lowercase(),
            metadata,
        };
        {
            let mut state = self.state.borrow_mut();
            let node_known = state
                .nodes
                .iter()
                .any(|n| n.id.to_lowercase() == export.node());
            if !node_known {
                debug!(private, "export references unknown node");
                return Ok(None);
            }
            state.exports.push(export.clone());
        }
        self.events.emit(&GraphEvent::AddExport(export.clone()))?;
        Ok(Some(export))
    }

    pub fn remove_export(&self, public: &str) -> FlowResult<Option<Export>> {
        let public = public.to_lowercase();
        let removed = {
            let mut state = self.state.borrow_mut();
            let index = state.exports.iter().position(|e| e.public == public);
            index.map(|i| state.exports.remove(i))
        };
        if let Some(export) = &removed {
            self.events.emit(&GraphEvent::RemoveExport(export.clone()))?;
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------------

    /// Add a named group. Returns `None` if the name is taken or a member is unknown.
    pub fn add_group(
        &self,
        name: &str,
        nodes: Vec<String>,
        metadata: Option<Metadata>,
    ) -> FlowResult<Option<Group>> {
        let group = Group {
            name: name.to_string(),
            nodes,
            metadata,
        };
        {
            let mut state = self.state.borrow_mut();
            if state.groups.iter().any(|g| g.name == group.name) {
                return Ok(None);
            }
            let unknown = group
                .nodes
                .iter()
                .find(|id| !state.nodes.iter().any(|n| &n.id == *id));
            if let Some(id) = unknown {
                debug!(group = name, node = %id, "group references unknown node");
                return Ok(None);
            }
            state.groups.push(group.clone());
        }
        self.events.emit(&GraphEvent::AddGroup(group.clone()))?;
        Ok(Some(group))
    }

    pub fn remove_group(&self, name: &str) -> FlowResult<Option<Group>> {
        let removed = {
            let mut state = self.state.borrow_mut();
            let index = state.groups.iter().position(|g| g.name == name);
            index.map(|i| state.groups.remove(i))
        };
        if let Some(group) = &removed {
            self.events.emit(&GraphEvent::RemoveGroup(group.clone()))?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::rc::Rc;
    use wf_core::FlowError;

    fn recorded(graph: &Graph) -> Rc<RefCell<Vec<GraphEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        graph.subscribe(move |event| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });
        events
    }

    fn foo_bar() -> Graph {
        let graph = Graph::new("test");
        graph.add_node("Foo", "core/Repeat", None).unwrap();
        graph.add_node("Bar", "core/Drop", None).unwrap();
        graph.add_edge("Foo", "out", "Bar", "in", None).unwrap();
        graph.add_initial(json!("Hello, world!"), "Foo", "in", None).unwrap();
        graph
    }

    #[test]
    fn add_node_emits_and_rejects_duplicates() {
        let graph = Graph::new("g");
        let events = recorded(&graph);

        let node = graph.add_node("Foo", "core/Repeat", None).unwrap();
        assert_eq!(node.unwrap().id, "Foo");
        assert!(graph.add_node("Foo", "core/Drop", None).unwrap().is_none());

        assert_eq!(events.borrow().len(), 1);
        assert_eq!(graph.node("Foo").unwrap().component.name(), Some("core/Repeat"));
    }

    #[test]
    fn edge_to_missing_node_is_silent() {
        let graph = Graph::new("g");
        graph.add_node("Foo", "core/Repeat", None).unwrap();
        let events = recorded(&graph);

        assert!(graph.add_edge("Foo", "out", "Nope", "in", None).unwrap().is_none());
        assert!(graph.add_initial(json!(1), "Nope", "in", None).unwrap().is_none());
        assert!(events.borrow().is_empty());
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn remove_node_cascades() {
        let graph = foo_bar();
        graph.add_export("Bar.in", "sink", None).unwrap();
        graph
            .add_group("pair", vec!["Foo".into(), "Bar".into()], None)
            .unwrap();
        let events = recorded(&graph);

        let removed = graph.remove_node("Bar").unwrap().unwrap();
        assert_eq!(removed.id, "Bar");
        assert!(graph.edges().is_empty());
        assert_eq!(graph.initializers().len(), 1);
        assert!(graph.exports().is_empty());
        assert_eq!(graph.groups()[0].nodes, vec!["Foo".to_string()]);

        let topics: Vec<&str> = events.borrow().iter().map(|e| e.topic()).collect();
        assert_eq!(topics, vec!["removeedge", "removeexport", "removenode"]);
    }

    #[test]
    fn rename_rewrites_references() {
        let graph = foo_bar();
        graph.add_export("Foo.in", "input", None).unwrap();
        graph.add_group("g", vec!["Foo".into()], None).unwrap();

        assert!(graph.rename_node("Foo", "Baz").unwrap());
        assert!(!graph.has_node("Foo"));
        assert_eq!(graph.edges()[0].from.node, "Baz");
        assert_eq!(graph.initializers()[0].to.node, "Baz");
        assert_eq!(graph.exports()[0].private, "baz.in");
        assert_eq!(graph.groups()[0].nodes, vec!["Baz".to_string()]);
    }

    #[test]
    fn rename_refuses_collisions() {
        let graph = foo_bar();
        assert!(!graph.rename_node("Foo", "Bar").unwrap());
        assert!(!graph.rename_node("Nope", "Other").unwrap());
    }

    #[test]
    fn remove_edge_with_and_without_target() {
        let graph = Graph::new("g");
        for id in ["A", "B", "C"] {
            graph.add_node(id, "core/Repeat", None).unwrap();
        }
        graph.add_edge("A", "out", "B", "in", None).unwrap();
        graph.add_edge("A", "out", "C", "in", None).unwrap();

        let removed = graph.remove_edge("A", "out", Some(("C", "in"))).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(graph.edges()[0].to.node, "B");

        let removed = graph.remove_edge("B", "in", None).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn exports_are_lowercased_and_removed_by_public_name() {
        let graph = foo_bar();
        let export = graph.add_export("Foo.IN", "Input", None).unwrap().unwrap();
        assert_eq!(export.private, "foo.in");
        assert_eq!(export.public, "input");
        assert_eq!(export.node(), "foo");
        assert_eq!(export.port(), "in");

        assert!(graph.add_export("Nope.in", "x", None).unwrap().is_none());
        assert!(graph.remove_export("INPUT").unwrap().is_some());
        assert!(graph.exports().is_empty());
    }

    #[test]
    fn groups_add_and_remove_by_name() {
        let graph = foo_bar();
        assert!(graph.add_group("g", vec!["Foo".into()], None).unwrap().is_some());
        assert!(graph.add_group("g", vec!["Bar".into()], None).unwrap().is_none());
        assert!(graph.add_group("h", vec!["Nope".into()], None).unwrap().is_none());
        assert_eq!(graph.remove_group("g").unwrap().unwrap().name, "g");
        assert!(graph.groups().is_empty());
    }

    #[test]
    fn listener_may_mutate_graph_reentrantly() {
        let graph = Rc::new(Graph::new("g"));
        let weak = Rc::downgrade(&graph);
        graph.subscribe(move |event| {
            if let (GraphEvent::AddNode(node), Some(graph)) = (event, weak.upgrade()) {
                if node.id == "Foo" {
                    graph.add_node("Shadow", "core/Drop", None)?;
                }
            }
            Ok(())
        });

        graph.add_node("Foo", "core/Repeat", None).unwrap();
        assert!(graph.has_node("Shadow"));
    }

    #[test]
    fn removing_a_node_keeps_exports_of_a_case_twin() {
        let graph = Graph::new("g");
        graph.add_node("Foo", "core/Repeat", None).unwrap();
        graph.add_node("foo", "core/Repeat", None).unwrap();
        graph.add_export("foo.in", "input", None).unwrap();

        graph.remove_node("Foo").unwrap();
        assert_eq!(graph.exports().len(), 1);

        graph.remove_node("foo").unwrap();
        assert!(graph.exports().is_empty());
    }

    #[test]
    fn failing_listener_sees_a_fully_removed_node() {
        let graph = foo_bar();
        graph.add_export("foo.in", "input", None).unwrap();
        graph.subscribe(|event| match event {
            GraphEvent::RemoveEdge(_) => Err(FlowError::component("listener failed")),
            _ => Ok(()),
        });

        assert!(graph.remove_node("Foo").is_err());
        assert!(!graph.has_node("Foo"));
        assert!(graph.edges().is_empty());
        assert!(graph.initializers().is_empty());
        assert!(graph.exports().is_empty());
    }
}
