//! The built-in `Graph` component: a whole network behind one node.
//!
//! The `graph` inport takes a graph document or a file path and builds an
//! inner network from it. The component is not ready until every inner
//! process is ready; at that point the inner ports are exposed as its own,
//! either all of them as `node.port` or, when the inner graph declares
//! exports, only the exported ones under their public names. Occupied single
//! ports are never exposed.
//!
//! When the `start` inport is attached the inner network is only connected
//! once a packet arrives on it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::debug;
use wf_core::{Emitter, FlowError, FlowResult, ListenerId, Packet};
use wf_graph::{Graph, GraphDocument, load_file};
use wf_ports::{Port, PortEvent};

use crate::component::{Component, ComponentBase, ComponentContext};
use crate::network::{Network, NetworkState, Process, create_network};

/// Where a subgraph comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphSource {
    Document(GraphDocument),
    File(PathBuf),
}

impl GraphSource {
    /// Read a `graph` inport packet: an object is a document, a string is a
    /// file path resolved against `base_dir` when relative.
    pub fn from_packet(packet: &Packet, base_dir: &str) -> FlowResult<Self> {
        match packet {
            Value::String(path) => {
                let path = Path::new(path);
                if path.is_absolute() {
                    Ok(GraphSource::File(path.to_path_buf()))
                } else {
                    Ok(GraphSource::File(Path::new(base_dir).join(path)))
                }
            }
            Value::Object(_) => Ok(GraphSource::Document(GraphDocument::from_value(
                packet.clone(),
            )?)),
            other => Err(FlowError::config(format!(
                "graph must be a document or a file path, got {other}"
            ))),
        }
    }

    fn load(&self) -> FlowResult<Graph> {
        let graph = match self {
            GraphSource::Document(doc) => Graph::load_json(doc)?,
            GraphSource::File(path) => load_file(path)?,
        };
        Ok(graph)
    }
}

pub struct SubgraphComponent {
    base: ComponentBase,
    ctx: ComponentContext,
    network: RefCell<Option<Network>>,
    started: Cell<bool>,
    /// Inner processes still waiting to become ready.
    pending: Cell<usize>,
    network_events: Emitter<Network>,
    me: Weak<SubgraphComponent>,
}

impl fmt::Debug for SubgraphComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubgraphComponent")
            .field("base", &self.base)
            .field("has_network", &self.network.borrow().is_some())
            .field("started", &self.started.get())
            .finish()
    }
}

impl SubgraphComponent {
    pub fn new(ctx: &ComponentContext) -> Rc<Self> {
        let component = Rc::new_cyclic(|me| Self {
            base: ComponentBase::new("Run a graph as a component"),
            ctx: ctx.clone(),
            network: RefCell::new(None),
            started: Cell::new(false),
            pending: Cell::new(0),
            network_events: Emitter::new(),
            me: me.clone(),
        });

        let graph = component.base.in_ports.add("graph", Port::new("all"));
        let me = Rc::downgrade(&component);
        graph.on(move |event| match (event, me.upgrade()) {
            (PortEvent::Data { packet, .. }, Some(component)) => {
                let source = GraphSource::from_packet(packet, &component.ctx.base_dir)?;
                component.set_graph(source)
            }
            _ => Ok(()),
        });

        let start = component.base.in_ports.add("start", Port::new("bang"));
        let me = Rc::downgrade(&component);
        start.on(move |event| match (event, me.upgrade()) {
            (PortEvent::Data { .. }, Some(component)) => component.start(),
            _ => Ok(()),
        });

        component
    }

    /// Build a subgraph for a registered or inline graph. The `graph` and
    /// `start` inports are removed.
    pub fn from_source(ctx: &ComponentContext, source: GraphSource) -> FlowResult<Rc<Self>> {
        let component = Self::new(ctx);
        component.base.in_ports.remove("graph");
        component.base.in_ports.remove("start");
        component.set_graph(source)?;
        Ok(component)
    }

    /// Replace the inner graph and build a network for it.
    pub fn set_graph(&self, source: GraphSource) -> FlowResult<()> {
        self.base.set_not_ready();
        let graph = source.load()?;
        graph.set_base_dir(Some(self.ctx.base_dir.clone()));
        debug!(graph = %graph.name(), "subgraph loaded");

        let delay = self
            .base
            .in_ports
            .get("start")
            .is_some_and(|port| port.is_attached())
            && !self.started.get();
        let me = self.me.clone();
        create_network(Rc::new(graph), &self.ctx, delay, move |network| {
            match me.upgrade() {
                Some(component) => component.adopt(network, !delay),
                None => Ok(()),
            }
        })?;
        Ok(())
    }

    /// The inner network, once built.
    pub fn network(&self) -> Option<Network> {
        self.network.borrow().clone()
    }

    /// Observe every inner network this component builds.
    pub fn on_network<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Network) -> FlowResult<()> + 'static,
    {
        self.network_events.on(listener)
    }

    fn start(&self) -> FlowResult<()> {
        self.started.set(true);
        let Some(network) = self.network() else {
            return Ok(());
        };
        if network.state() != NetworkState::Constructed {
            return Ok(());
        }
        let me = self.me.clone();
        let net = network.clone();
        network.connect(move || {
            net.start();
            match me.upgrade() {
                Some(component) => component.check_processes(&net),
                None => Ok(()),
            }
        })
    }

    fn adopt(&self, network: &Network, check: bool) -> FlowResult<()> {
        *self.network.borrow_mut() = Some(network.clone());
        self.network_events.emit(network)?;
        if check {
            self.check_processes(network)?;
        }
        Ok(())
    }

    fn check_processes(&self, network: &Network) -> FlowResult<()> {
        let mut waiting = 0;
        for process in network.processes() {
            if !self.check_process(process) {
                waiting += 1;
            }
        }
        self.pending.set(waiting);
        if waiting == 0 {
            self.set_to_ready();
        }
        Ok(())
    }

    /// Expose the ports of a ready process, or wait for it.
    fn check_process(&self, process: Process) -> bool {
        let Some(component) = process.component.clone() else {
            return true;
        };
        if !component.is_ready() {
            let me = self.me.clone();
            component.base().on_ready(move || {
                if let Some(subgraph) = me.upgrade() {
                    subgraph.check_process(process);
                    let left = subgraph.pending.get().saturating_sub(1);
                    subgraph.pending.set(left);
                    if left == 0 {
                        subgraph.set_to_ready();
                    }
                }
                Ok(())
            });
            return false;
        }
        self.expose_ports(&process.id, component.as_ref());
        true
    }

    fn expose_ports(&self, node: &str, component: &dyn Component) {
        for (name, port) in component.in_ports().entries() {
            if let Some(public) = self.exported_name(&port, node, &name) {
                self.base.in_ports.insert(public, port);
            }
        }
        for (name, port) in component.out_ports().entries() {
            if let Some(public) = self.exported_name(&port, node, &name) {
                self.base.out_ports.insert(public, port);
            }
        }
    }

    fn exported_name(&self, port: &Port, node: &str, name: &str) -> Option<String> {
        if !port.can_attach() {
            return None;
        }
        let private = format!("{}.{}", node.to_lowercase(), name);
        let exports = self.network()?.graph().exports();
        if exports.is_empty() {
            return Some(private);
        }
        exports
            .into_iter()
            .find(|export| export.private == private)
            .map(|export| export.public)
    }

    fn set_to_ready(&self) {
        let me = self.me.clone();
        self.ctx.scheduler.defer(move || match me.upgrade() {
            Some(component) => component.base.mark_ready(),
            None => Ok(()),
        });
    }
}

impl Component for SubgraphComponent {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn is_subgraph(&self) -> bool {
        true
    }

    fn as_subgraph(&self) -> Option<&SubgraphComponent> {
        Some(self)
    }

    fn shutdown(&self) -> FlowResult<()> {
        match self.network() {
            Some(network) => network.dispose(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wf_core::Scheduler;

    use crate::loader::ComponentLoader;

    #[test]
    fn packet_strings_are_paths_relative_to_base() {
        let source = GraphSource::from_packet(&json!("graphs/a.json"), "/srv").unwrap();
        assert_eq!(source, GraphSource::File(PathBuf::from("/srv/graphs/a.json")));

        let source = GraphSource::from_packet(&json!("/abs/b.yaml"), "/srv").unwrap();
        assert_eq!(source, GraphSource::File(PathBuf::from("/abs/b.yaml")));
    }

    #[test]
    fn packet_objects_are_documents() {
        let source = GraphSource::from_packet(
            &json!({"properties": {"name": "inner"}, "processes": {}}),
            "/",
        )
        .unwrap();
        match source {
            GraphSource::Document(doc) => assert_eq!(doc.name(), "inner"),
            other => panic!("expected document, got {other:?}"),
        }
        assert!(GraphSource::from_packet(&json!(3), "/").is_err());
    }

    #[test]
    fn empty_graph_becomes_ready() {
        let loader = ComponentLoader::new("/", Rc::new(Scheduler::new()));
        let subgraph = SubgraphComponent::from_source(
            &loader.context(),
            GraphSource::Document(GraphDocument::default()),
        )
        .unwrap();
        assert!(!subgraph.is_ready());
        assert!(subgraph.in_ports().is_empty());

        loader.scheduler().run_until_idle().unwrap();
        assert!(subgraph.is_ready());
        assert!(subgraph.network().is_some());
    }
}
