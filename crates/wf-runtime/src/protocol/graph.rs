//! Graph protocol: `clear` starts a new graph, the other commands edit it.
//!
//! Edits are not acknowledged directly. Every change the graph applies is
//! echoed as its own message (`addnode`, `removeedge`, ...), so removing a
//! node reports the edges and initial packets that went with it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use wf_core::{FlowResult, ListenerId};
use wf_graph::{ComponentRef, Graph, GraphEvent, InitialData, Metadata, PortAddress};

use super::parse;
use crate::error::{RuntimeError, RuntimeResult};
use crate::message::{Outbound, encode};

pub const PROTOCOL: &str = "graph";

/// Name given to graphs cleared without one.
pub const DEFAULT_GRAPH_NAME: &str = "wireflow runtime";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearPayload {
    name: Option<String>,
    base_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NodePayload {
    id: Option<String>,
    component: Option<ComponentRef>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
struct RenamePayload {
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EdgePayload {
    from: Option<PortAddress>,
    to: Option<PortAddress>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
struct InitialPayload {
    from: Option<InitialData>,
    to: Option<PortAddress>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportPayload {
    public: Option<String>,
    private: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupPayload {
    name: Option<String>,
    nodes: Option<Vec<String>>,
    metadata: Option<Metadata>,
}

#[derive(Debug)]
pub struct GraphProtocol {
    outbound: Outbound,
    /// Overrides the `baseDir` sent with `clear`.
    base_dir: Option<String>,
    graph: RefCell<Option<Rc<Graph>>>,
    listener: Cell<Option<ListenerId>>,
}

impl GraphProtocol {
    pub(crate) fn new(outbound: Outbound, base_dir: Option<String>) -> Self {
        Self {
            outbound,
            base_dir,
            graph: RefCell::new(None),
            listener: Cell::new(None),
        }
    }

    /// The graph built by the last `clear`.
    pub fn graph(&self) -> Option<Rc<Graph>> {
        self.graph.borrow().clone()
    }

    pub(crate) fn receive(
        &self,
        command: &str,
        payload: Value,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        if command == "clear" {
            return self.clear(parse(command, payload)?, context);
        }
        let Some(graph) = self.graph() else {
            self.outbound.error(PROTOCOL, "No graph defined", context)?;
            return Ok(());
        };
        match command {
            "addnode" => self.add_node(&graph, parse(command, payload)?, context),
            "removenode" => self.remove_node(&graph, parse(command, payload)?, context),
            "renamenode" => self.rename_node(&graph, parse(command, payload)?, context),
            "addedge" => self.add_edge(&graph, parse(command, payload)?, context),
            "removeedge" => self.remove_edge(&graph, parse(command, payload)?, context),
            "addinitial" => self.add_initial(&graph, parse(command, payload)?, context),
            "removeinitial" => self.remove_initial(&graph, parse(command, payload)?, context),
            "addexport" => self.add_export(&graph, parse(command, payload)?, context),
            "removeexport" => self.remove_export(&graph, parse(command, payload)?, context),
            "addgroup" => self.add_group(&graph, parse(command, payload)?, context),
            "removegroup" => self.remove_group(&graph, parse(command, payload)?, context),
            _ => Err(RuntimeError::UnknownCommand {
                protocol: PROTOCOL.to_string(),
                command: command.to_string(),
            }),
        }
    }

    fn clear(&self, payload: ClearPayload, context: Option<&Value>) -> RuntimeResult<()> {
        let Some(base_dir) = payload.base_dir.filter(|dir| !dir.is_empty()) else {
            self.outbound
                .error(PROTOCOL, "No graph baseDir provided", context)?;
            return Ok(());
        };
        let name = payload
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_GRAPH_NAME.to_string());
        let graph = Rc::new(Graph::new(name));
        graph.set_base_dir(Some(self.base_dir.clone().unwrap_or(base_dir)));
        debug!(graph = %graph.name(), base_dir = ?graph.base_dir(), "graph cleared");

        if let (Some(previous), Some(id)) = (self.graph(), self.listener.take()) {
            previous.unsubscribe(id);
        }
        let outbound = self.outbound.clone();
        let context = context.cloned();
        let id = graph.subscribe(move |event| {
            outbound.send(PROTOCOL, event.topic(), event_payload(event)?, context.as_ref())
        });
        self.listener.set(Some(id));
        *self.graph.borrow_mut() = Some(graph);
        Ok(())
    }

    fn add_node(
        &self,
        graph: &Graph,
        payload: NodePayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let (Some(id), Some(component)) = (payload.id, payload.component) else {
            self.outbound
                .error(PROTOCOL, "No ID or component supplied", context)?;
            return Ok(());
        };
        graph.add_node(id, component, payload.metadata)?;
        Ok(())
    }

    fn remove_node(
        &self,
        graph: &Graph,
        payload: NodePayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let Some(id) = payload.id else {
            self.outbound.error(PROTOCOL, "No ID supplied", context)?;
            return Ok(());
        };
        graph.remove_node(&id)?;
        Ok(())
    }

    fn rename_node(
        &self,
        graph: &Graph,
        payload: RenamePayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let (Some(from), Some(to)) = (payload.from, payload.to) else {
            self.outbound
                .error(PROTOCOL, "No from or to supplied", context)?;
            return Ok(());
        };
        graph.rename_node(&from, &to)?;
        Ok(())
    }

    fn add_edge(
        &self,
        graph: &Graph,
        payload: EdgePayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let (Some(from), Some(to)) = (payload.from, payload.to) else {
            self.outbound
                .error(PROTOCOL, "No from or to supplied", context)?;
            return Ok(());
        };
        graph.add_edge(&from.node, &from.port, &to.node, &to.port, payload.metadata)?;
        Ok(())
    }

    fn remove_edge(
        &self,
        graph: &Graph,
        payload: EdgePayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let (Some(from), Some(to)) = (payload.from, payload.to) else {
            self.outbound
                .error(PROTOCOL, "No from or to supplied", context)?;
            return Ok(());
        };
        graph.remove_edge(&from.node, &from.port, Some((&to.node, &to.port)))?;
        Ok(())
    }

    fn add_initial(
        &self,
        graph: &Graph,
        payload: InitialPayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let (Some(from), Some(to)) = (payload.from, payload.to) else {
            self.outbound
                .error(PROTOCOL, "No from or to supplied", context)?;
            return Ok(());
        };
        graph.add_initial(from.data, &to.node, &to.port, payload.metadata)?;
        Ok(())
    }

    fn remove_initial(
        &self,
        graph: &Graph,
        payload: InitialPayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let Some(to) = payload.to else {
            self.outbound.error(PROTOCOL, "No to supplied", context)?;
            return Ok(());
        };
        graph.remove_initial(&to.node, &to.port)?;
        Ok(())
    }

    fn add_export(
        &self,
        graph: &Graph,
        payload: ExportPayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let (Some(private), Some(public)) = (payload.private, payload.public) else {
            self.outbound
                .error(PROTOCOL, "No private or public supplied", context)?;
            return Ok(());
        };
        graph.add_export(&private, &public, payload.metadata)?;
        Ok(())
    }

    fn remove_export(
        &self,
        graph: &Graph,
        payload: ExportPayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let Some(public) = payload.public else {
            self.outbound.error(PROTOCOL, "No public supplied", context)?;
            return Ok(());
        };
        graph.remove_export(&public)?;
        Ok(())
    }

    fn add_group(
        &self,
        graph: &Graph,
        payload: GroupPayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let Some(name) = payload.name else {
            self.outbound.error(PROTOCOL, "No name supplied", context)?;
            return Ok(());
        };
        graph.add_group(&name, payload.nodes.unwrap_or_default(), payload.metadata)?;
        Ok(())
    }

    fn remove_group(
        &self,
        graph: &Graph,
        payload: GroupPayload,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let Some(name) = payload.name else {
            self.outbound.error(PROTOCOL, "No name supplied", context)?;
            return Ok(());
        };
        graph.remove_group(&name)?;
        Ok(())
    }
}

/// The wire payload for a graph change.
pub fn event_payload(event: &GraphEvent) -> FlowResult<Value> {
    match event {
        GraphEvent::AddNode(node) | GraphEvent::RemoveNode(node) => encode(node),
        GraphEvent::RenameNode { from, to } => Ok(json!({ "from": from, "to": to })),
        GraphEvent::AddEdge(edge) | GraphEvent::RemoveEdge(edge) => encode(edge),
        GraphEvent::AddInitial(initial) | GraphEvent::RemoveInitial(initial) => encode(initial),
        GraphEvent::AddExport(export) | GraphEvent::RemoveExport(export) => encode(export),
        GraphEvent::AddGroup(group) | GraphEvent::RemoveGroup(group) => encode(group),
    }
}
