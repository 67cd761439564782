//! Network protocol: run the current graph and report what it does.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value, json};
use tracing::debug;
use wf_core::{FlowError, ListenerId};
use wf_graph::{Graph, GraphEvent};
use wf_network::{ComponentContext, Network, NetworkEvent, SocketActivity, create_network};
use wf_ports::SocketEvent;

use crate::error::{RuntimeError, RuntimeResult};
use crate::message::Outbound;

pub const PROTOCOL: &str = "network";

type Slot = Rc<RefCell<Option<Network>>>;

#[derive(Debug)]
pub struct NetworkProtocol {
    outbound: Outbound,
    network: Slot,
    /// Graph subscription that re-sends initials as they are added.
    initials: RefCell<Option<(Rc<Graph>, ListenerId)>>,
    /// Context of the `start` that built the current network.
    context: RefCell<Option<Value>>,
}

impl NetworkProtocol {
    pub(crate) fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            network: Rc::new(RefCell::new(None)),
            initials: RefCell::new(None),
            context: RefCell::new(None),
        }
    }

    /// The network built by the last `start`.
    pub fn network(&self) -> Option<Network> {
        self.network.borrow().clone()
    }

    pub(crate) fn receive(
        &self,
        command: &str,
        graph: Option<Rc<Graph>>,
        ctx: &ComponentContext,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        match command {
            "start" => self.start(graph, ctx, context),
            "stop" => self.stop(),
            _ => Err(RuntimeError::UnknownCommand {
                protocol: PROTOCOL.to_string(),
                command: command.to_string(),
            }),
        }
    }

    /// Send `error` for a failure raised while the network ran.
    pub(crate) fn report(&self, err: &FlowError) -> RuntimeResult<()> {
        let context = self.context.borrow().clone();
        self.outbound.error(PROTOCOL, err, context.as_ref())?;
        Ok(())
    }

    fn start(
        &self,
        graph: Option<Rc<Graph>>,
        ctx: &ComponentContext,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        let Some(graph) = graph else {
            self.outbound.error(PROTOCOL, "No graph defined", context)?;
            return Ok(());
        };
        self.release()?;
        *self.context.borrow_mut() = context.cloned();

        let network = create_network(Rc::clone(&graph), ctx, true, |_| Ok(()))?;
        subscribe(&network, &self.outbound, context.cloned());
        *self.network.borrow_mut() = Some(network.clone());
        debug!(graph = %graph.name(), "runtime network created");

        let slot = Rc::downgrade(&self.network);
        let id = graph.subscribe(move |event| match event {
            GraphEvent::AddInitial(_) => {
                if let Some(network) = current(&slot) {
                    network.send_initials();
                }
                Ok(())
            }
            _ => Ok(()),
        });
        *self.initials.borrow_mut() = Some((Rc::clone(&graph), id));

        // an empty graph is started by create_network itself
        if graph.is_empty() {
            return Ok(());
        }
        let net = network.clone();
        network.connect(move || {
            net.start();
            Ok(())
        })?;
        Ok(())
    }

    fn stop(&self) -> RuntimeResult<()> {
        if let Some(network) = self.network() {
            network.stop()?;
        }
        Ok(())
    }

    /// Stop the previous network and drop its graph subscription.
    fn release(&self) -> RuntimeResult<()> {
        if let Some((graph, id)) = self.initials.borrow_mut().take() {
            graph.unsubscribe(id);
        }
        let previous = self.network.borrow_mut().take();
        if let Some(network) = previous {
            debug!(graph = %network.graph().name(), "replacing runtime network");
            network.dispose()?;
        }
        Ok(())
    }
}

fn current(slot: &Weak<RefCell<Option<Network>>>) -> Option<Network> {
    slot.upgrade().and_then(|network| network.borrow().clone())
}

fn subscribe(network: &Network, outbound: &Outbound, context: Option<Value>) {
    let outbound = outbound.clone();
    network.on(move |event| match event {
        NetworkEvent::Start { start } => outbound.send(
            PROTOCOL,
            "started",
            json!(start.to_rfc3339()),
            context.as_ref(),
        ),
        NetworkEvent::Socket(activity) => outbound.send(
            PROTOCOL,
            activity.event.name(),
            socket_payload(activity),
            context.as_ref(),
        ),
        NetworkEvent::End { uptime, .. } => outbound.send(
            PROTOCOL,
            "stopped",
            json!(uptime.as_millis() as u64),
            context.as_ref(),
        ),
    });
}

/// `{id, from?, to?, group?, data?, subgraph?}` for one socket event.
pub fn socket_payload(activity: &SocketActivity) -> Value {
    let mut payload = Map::new();
    payload.insert("id".into(), json!(activity.id));
    if let Some(from) = &activity.from {
        payload.insert("from".into(), json!({ "node": from.node, "port": from.port }));
    }
    if let Some(to) = &activity.to {
        payload.insert("to".into(), json!({ "node": to.node, "port": to.port }));
    }
    match &activity.event {
        SocketEvent::BeginGroup(group) | SocketEvent::EndGroup(Some(group)) => {
            payload.insert("group".into(), json!(group));
        }
        SocketEvent::Data(data) => {
            payload.insert("data".into(), data.clone());
        }
        _ => {}
    }
    if let Some(path) = activity.subgraph_path() {
        payload.insert("subgraph".into(), json!(path));
    }
    Value::Object(payload)
}
