//! Running graphs.
//!
//! A [`Network`] follows its [`Graph`]: nodes become processes (component
//! instances from the loader), edges and initial packets become sockets
//! attached to their ports. It also counts open connections to report when a
//! run starts and, after a short quiet period, when it ends.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, trace, warn};
use wf_core::{Emitter, FlowError, FlowResult, ListenerId, Packet};
use wf_graph::{ComponentRef, Edge, Graph, GraphEvent, Initial, Node};
use wf_ports::{Endpoint, InternalSocket, Port, SocketEvent, create_socket};

use crate::component::{Component, ComponentContext};
use crate::event::{NetworkEvent, SocketActivity};

/// How long the connection count must stay at zero before "end" is reported.
pub const END_DEBOUNCE: Duration = Duration::from_millis(10);

type Step = Box<dyn FnOnce() -> FlowResult<()>>;

/// A node placed in the network.
#[derive(Clone)]
pub struct Process {
    pub id: String,
    /// `None` for nodes declared without a component.
    pub component: Option<Rc<dyn Component>>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("component", &self.component.as_ref().map(|c| c.description()))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Constructed,
    Connecting,
    Running,
    Stopped,
}

#[derive(Clone)]
struct PendingInitial {
    socket: Rc<InternalSocket>,
    data: Packet,
}

struct NetworkInner {
    graph: Rc<Graph>,
    ctx: ComponentContext,
    processes: RefCell<IndexMap<String, Process>>,
    connections: RefCell<Vec<Rc<InternalSocket>>>,
    /// Initial packets not yet delivered.
    initials: RefCell<Vec<PendingInitial>>,
    /// Every initial packet wired so far; re-queued on restart.
    registered_initials: RefCell<Vec<PendingInitial>>,
    connection_count: Cell<usize>,
    /// Between a "start" and its matching "end".
    running: Cell<bool>,
    end_generation: Cell<u64>,
    state: Cell<NetworkState>,
    startup_date: DateTime<Utc>,
    startup_clock: Duration,
    events: Emitter<NetworkEvent>,
    graph_listener: Cell<Option<ListenerId>>,
    /// Wiring parked until a component becomes ready.
    waiting: RefCell<Vec<(Rc<dyn Component>, ListenerId)>>,
}

impl Drop for NetworkInner {
    fn drop(&mut self) {
        if let Some(id) = self.graph_listener.take() {
            self.graph.unsubscribe(id);
        }
    }
}

/// Shared handle to a running graph.
#[derive(Clone)]
pub struct Network {
    inner: Rc<NetworkInner>,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("graph", &self.inner.graph.name())
            .field("state", &self.inner.state.get())
            .field("processes", &self.inner.processes.borrow().len())
            .field("connections", &self.inner.connections.borrow().len())
            .field("connection_count", &self.inner.connection_count.get())
            .finish()
    }
}

/// Build a network for `graph` and get it going.
///
/// An empty graph is handed to `ready` and started on the next turn. With
/// `delay` the network is handed over unconnected and the caller decides
/// when to call [`Network::connect`]. Otherwise it is connected, handed to
/// `ready`, then started.
pub fn create_network<F>(
    graph: Rc<Graph>,
    ctx: &ComponentContext,
    delay: bool,
    ready: F,
) -> FlowResult<Network>
where
    F: FnOnce(&Network) -> FlowResult<()> + 'static,
{
    let network = Network::new(graph, ctx.clone());

    if network.graph().is_empty() {
        let net = network.clone();
        ctx.scheduler.defer(move || {
            ready(&net)?;
            net.start();
            Ok(())
        });
        return Ok(network);
    }

    if delay {
        ready(&network)?;
        return Ok(network);
    }

    let net = network.clone();
    network.connect(move || {
        ready(&net)?;
        net.start();
        Ok(())
    })?;
    Ok(network)
}

impl Network {
    /// Create a network and subscribe it to `graph` changes. Nothing is
    /// instantiated until [`Network::connect`] or a graph event.
    pub fn new(graph: Rc<Graph>, mut ctx: ComponentContext) -> Self {
        if let Some(base_dir) = graph.base_dir() {
            ctx.base_dir = base_dir;
        }
        let startup_clock = ctx.scheduler.now();
        let inner = Rc::new(NetworkInner {
            graph: Rc::clone(&graph),
            ctx,
            processes: RefCell::new(IndexMap::new()),
            connections: RefCell::new(Vec::new()),
            initials: RefCell::new(Vec::new()),
            registered_initials: RefCell::new(Vec::new()),
            connection_count: Cell::new(0),
            running: Cell::new(false),
            end_generation: Cell::new(0),
            state: Cell::new(NetworkState::Constructed),
            startup_date: Utc::now(),
            startup_clock,
            events: Emitter::new(),
            graph_listener: Cell::new(None),
            waiting: RefCell::new(Vec::new()),
        });

        let weak = Rc::downgrade(&inner);
        let listener = graph.subscribe(move |event| match weak.upgrade() {
            Some(inner) => Network { inner }.apply_graph_event(event),
            None => Ok(()),
        });
        inner.graph_listener.set(Some(listener));
        Network { inner }
    }

    fn downgrade(&self) -> Weak<NetworkInner> {
        Rc::downgrade(&self.inner)
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub fn graph(&self) -> &Rc<Graph> {
        &self.inner.graph
    }

    pub fn context(&self) -> &ComponentContext {
        &self.inner.ctx
    }

    pub fn state(&self) -> NetworkState {
        self.inner.state.get()
    }

    pub fn process(&self, id: &str) -> Option<Process> {
        self.inner.processes.borrow().get(id).cloned()
    }

    pub fn processes(&self) -> Vec<Process> {
        self.inner.processes.borrow().values().cloned().collect()
    }

    /// Sockets for edges and initial packets.
    pub fn connections(&self) -> Vec<Rc<InternalSocket>> {
        self.inner.connections.borrow().clone()
    }

    /// Currently open connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connection_count.get()
    }

    /// Whether a run has started and not yet ended.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    pub fn startup_date(&self) -> DateTime<Utc> {
        self.inner.startup_date
    }

    /// Scheduler time since the network was created.
    pub fn uptime(&self) -> Duration {
        self.inner
            .ctx
            .scheduler
            .now()
            .saturating_sub(self.inner.startup_clock)
    }

    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&NetworkEvent) -> FlowResult<()> + 'static,
    {
        self.inner.events.on(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    // ---------------------------------------------------------------------
    // Processes
    // ---------------------------------------------------------------------

    /// Instantiate `node` unless a process with that id exists, then call
    /// `done` with the process. Graph components arrive a turn later.
    pub fn add_node<F>(&self, node: &Node, done: F) -> FlowResult<()>
    where
        F: FnOnce(&Process) -> FlowResult<()> + 'static,
    {
        if let Some(process) = self.process(&node.id) {
            return done(&process);
        }
        if matches!(&node.component, ComponentRef::Name(name) if name.is_empty()) {
            warn!(node = %node.id, "node has no component");
            let process = Process {
                id: node.id.clone(),
                component: None,
            };
            self.inner
                .processes
                .borrow_mut()
                .insert(node.id.clone(), process.clone());
            return done(&process);
        }

        let net = self.clone();
        let id = node.id.clone();
        let register = move |instance: Rc<dyn Component>| -> FlowResult<()> {
            let process = net.register_process(&id, instance)?;
            done(&process)
        };

        let loader = &self.inner.ctx.loader;
        match &node.component {
            ComponentRef::Name(name) => loader.load(name, register),
            ComponentRef::Graph(doc) => {
                loader.load_document((**doc).clone(), register);
                Ok(())
            }
        }
    }

    fn register_process(&self, id: &str, instance: Rc<dyn Component>) -> FlowResult<Process> {
        instance.base().set_node_id(id);
        for (name, port) in instance.in_ports().entries() {
            port.bind(id, &name);
        }
        for (name, port) in instance.out_ports().entries() {
            port.bind(id, &name);
        }

        let process = Process {
            id: id.to_string(),
            component: Some(Rc::clone(&instance)),
        };
        self.inner
            .processes
            .borrow_mut()
            .insert(id.to_string(), process.clone());
        if instance.is_subgraph() {
            self.subscribe_subgraph(&instance)?;
        }
        debug!(node = id, component = %instance.description(), "process added");
        Ok(process)
    }

    /// Shut down and forget the process for `id`.
    pub fn remove_node(&self, id: &str) -> FlowResult<()> {
        let removed = self.inner.processes.borrow_mut().shift_remove(id);
        if let Some(process) = removed {
            debug!(node = id, "process removed");
            if let Some(component) = process.component {
                component.shutdown()?;
            }
        }
        Ok(())
    }

    /// Re-key a process and rewrite port bindings and socket endpoints.
    pub fn rename_node(&self, old_id: &str, new_id: &str) {
        let removed = self.inner.processes.borrow_mut().shift_remove(old_id);
        let Some(mut process) = removed else {
            return;
        };
        process.id = new_id.to_string();
        if let Some(component) = &process.component {
            component.base().set_node_id(new_id);
            for (name, port) in component.in_ports().entries() {
                port.bind(new_id, &name);
            }
            for (name, port) in component.out_ports().entries() {
                port.bind(new_id, &name);
            }
        }
        self.inner
            .processes
            .borrow_mut()
            .insert(new_id.to_string(), process);
        for socket in self.connections() {
            socket.rename_node(old_id, new_id);
        }
        debug!(from = old_id, to = new_id, "process renamed");
    }

    // ---------------------------------------------------------------------
    // Wiring
    // ---------------------------------------------------------------------

    /// Instantiate every node, then wire every edge, then every initial
    /// packet, in graph order; finally call `done`.
    pub fn connect<F>(&self, done: F) -> FlowResult<()>
    where
        F: FnOnce() -> FlowResult<()> + 'static,
    {
        self.inner.state.set(NetworkState::Connecting);
        let graph = Rc::clone(&self.inner.graph);

        let initials = graph
            .initializers()
            .into_iter()
            .rev()
            .fold(Box::new(done) as Step, |next, initial| {
                let net = self.clone();
                Box::new(move || net.add_initial(&initial, next))
            });
        let edges = graph
            .edges()
            .into_iter()
            .rev()
            .fold(initials, |next, edge| {
                let net = self.clone();
                Box::new(move || net.add_edge(&edge, next))
            });
        let nodes = graph
            .nodes()
            .into_iter()
            .rev()
            .fold(edges, |next, node| {
                let net = self.clone();
                Box::new(move || net.add_node(&node, move |_| next()))
            });
        nodes()
    }

    /// Wire an edge with a fresh socket, waiting for either end to be ready.
    pub fn add_edge<F>(&self, edge: &Edge, done: F) -> FlowResult<()>
    where
        F: FnOnce() -> FlowResult<()> + 'static,
    {
        let from = self.component_for(&edge.from.node, "outbound")?;
        if !from.is_ready() {
            let edge = edge.clone();
            self.when_ready(&from, move |net| net.add_edge(&edge, done));
            return Ok(());
        }
        let to = self.component_for(&edge.to.node, "inbound")?;
        if !to.is_ready() {
            let edge = edge.clone();
            self.when_ready(&to, move |net| net.add_edge(&edge, done));
            return Ok(());
        }

        let socket = create_socket();
        socket.set_from(Some(Endpoint::new(&edge.from.node, &edge.from.port)));
        socket.set_to(Some(Endpoint::new(&edge.to.node, &edge.to.port)));
        self.connect_port(&socket, &edge.to.node, to.as_ref(), &edge.to.port, true)?;
        self.connect_port(&socket, &edge.from.node, from.as_ref(), &edge.from.port, false)?;
        self.subscribe_socket(&socket);
        debug!(socket = %socket.id(), "edge connected");
        self.inner.connections.borrow_mut().push(socket);
        done()
    }

    /// Detach and drop the sockets running between both ends of `edge`.
    pub fn remove_edge(&self, edge: &Edge) -> FlowResult<()> {
        let removed: Vec<_> = self
            .inner
            .connections
            .borrow_mut()
            .extract_if(.., |socket| {
                endpoint_is(socket.to(), &edge.to.node, &edge.to.port)
                    && endpoint_is(socket.from(), &edge.from.node, &edge.from.port)
            })
            .collect();
        for socket in &removed {
            debug!(socket = %socket.id(), "edge disconnected");
            self.detach(socket)?;
        }
        Ok(())
    }

    /// Wire an initial packet socket and queue the packet for delivery.
    pub fn add_initial<F>(&self, initial: &Initial, done: F) -> FlowResult<()>
    where
        F: FnOnce() -> FlowResult<()> + 'static,
    {
        let to = self.component_for(&initial.to.node, "inbound")?;
        if !(to.is_ready() || to.in_ports().contains(&initial.to.port)) {
            let initial = initial.clone();
            self.when_ready(&to, move |net| net.add_initial(&initial, done));
            return Ok(());
        }

        let socket = create_socket();
        self.subscribe_socket(&socket);
        self.connect_port(&socket, &initial.to.node, to.as_ref(), &initial.to.port, true)?;
        debug!(socket = %socket.id(), "initial connected");
        self.inner.connections.borrow_mut().push(Rc::clone(&socket));

        let pending = PendingInitial {
            socket,
            data: initial.from.data.clone(),
        };
        self.inner.initials.borrow_mut().push(pending.clone());
        self.inner.registered_initials.borrow_mut().push(pending);
        done()
    }

    /// Detach and forget initial packet sockets feeding the target port.
    pub fn remove_initial(&self, initial: &Initial) -> FlowResult<()> {
        let removed: Vec<_> = self
            .inner
            .connections
            .borrow_mut()
            .extract_if(.., |socket| {
                socket.from().is_none()
                    && endpoint_is(socket.to(), &initial.to.node, &initial.to.port)
            })
            .collect();
        let dropped = |pending: &PendingInitial| {
            removed
                .iter()
                .any(|socket| Rc::ptr_eq(socket, &pending.socket))
        };
        self.inner.initials.borrow_mut().retain(|p| !dropped(p));
        self.inner
            .registered_initials
            .borrow_mut()
            .retain(|p| !dropped(p));
        for socket in &removed {
            self.detach(socket)?;
        }
        Ok(())
    }

    /// Park `task` until `component` is ready. The parked task only holds
    /// the network weakly and is dropped by [`Network::dispose`].
    fn when_ready<F>(&self, component: &Rc<dyn Component>, task: F)
    where
        F: FnOnce(Network) -> FlowResult<()> + 'static,
    {
        let net = self.downgrade();
        let id = component.base().on_ready(move || match net.upgrade() {
            Some(inner) => task(Network { inner }),
            None => Ok(()),
        });
        self.inner
            .waiting
            .borrow_mut()
            .push((Rc::clone(component), id));
    }

    fn component_for(&self, node: &str, side: &'static str) -> FlowResult<Rc<dyn Component>> {
        let process = self
            .process(node)
            .ok_or_else(|| FlowError::MissingProcess {
                side,
                node: node.to_string(),
            })?;
        process.component.ok_or_else(|| FlowError::MissingComponent {
            side,
            node: node.to_string(),
        })
    }

    /// Point one end of `socket` at `node.port` and attach it there.
    fn connect_port(
        &self,
        socket: &Rc<InternalSocket>,
        node: &str,
        component: &dyn Component,
        port: &str,
        inbound: bool,
    ) -> FlowResult<()> {
        let endpoint = Some(Endpoint::new(node, port));
        let target = if inbound {
            socket.set_to(endpoint);
            component
                .in_ports()
                .get(port)
                .ok_or_else(|| FlowError::MissingInPort {
                    node: node.to_string(),
                    port: port.to_string(),
                    socket: socket.id(),
                })?
        } else {
            socket.set_from(endpoint);
            component
                .out_ports()
                .get(port)
                .ok_or_else(|| FlowError::MissingOutPort {
                    node: node.to_string(),
                    port: port.to_string(),
                    socket: socket.id(),
                })?
        };
        target.attach(Rc::clone(socket))?;
        Ok(())
    }

    fn detach(&self, socket: &Rc<InternalSocket>) -> FlowResult<()> {
        if let Some(to) = socket.to() {
            if let Some(port) = self.port(&to, true) {
                port.detach(socket)?;
            }
        }
        if let Some(from) = socket.from() {
            if let Some(port) = self.port(&from, false) {
                port.detach(socket)?;
            }
        }
        Ok(())
    }

    fn port(&self, endpoint: &Endpoint, inbound: bool) -> Option<Rc<Port>> {
        let component = self.process(&endpoint.node)?.component?;
        if inbound {
            component.in_ports().get(&endpoint.port)
        } else {
            component.out_ports().get(&endpoint.port)
        }
    }

    // ---------------------------------------------------------------------
    // Activity
    // ---------------------------------------------------------------------

    fn subscribe_socket(&self, socket: &Rc<InternalSocket>) {
        let net = self.downgrade();
        let weak_socket = Rc::downgrade(socket);
        socket.on(move |event| {
            let (Some(inner), Some(socket)) = (net.upgrade(), weak_socket.upgrade()) else {
                return Ok(());
            };
            let net = Network { inner };
            match event {
                SocketEvent::Connect => net.increase_connections()?,
                SocketEvent::Disconnect => net.decrease_connections(),
                _ => {}
            }
            trace!(socket = %socket.id(), event = event.name(), "socket activity");
            net.inner.events.emit(&NetworkEvent::Socket(SocketActivity {
                id: socket.id(),
                from: socket.from(),
                to: socket.to(),
                subgraph: Vec::new(),
                event: event.clone(),
            }))
        });
    }

    /// Relay socket activity of a subgraph's inner networks as our own.
    fn subscribe_subgraph(&self, instance: &Rc<dyn Component>) -> FlowResult<()> {
        let Some(subgraph) = instance.as_subgraph() else {
            return Ok(());
        };
        if let Some(inner) = subgraph.network() {
            self.forward_subgraph(Rc::downgrade(instance), &inner);
        }
        let parent = self.downgrade();
        let component = Rc::downgrade(instance);
        subgraph.on_network(move |inner| {
            if let Some(parent) = parent.upgrade() {
                Network { inner: parent }.forward_subgraph(component.clone(), inner);
            }
            Ok(())
        });
        Ok(())
    }

    fn forward_subgraph(&self, component: Weak<dyn Component>, inner: &Network) {
        let parent = self.downgrade();
        inner.on(move |event| {
            let NetworkEvent::Socket(activity) = event else {
                return Ok(());
            };
            let (Some(parent), Some(component)) = (parent.upgrade(), component.upgrade()) else {
                return Ok(());
            };
            let parent = Network { inner: parent };
            match activity.event {
                SocketEvent::Connect => parent.increase_connections()?,
                SocketEvent::Disconnect => parent.decrease_connections(),
                _ => {}
            }
            let mut activity = activity.clone();
            activity
                .subgraph
                .insert(0, component.base().node_id().unwrap_or_default());
            parent.inner.events.emit(&NetworkEvent::Socket(activity))
        });
    }

    /// Count an opened connection; the first of a run emits "start".
    pub fn increase_connections(&self) -> FlowResult<()> {
        let inner = &self.inner;
        let count = inner.connection_count.get();
        inner.connection_count.set(count + 1);
        if count == 0 {
            // supersede any pending end check
            inner.end_generation.set(inner.end_generation.get() + 1);
            if !inner.running.get() {
                inner.running.set(true);
                debug!(graph = %inner.graph.name(), "network started");
                inner.events.emit(&NetworkEvent::Start {
                    start: inner.startup_date,
                })?;
            }
        }
        Ok(())
    }

    /// Count a closed connection; reaching zero schedules the end check.
    pub fn decrease_connections(&self) {
        let inner = &self.inner;
        let count = inner.connection_count.get();
        if count == 0 {
            warn!(graph = %inner.graph.name(), "connection count already zero");
            return;
        }
        inner.connection_count.set(count - 1);
        if count > 1 {
            return;
        }
        let generation = inner.end_generation.get() + 1;
        inner.end_generation.set(generation);
        let net = self.downgrade();
        inner.ctx.scheduler.defer_after(END_DEBOUNCE, move || match net.upgrade() {
            Some(inner) => Network { inner }.check_end(generation),
            None => Ok(()),
        });
    }

    fn check_end(&self, generation: u64) -> FlowResult<()> {
        let inner = &self.inner;
        if inner.end_generation.get() != generation
            || inner.connection_count.get() != 0
            || !inner.running.get()
        {
            return Ok(());
        }
        inner.running.set(false);
        let uptime = self.uptime();
        debug!(graph = %inner.graph.name(), uptime_ms = uptime.as_millis() as u64, "network ended");
        inner.events.emit(&NetworkEvent::End {
            start: inner.startup_date,
            end: Utc::now(),
            uptime,
        })
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Deliver queued initial packets on the next turn.
    pub fn send_initials(&self) {
        let net = self.clone();
        self.inner.ctx.scheduler.defer(move || {
            let pending = std::mem::take(&mut *net.inner.initials.borrow_mut());
            for initial in pending {
                initial.socket.connect()?;
                initial.socket.send(initial.data)?;
                initial.socket.disconnect()?;
            }
            Ok(())
        });
    }

    /// Send initial packets. After a stop every registered initial packet is
    /// queued again.
    pub fn start(&self) {
        if self.state() == NetworkState::Stopped {
            let registered = self.inner.registered_initials.borrow().clone();
            let mut pending = self.inner.initials.borrow_mut();
            for initial in registered {
                if !pending
                    .iter()
                    .any(|p| Rc::ptr_eq(&p.socket, &initial.socket))
                {
                    pending.push(initial);
                }
            }
        }
        self.inner.state.set(NetworkState::Running);
        debug!(graph = %self.inner.graph.name(), "sending initials");
        self.send_initials();
    }

    /// Close open connections, then shut every process down.
    pub fn stop(&self) -> FlowResult<()> {
        for socket in self.connections() {
            if socket.is_connected() {
                socket.disconnect()?;
            }
        }
        for process in self.processes() {
            if let Some(component) = process.component {
                component.shutdown()?;
            }
        }
        self.inner.state.set(NetworkState::Stopped);
        debug!(graph = %self.inner.graph.name(), "network stopped");
        Ok(())
    }

    /// Stop for good: drop parked wiring and the graph subscription.
    pub fn dispose(&self) -> FlowResult<()> {
        self.stop()?;
        let waiting = std::mem::take(&mut *self.inner.waiting.borrow_mut());
        for (component, id) in waiting {
            component.base().cancel_ready(id);
        }
        if let Some(id) = self.inner.graph_listener.take() {
            self.inner.graph.unsubscribe(id);
        }
        debug!(graph = %self.inner.graph.name(), "network disposed");
        Ok(())
    }

    fn apply_graph_event(&self, event: &GraphEvent) -> FlowResult<()> {
        match event {
            GraphEvent::AddNode(node) => self.add_node(node, |_| Ok(())),
            GraphEvent::RemoveNode(node) => self.remove_node(&node.id),
            GraphEvent::RenameNode { from, to } => {
                self.rename_node(from, to);
                Ok(())
            }
            GraphEvent::AddEdge(edge) => self.add_edge(edge, || Ok(())),
            GraphEvent::RemoveEdge(edge) => self.remove_edge(edge),
            GraphEvent::AddInitial(initial) => self.add_initial(initial, || Ok(())),
            GraphEvent::RemoveInitial(initial) => self.remove_initial(initial),
            GraphEvent::AddExport(_)
            | GraphEvent::RemoveExport(_)
            | GraphEvent::AddGroup(_)
            | GraphEvent::RemoveGroup(_) => Ok(()),
        }
    }
}

fn endpoint_is(endpoint: Option<Endpoint>, node: &str, port: &str) -> bool {
    endpoint.is_some_and(|e| e.node == node && e.port == port)
}
