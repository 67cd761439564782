//! Internal sockets.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::warn;
use wf_core::{Emitter, FlowResult, ListenerId, Packet};

/// One end of a socket: a port on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub node: String,
    pub port: String,
}

impl Endpoint {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connect,
    BeginGroup(String),
    Data(Packet),
    /// Carries the label popped from the group stack; `None` if it was empty.
    EndGroup(Option<String>),
    Disconnect,
}

impl SocketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SocketEvent::Connect => "connect",
            SocketEvent::BeginGroup(_) => "begingroup",
            SocketEvent::Data(_) => "data",
            SocketEvent::EndGroup(_) => "endgroup",
            SocketEvent::Disconnect => "disconnect",
        }
    }
}

/// A single connection carrying one edge's or one initial packet's traffic.
///
/// Sockets never buffer: every operation is emitted to the current listeners
/// before it returns.
#[derive(Debug, Default)]
pub struct InternalSocket {
    connected: Cell<bool>,
    groups: RefCell<Vec<String>>,
    from: RefCell<Option<Endpoint>>,
    to: RefCell<Option<Endpoint>>,
    events: Emitter<SocketEvent>,
}

/// Create a fresh, unconnected socket.
pub fn create_socket() -> Rc<InternalSocket> {
    Rc::new(InternalSocket::default())
}

impl InternalSocket {
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SocketEvent) -> FlowResult<()> + 'static,
    {
        self.events.on(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Open the connection. No-op when already connected.
    pub fn connect(&self) -> FlowResult<()> {
        if self.connected.get() {
            return Ok(());
        }
        self.connected.set(true);
        self.events.emit(&SocketEvent::Connect)
    }

    /// Close the connection. No-op when not connected.
    pub fn disconnect(&self) -> FlowResult<()> {
        if !self.connected.get() {
            return Ok(());
        }
        self.connected.set(false);
        self.events.emit(&SocketEvent::Disconnect)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    /// Deliver a packet, connecting first if needed.
    pub fn send(&self, data: Packet) -> FlowResult<()> {
        self.connect()?;
        self.events.emit(&SocketEvent::Data(data))
    }

    pub fn begin_group(&self, group: impl Into<String>) -> FlowResult<()> {
        let group = group.into();
        self.groups.borrow_mut().push(group.clone());
        self.events.emit(&SocketEvent::BeginGroup(group))
    }

    pub fn end_group(&self) -> FlowResult<()> {
        let group = self.groups.borrow_mut().pop();
        if group.is_none() {
            warn!(socket = %self.id(), "endgroup without matching begingroup");
        }
        self.events.emit(&SocketEvent::EndGroup(group))
    }

    /// Currently open groups, outermost first.
    pub fn groups(&self) -> Vec<String> {
        self.groups.borrow().clone()
    }

    pub fn from(&self) -> Option<Endpoint> {
        self.from.borrow().clone()
    }

    pub fn set_from(&self, from: Option<Endpoint>) {
        *self.from.borrow_mut() = from;
    }

    pub fn to(&self) -> Option<Endpoint> {
        self.to.borrow().clone()
    }

    pub fn set_to(&self, to: Option<Endpoint>) {
        *self.to.borrow_mut() = to;
    }

    /// Rewrite endpoints that point at `old_node`.
    pub fn rename_node(&self, old_node: &str, new_node: &str) {
        for end in [&self.from, &self.to] {
            if let Some(endpoint) = end.borrow_mut().as_mut() {
                if endpoint.node == old_node {
                    endpoint.node = new_node.to_string();
                }
            }
        }
    }

    /// Human-readable id such as `Foo() OUT -> IN Bar()`.
    pub fn id(&self) -> String {
        let from = self.from.borrow();
        let to = self.to.borrow();
        let from_str = |e: &Endpoint| format!("{}() {}", e.node, e.port.to_uppercase());
        let to_str = |e: &Endpoint| format!("{} {}()", e.port.to_uppercase(), e.node);
        match (from.as_ref(), to.as_ref()) {
            (None, None) => "UNDEFINED".to_string(),
            (Some(f), None) => format!("{} -> ANON", from_str(f)),
            (None, Some(t)) => format!("DATA -> {}", to_str(t)),
            (Some(f), Some(t)) => format!("{} -> {}", from_str(f), to_str(t)),
        }
    }
}
