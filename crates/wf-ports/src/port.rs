//! Ports: named attachment points on a process.
//!
//! A [`PortKind::Single`] port holds at most one socket. A
//! [`PortKind::Array`] port holds any number, each in a slot whose index is
//! assigned at attach time and never reused. Socket events are re-emitted as
//! [`PortEvent`]s; array ports tag them with the slot index.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use wf_core::{Emitter, FlowError, FlowResult, ListenerId, Packet};

use crate::socket::{InternalSocket, SocketEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Single,
    Array,
}

/// Events observed on a port. `index` is `Some` only for array ports.
#[derive(Debug, Clone, PartialEq)]
pub enum PortEvent {
    Attach {
        index: Option<usize>,
    },
    Connect {
        index: Option<usize>,
    },
    BeginGroup {
        group: String,
        index: Option<usize>,
    },
    Data {
        packet: Packet,
        index: Option<usize>,
    },
    EndGroup {
        group: Option<String>,
        index: Option<usize>,
    },
    Disconnect {
        index: Option<usize>,
    },
    Detach {
        index: Option<usize>,
    },
}

impl PortEvent {
    pub fn index(&self) -> Option<usize> {
        match self {
            PortEvent::Attach { index }
            | PortEvent::Connect { index }
            | PortEvent::BeginGroup { index, .. }
            | PortEvent::Data { index, .. }
            | PortEvent::EndGroup { index, .. }
            | PortEvent::Disconnect { index }
            | PortEvent::Detach { index } => *index,
        }
    }
}

struct Slot {
    socket: Rc<InternalSocket>,
    listener: ListenerId,
}

pub struct Port {
    kind: PortKind,
    data_type: String,
    node: RefCell<Option<String>>,
    name: RefCell<Option<String>>,
    /// Attached sockets by slot index; detached slots are removed.
    slots: RefCell<BTreeMap<usize, Slot>>,
    next_index: Cell<usize>,
    events: Emitter<PortEvent>,
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.label())
            .field("kind", &self.kind)
            .field("data_type", &self.data_type)
            .field("attached", &self.attached_count())
            .finish()
    }
}

impl Port {
    /// A port accepting one socket.
    pub fn new(data_type: impl Into<String>) -> Self {
        Self::with_kind(PortKind::Single, data_type)
    }

    /// A port accepting any number of sockets.
    pub fn array(data_type: impl Into<String>) -> Self {
        Self::with_kind(PortKind::Array, data_type)
    }

    pub fn with_kind(kind: PortKind, data_type: impl Into<String>) -> Self {
        Self {
            kind,
            data_type: data_type.into(),
            node: RefCell::new(None),
            name: RefCell::new(None),
            slots: RefCell::new(BTreeMap::new()),
            next_index: Cell::new(0),
            events: Emitter::new(),
        }
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn is_array(&self) -> bool {
        self.kind == PortKind::Array
    }

    /// Informational value type (`all`, `string`, `bang`, ...).
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Record which node and port name this port belongs to.
    pub fn bind(&self, node: &str, name: &str) {
        *self.node.borrow_mut() = Some(node.to_string());
        *self.name.borrow_mut() = Some(name.to_string());
    }

    pub fn node(&self) -> Option<String> {
        self.node.borrow().clone()
    }

    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    /// `Node NAME`, or `Port` while unbound. Used in error messages.
    pub fn label(&self) -> String {
        match (self.node.borrow().as_ref(), self.name.borrow().as_ref()) {
            (Some(node), Some(name)) => format!("{} {}", node, name.to_uppercase()),
            _ => "Port".to_string(),
        }
    }

    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PortEvent) -> FlowResult<()> + 'static,
    {
        self.events.on(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // ---------------------------------------------------------------------
    // Attachment
    // ---------------------------------------------------------------------

    /// Attach a socket and start relaying its events.
    ///
    /// Returns the slot index. A single port fails with `AlreadyAttached`
    /// when it already holds a socket.
    pub fn attach(self: &Rc<Self>, socket: Rc<InternalSocket>) -> FlowResult<usize> {
        if self.kind == PortKind::Single {
            if let Some(current) = self.live_sockets().first() {
                return Err(FlowError::AlreadyAttached {
                    port: self.label(),
                    attached: current.1.id(),
                    incoming: socket.id(),
                });
            }
            self.slots.borrow_mut().clear();
            self.next_index.set(0);
        }

        let index = self.next_index.get();
        self.next_index.set(index + 1);
        let tag = self.tag(index);
        let port: Weak<Port> = Rc::downgrade(self);
        let listener = socket.on(move |event| match port.upgrade() {
            Some(port) => port.relay(event, tag),
            None => Ok(()),
        });
        self.slots
            .borrow_mut()
            .insert(index, Slot { socket, listener });
        self.events.emit(&PortEvent::Attach { index: tag })?;
        Ok(index)
    }

    /// Detach a socket. Returns false if it was not attached here.
    pub fn detach(&self, socket: &Rc<InternalSocket>) -> FlowResult<bool> {
        let removed = {
            let mut slots = self.slots.borrow_mut();
            let found = slots
                .iter()
                .find(|(_, slot)| Rc::ptr_eq(&slot.socket, socket))
                .map(|(index, _)| *index);
            found.and_then(|index| slots.remove(&index).map(|slot| (index, slot)))
        };
        match removed {
            Some((index, slot)) => {
                slot.socket.off(slot.listener);
                self.events.emit(&PortEvent::Detach {
                    index: self.tag(index),
                })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached_count() > 0
    }

    pub fn is_attached_at(&self, index: usize) -> bool {
        self.socket_at(index).is_some()
    }

    pub fn attached_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Whether another socket may be attached.
    pub fn can_attach(&self) -> bool {
        match self.kind {
            PortKind::Single => !self.is_attached(),
            PortKind::Array => true,
        }
    }

    /// Whether any attached socket is connected.
    pub fn is_connected(&self) -> bool {
        self.live_sockets().iter().any(|(_, s)| s.is_connected())
    }

    pub fn is_connected_at(&self, index: usize) -> bool {
        self.socket_at(index).is_some_and(|s| s.is_connected())
    }

    /// Attached sockets with their slot indices.
    pub fn sockets(&self) -> Vec<(usize, Rc<InternalSocket>)> {
        self.live_sockets()
    }

    // ---------------------------------------------------------------------
    // Forwarding
    // ---------------------------------------------------------------------

    pub fn connect(&self) -> FlowResult<()> {
        for socket in self.targets(None)? {
            socket.connect()?;
        }
        Ok(())
    }

    pub fn connect_to(&self, index: usize) -> FlowResult<()> {
        for socket in self.targets(Some(index))? {
            socket.connect()?;
        }
        Ok(())
    }

    pub fn begin_group(&self, group: impl Into<String>) -> FlowResult<()> {
        self.begin_group_on(group.into(), None)
    }

    pub fn begin_group_to(&self, group: impl Into<String>, index: usize) -> FlowResult<()> {
        self.begin_group_on(group.into(), Some(index))
    }

    pub fn send(&self, packet: Packet) -> FlowResult<()> {
        self.send_on(packet, None)
    }

    pub fn send_to(&self, packet: Packet, index: usize) -> FlowResult<()> {
        self.send_on(packet, Some(index))
    }

    pub fn end_group(&self) -> FlowResult<()> {
        for socket in self.targets(None)? {
            socket.end_group()?;
        }
        Ok(())
    }

    pub fn end_group_to(&self, index: usize) -> FlowResult<()> {
        for socket in self.targets(Some(index))? {
            socket.end_group()?;
        }
        Ok(())
    }

    pub fn disconnect(&self) -> FlowResult<()> {
        for socket in self.targets(None)? {
            socket.disconnect()?;
        }
        Ok(())
    }

    pub fn disconnect_to(&self, index: usize) -> FlowResult<()> {
        for socket in self.targets(Some(index))? {
            socket.disconnect()?;
        }
        Ok(())
    }

    fn begin_group_on(&self, group: String, index: Option<usize>) -> FlowResult<()> {
        for socket in self.targets(index)? {
            socket.connect()?;
            socket.begin_group(group.clone())?;
        }
        Ok(())
    }

    fn send_on(&self, packet: Packet, index: Option<usize>) -> FlowResult<()> {
        for socket in self.targets(index)? {
            socket.connect()?;
            socket.send(packet.clone())?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn tag(&self, index: usize) -> Option<usize> {
        match self.kind {
            PortKind::Single => None,
            PortKind::Array => Some(index),
        }
    }

    fn live_sockets(&self) -> Vec<(usize, Rc<InternalSocket>)> {
        self.slots
            .borrow()
            .iter()
            .map(|(index, slot)| (*index, Rc::clone(&slot.socket)))
            .collect()
    }

    fn socket_at(&self, index: usize) -> Option<Rc<InternalSocket>> {
        self.slots
            .borrow()
            .get(&index)
            .map(|slot| Rc::clone(&slot.socket))
    }

    /// Sockets an operation applies to: all of them, or the one at `index`.
    fn targets(&self, index: Option<usize>) -> FlowResult<Vec<Rc<InternalSocket>>> {
        match index {
            Some(index) => match self.socket_at(index) {
                Some(socket) => Ok(vec![socket]),
                None => Err(FlowError::NoSuchConnection {
                    port: self.label(),
                    index,
                }),
            },
            None => {
                let sockets: Vec<_> = self.live_sockets().into_iter().map(|(_, s)| s).collect();
                if sockets.is_empty() {
                    return Err(FlowError::NotConnected { port: self.label() });
                }
                Ok(sockets)
            }
        }
    }

    fn relay(&self, event: &SocketEvent, index: Option<usize>) -> FlowResult<()> {
        let event = match event {
            SocketEvent::Connect => PortEvent::Connect { index },
            SocketEvent::BeginGroup(group) => PortEvent::BeginGroup {
                group: group.clone(),
                index,
            },
            SocketEvent::Data(packet) => PortEvent::Data {
                packet: packet.clone(),
                index,
            },
            SocketEvent::EndGroup(group) => PortEvent::EndGroup {
                group: group.clone(),
                index,
            },
            SocketEvent::Disconnect => PortEvent::Disconnect { index },
        };
        self.events.emit(&event)
    }
}
