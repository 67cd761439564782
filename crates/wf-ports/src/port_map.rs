//! Named port collections.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::port::Port;

/// Ordered `name -> port` map owned by a component.
///
/// Ports are shared (`Rc`) because the network attaches sockets to them and a
/// subgraph re-exposes its inner ports under its own names.
#[derive(Debug, Default)]
pub struct PortMap {
    ports: RefCell<IndexMap<String, Rc<Port>>>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port and return a shared handle to it.
    pub fn add(&self, name: impl Into<String>, port: Port) -> Rc<Port> {
        let port = Rc::new(port);
        self.insert(name, Rc::clone(&port));
        port
    }

    /// Insert an existing shared port, replacing any port with the same name.
    pub fn insert(&self, name: impl Into<String>, port: Rc<Port>) {
        self.ports.borrow_mut().insert(name.into(), port);
    }

    pub fn get(&self, name: &str) -> Option<Rc<Port>> {
        self.ports.borrow().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Rc<Port>> {
        self.ports.borrow_mut().shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ports.borrow().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.ports.borrow().keys().cloned().collect()
    }

    /// Snapshot of all `(name, port)` pairs in insertion order.
    pub fn entries(&self) -> Vec<(String, Rc<Port>)> {
        self.ports
            .borrow()
            .iter()
            .map(|(name, port)| (name.clone(), Rc::clone(port)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ports.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
