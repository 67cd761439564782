//! The component contract.
//!
//! A component is a bag of named ports plus a handful of capabilities the
//! network queries (readiness, icon, description, subgraph-ness, shutdown).
//! Implementations embed a [`ComponentBase`] and wire their behaviour as port
//! listeners when constructed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use wf_core::{Emitter, FlowResult, ListenerId, Scheduler};
use wf_ports::PortMap;

use crate::loader::ComponentLoader;
use crate::subgraph::SubgraphComponent;

/// What a component gets to see of its environment when it is created.
#[derive(Clone)]
pub struct ComponentContext {
    pub scheduler: Rc<Scheduler>,
    pub base_dir: String,
    pub loader: Rc<ComponentLoader>,
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

/// State shared by every component: ports, description, icon, readiness.
pub struct ComponentBase {
    pub in_ports: PortMap,
    pub out_ports: PortMap,
    description: String,
    icon: RefCell<Option<String>>,
    node_id: RefCell<Option<String>>,
    ready: Cell<bool>,
    ready_events: Emitter<()>,
}

impl fmt::Debug for ComponentBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBase")
            .field("node_id", &self.node_id.borrow())
            .field("in_ports", &self.in_ports.names())
            .field("out_ports", &self.out_ports.names())
            .field("ready", &self.ready.get())
            .finish()
    }
}

impl ComponentBase {
    /// A ready component with no ports.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            in_ports: PortMap::new(),
            out_ports: PortMap::new(),
            description: description.into(),
            icon: RefCell::new(None),
            node_id: RefCell::new(None),
            ready: Cell::new(true),
            ready_events: Emitter::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn icon(&self) -> Option<String> {
        self.icon.borrow().clone()
    }

    pub fn set_icon(&self, icon: impl Into<String>) {
        *self.icon.borrow_mut() = Some(icon.into());
    }

    /// Id of the node this instance runs as, once a network placed it.
    pub fn node_id(&self) -> Option<String> {
        self.node_id.borrow().clone()
    }

    pub fn set_node_id(&self, id: &str) {
        *self.node_id.borrow_mut() = Some(id.to_string());
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    pub fn set_not_ready(&self) {
        self.ready.set(false);
    }

    /// Mark ready and fire pending [`ComponentBase::on_ready`] callbacks.
    pub fn mark_ready(&self) -> FlowResult<()> {
        self.ready.set(true);
        self.ready_events.emit(&())
    }

    /// Run `callback` the next time the component becomes ready.
    pub fn on_ready<F>(&self, callback: F) -> ListenerId
    where
        F: FnOnce() -> FlowResult<()> + 'static,
    {
        self.ready_events.once(move |_| callback())
    }

    /// Drop a callback registered with [`ComponentBase::on_ready`].
    pub fn cancel_ready(&self, id: ListenerId) -> bool {
        self.ready_events.off(id)
    }
}

/// A processing unit placed on a graph node.
pub trait Component {
    fn base(&self) -> &ComponentBase;

    fn in_ports(&self) -> &PortMap {
        &self.base().in_ports
    }

    fn out_ports(&self) -> &PortMap {
        &self.base().out_ports
    }

    fn description(&self) -> String {
        self.base().description().to_string()
    }

    fn icon(&self) -> Option<String> {
        self.base().icon()
    }

    fn set_icon(&self, icon: &str) {
        self.base().set_icon(icon);
    }

    fn is_ready(&self) -> bool {
        self.base().is_ready()
    }

    fn is_subgraph(&self) -> bool {
        false
    }

    /// Downcast hook used by the network to follow nested networks.
    fn as_subgraph(&self) -> Option<&SubgraphComponent> {
        None
    }

    /// Release timers and inner networks. Called on node removal and stop.
    fn shutdown(&self) -> FlowResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ports::Port;

    struct Plain {
        base: ComponentBase,
    }

    impl Component for Plain {
        fn base(&self) -> &ComponentBase {
            &self.base
        }
    }

    #[test]
    fn defaults_delegate_to_base() {
        let plain = Plain {
            base: ComponentBase::new("does nothing"),
        };
        plain.base.in_ports.add("in", Port::new("all"));

        assert_eq!(plain.description(), "does nothing");
        assert!(plain.is_ready());
        assert!(!plain.is_subgraph());
        assert!(plain.in_ports().contains("in"));
        assert!(plain.icon().is_none());
        plain.set_icon("cog");
        assert_eq!(plain.icon().as_deref(), Some("cog"));
    }

    #[test]
    fn ready_callbacks_fire_once() {
        let base = ComponentBase::new("");
        base.set_not_ready();
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        base.on_ready(move || {
            f.set(f.get() + 1);
            Ok(())
        });

        base.mark_ready().unwrap();
        base.mark_ready().unwrap();
        assert!(base.is_ready());
        assert_eq!(fired.get(), 1);
    }
}
