//! Drop: swallows every packet.

use std::rc::Rc;

use wf_network::{Component, ComponentBase};
use wf_ports::Port;

/// Registered as `core/Drop`.
#[derive(Debug)]
pub struct Discard {
    base: ComponentBase,
}

impl Discard {
    pub fn new() -> Rc<Self> {
        let base =
            ComponentBase::new("This component drops every packet it receives with no action");
        base.set_icon("trash");
        base.in_ports.add("in", Port::array("all"));
        Rc::new(Self { base })
    }
}

impl Component for Discard {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
