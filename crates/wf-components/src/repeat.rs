//! Repeat: forwards packets and metadata as they arrive.

use std::rc::Rc;

use wf_network::{Component, ComponentBase};
use wf_ports::Port;

use crate::forward::forward;

#[derive(Debug)]
pub struct Repeat {
    base: ComponentBase,
}

impl Repeat {
    pub fn new() -> Rc<Self> {
        let base =
            ComponentBase::new("Forwards packets and metadata in the same way it receives them");
        base.set_icon("forward");
        let input = base.in_ports.add("in", Port::new("all"));
        let out = base.out_ports.add("out", Port::new("all"));
        input.on(move |event| forward(&out, event));
        Rc::new(Self { base })
    }
}

impl Component for Repeat {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
