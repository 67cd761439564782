//! Split: one inbound connection copied to every outbound socket.

use std::rc::Rc;

use wf_network::{Component, ComponentBase};
use wf_ports::Port;

use crate::forward::forward;

#[derive(Debug)]
pub struct Split {
    base: ComponentBase,
}

impl Split {
    pub fn new() -> Rc<Self> {
        let base = ComponentBase::new(
            "This component receives data on a single input port and sends the same data out to all connected output ports",
        );
        base.set_icon("resize-full");
        let input = base.in_ports.add("in", Port::new("all"));
        let out = base.out_ports.add("out", Port::array("all"));
        input.on(move |event| forward(&out, event));
        Rc::new(Self { base })
    }
}

impl Component for Split {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
