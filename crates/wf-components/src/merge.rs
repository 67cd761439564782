//! Merge: many inbound connections onto one outport.
//!
//! The outport is disconnected only once every inbound socket has closed.

use std::rc::Rc;

use wf_network::{Component, ComponentBase};
use wf_ports::{Port, PortEvent};

use crate::forward::forward;

#[derive(Debug)]
pub struct Merge {
    base: ComponentBase,
}

impl Merge {
    pub fn new() -> Rc<Self> {
        let base = ComponentBase::new(
            "This component receives data on multiple input ports and sends the same data out to the connected output port",
        );
        base.set_icon("resize-small");
        let input = base.in_ports.add("in", Port::array("all"));
        let out = base.out_ports.add("out", Port::new("all"));

        let inbound = Rc::downgrade(&input);
        input.on(move |event| match event {
            PortEvent::Disconnect { .. } => {
                if inbound.upgrade().is_some_and(|port| port.is_connected()) {
                    return Ok(());
                }
                out.disconnect()
            }
            other => forward(&out, other),
        });
        Rc::new(Self { base })
    }
}

impl Component for Merge {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
