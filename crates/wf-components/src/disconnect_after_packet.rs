//! DisconnectAfterPacket: every packet travels in its own connection.

use std::rc::Rc;

use wf_network::{Component, ComponentBase};
use wf_ports::{Port, PortEvent};

#[derive(Debug)]
pub struct DisconnectAfterPacket {
    base: ComponentBase,
}

impl DisconnectAfterPacket {
    pub fn new() -> Rc<Self> {
        let base = ComponentBase::new(
            "Forwards any packets, but also sends a disconnect after each of them",
        );
        base.set_icon("pause");
        let input = base.in_ports.add("in", Port::new("all"));
        let out = base.out_ports.add("out", Port::new("all"));
        input.on(move |event| match event {
            PortEvent::BeginGroup { group, .. } => out.begin_group(group.clone()),
            PortEvent::Data { packet, .. } => {
                out.send(packet.clone())?;
                out.disconnect()
            }
            PortEvent::EndGroup { .. } => out.end_group(),
            _ => Ok(()),
        });
        Rc::new(Self { base })
    }
}

impl Component for DisconnectAfterPacket {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
