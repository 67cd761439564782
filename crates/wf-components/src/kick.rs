//! Kick: emits a stored packet whenever its `in` connection closes.
//!
//! The packet comes from the `data` inport (null until one arrives). Groups
//! open on `in` when the last trigger packet arrived are replayed around it.

use std::cell::RefCell;
use std::rc::Rc;

use wf_core::{FlowResult, Packet};
use wf_network::{Component, ComponentBase};
use wf_ports::{Port, PortEvent};

#[derive(Debug, Default)]
struct KickState {
    packet: RefCell<Packet>,
    /// Groups open on `in` right now.
    open: RefCell<Vec<String>>,
    /// Groups captured with the last trigger packet.
    captured: RefCell<Vec<String>>,
}

#[derive(Debug)]
pub struct Kick {
    base: ComponentBase,
}

impl Kick {
    pub fn new() -> Rc<Self> {
        let base = ComponentBase::new(
            "This component generates a single packet and sends it to the output port",
        );
        base.set_icon("share");
        let input = base.in_ports.add("in", Port::new("bang"));
        let data = base.in_ports.add("data", Port::new("all"));
        let out = base.out_ports.add("out", Port::array("all"));
        let state = Rc::new(KickState::default());

        let kick = Rc::clone(&state);
        input.on(move |event| {
            match event {
                PortEvent::BeginGroup { group, .. } => kick.open.borrow_mut().push(group.clone()),
                PortEvent::Data { .. } => {
                    let open = kick.open.borrow().clone();
                    *kick.captured.borrow_mut() = open;
                }
                PortEvent::EndGroup { .. } => {
                    kick.open.borrow_mut().pop();
                }
                PortEvent::Disconnect { .. } => {
                    send_kick(&out, &kick)?;
                    kick.open.borrow_mut().clear();
                }
                _ => {}
            }
            Ok(())
        });

        data.on(move |event| {
            if let PortEvent::Data { packet, .. } = event {
                *state.packet.borrow_mut() = packet.clone();
            }
            Ok(())
        });

        Rc::new(Self { base })
    }
}

fn send_kick(out: &Port, state: &KickState) -> FlowResult<()> {
    let groups = state.captured.borrow().clone();
    let packet = state.packet.borrow().clone();
    for group in &groups {
        out.begin_group(group.clone())?;
    }
    out.send(packet)?;
    for _ in &groups {
        out.end_group()?;
    }
    out.disconnect()
}

impl Component for Kick {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
