//! Group: wraps every inbound connection in a configured set of groups.
//!
//! Group names arrive on `group`; with a `threshold` only the most recent
//! `threshold` names are kept.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;
use wf_core::{FlowError, FlowResult};
use wf_network::{Component, ComponentBase};
use wf_ports::{Port, PortEvent};

use crate::forward::forward;

#[derive(Debug, Default)]
struct GroupState {
    groups: RefCell<Vec<String>>,
    threshold: Cell<Option<usize>>,
}

impl GroupState {
    fn push(&self, name: String) {
        let mut groups = self.groups.borrow_mut();
        if let Some(limit) = self.threshold.get().filter(|t| *t > 0) {
            let excess = (groups.len() + 1).saturating_sub(limit).min(groups.len());
            groups.drain(..excess);
        }
        groups.push(name);
    }
}

#[derive(Debug)]
pub struct Group {
    base: ComponentBase,
}

impl Group {
    pub fn new() -> Rc<Self> {
        let base = ComponentBase::new(
            "Adds a set of groups around the packets received at each connection",
        );
        base.set_icon("tags");
        let input = base.in_ports.add("in", Port::array("all"));
        let group = base.in_ports.add("group", Port::array("string"));
        let threshold = base.in_ports.add("threshold", Port::new("integer"));
        let out = base.out_ports.add("out", Port::new("all"));
        let state = Rc::new(GroupState::default());

        let wrap = Rc::clone(&state);
        input.on(move |event| match event {
            PortEvent::Connect { .. } => {
                let groups = wrap.groups.borrow().clone();
                for name in groups {
                    out.begin_group(name)?;
                }
                Ok(())
            }
            PortEvent::Disconnect { .. } => {
                let depth = wrap.groups.borrow().len();
                for _ in 0..depth {
                    out.end_group()?;
                }
                out.disconnect()
            }
            other => forward(&out, other),
        });

        let names = Rc::clone(&state);
        group.on(move |event| {
            if let PortEvent::Data { packet, .. } = event {
                let name = match packet {
                    Value::String(name) => name.clone(),
                    other => other.to_string(),
                };
                names.push(name);
            }
            Ok(())
        });

        threshold.on(move |event| match event {
            PortEvent::Data { packet, .. } => set_threshold(&state, packet),
            _ => Ok(()),
        });

        Rc::new(Self { base })
    }
}

fn set_threshold(state: &GroupState, packet: &Value) -> FlowResult<()> {
    let limit = packet
        .as_u64()
        .ok_or_else(|| {
            FlowError::config(format!(
                "threshold must be a non-negative integer, got {packet}"
            ))
        })?;
    state.threshold.set(Some(limit as usize));
    Ok(())
}

impl Component for Group {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
