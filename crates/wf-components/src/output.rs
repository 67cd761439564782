//! Output: logs every packet and passes it on when something listens.
//!
//! Options sent to `options` are merged into the current set. `pretty: true`
//! renders packets as indented JSON.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};
use tracing::info;
use wf_core::{FlowError, FlowResult, Packet};
use wf_network::{Component, ComponentBase};
use wf_ports::{Port, PortEvent};

#[derive(Debug, Default)]
struct OutputOptions {
    values: RefCell<Map<String, Value>>,
}

impl OutputOptions {
    fn merge(&self, packet: &Value) -> FlowResult<()> {
        let Value::Object(options) = packet else {
            return Err(FlowError::config("Options is not an object"));
        };
        let mut values = self.values.borrow_mut();
        for (key, value) in options {
            values.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn render(&self, packet: &Packet) -> String {
        let pretty = self
            .values
            .borrow()
            .get("pretty")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if pretty {
            serde_json::to_string_pretty(packet).unwrap_or_else(|_| packet.to_string())
        } else {
            packet.to_string()
        }
    }
}

#[derive(Debug)]
pub struct Output {
    base: ComponentBase,
    options: Rc<OutputOptions>,
}

impl Output {
    pub fn new() -> Rc<Self> {
        let base = ComponentBase::new(
            "This component receives input on a single inport, and logs the data items",
        );
        base.set_icon("bug");
        let input = base.in_ports.add("in", Port::array("all"));
        let options_port = base.in_ports.add("options", Port::new("object"));
        let out = base.out_ports.add("out", Port::new("all"));
        let options = Rc::new(OutputOptions::default());

        let printer = Rc::clone(&options);
        let inbound: Weak<Port> = Rc::downgrade(&input);
        input.on(move |event| match event {
            PortEvent::Data { packet, .. } => {
                let node = inbound
                    .upgrade()
                    .and_then(|port| port.node())
                    .unwrap_or_default();
                info!(node = %node, "{}", printer.render(packet));
                if out.is_attached() {
                    out.send(packet.clone())?;
                }
                Ok(())
            }
            PortEvent::Disconnect { .. } if out.is_attached() => out.disconnect(),
            _ => Ok(()),
        });

        let settings = Rc::clone(&options);
        options_port.on(move |event| match event {
            PortEvent::Data { packet, .. } => settings.merge(packet),
            _ => Ok(()),
        });

        Rc::new(Self { base, options })
    }

    /// How a packet shows up in the log with the current options.
    pub fn render(&self, packet: &Packet) -> String {
        self.options.render(packet)
    }
}

impl Component for Output {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
