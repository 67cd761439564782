//! Component protocol: describe the loader's components.

use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use wf_core::FlowResult;
use wf_network::{Component, ComponentLoader};
use wf_ports::PortMap;

use crate::error::{RuntimeError, RuntimeResult};
use crate::message::{Outbound, encode};

pub const PROTOCOL: &str = "component";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortDescription {
    pub id: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub array: bool,
}

/// The `component` message payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescription {
    pub name: String,
    pub description: String,
    pub icon: String,
    pub in_ports: Vec<PortDescription>,
    pub out_ports: Vec<PortDescription>,
}

impl ComponentDescription {
    pub fn describe(name: &str, instance: &dyn Component) -> Self {
        Self {
            name: name.to_string(),
            description: instance.description(),
            icon: instance.icon().unwrap_or_else(|| "blank".to_string()),
            in_ports: ports(instance.in_ports()),
            out_ports: ports(instance.out_ports()),
        }
    }
}

fn ports(map: &PortMap) -> Vec<PortDescription> {
    map.entries()
        .into_iter()
        .map(|(id, port)| PortDescription {
            id,
            data_type: port.data_type().to_string(),
            array: port.is_array(),
        })
        .collect()
}

#[derive(Debug)]
pub struct ComponentProtocol {
    outbound: Outbound,
}

impl ComponentProtocol {
    pub(crate) fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }

    pub(crate) fn receive(
        &self,
        command: &str,
        loader: &Rc<ComponentLoader>,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        match command {
            "list" => self.list(loader, context),
            _ => Err(RuntimeError::UnknownCommand {
                protocol: PROTOCOL.to_string(),
                command: command.to_string(),
            }),
        }
    }

    /// One `component` message per registration. Graph components arrive on
    /// a later turn, once their network is wired.
    fn list(&self, loader: &Rc<ComponentLoader>, context: Option<&Value>) -> RuntimeResult<()> {
        for name in loader.list_components() {
            let outbound = self.outbound.clone();
            let reply_to = context.cloned();
            let described = name.clone();
            let loaded = loader.load(&name, move |instance| {
                send_when_ready(outbound, described, instance, reply_to)
            });
            if let Err(err) = loaded {
                warn!(component = %name, error = %err, "component failed to load");
                self.outbound.error(PROTOCOL, &err, context)?;
            }
        }
        Ok(())
    }
}

fn send_when_ready(
    outbound: Outbound,
    name: String,
    instance: Rc<dyn Component>,
    context: Option<Value>,
) -> FlowResult<()> {
    if instance.is_ready() {
        return send(&outbound, &name, instance.as_ref(), context.as_ref());
    }
    debug!(component = %name, "waiting for component to be ready");
    let waiting = Rc::clone(&instance);
    instance.base().on_ready(move || {
        send(&outbound, &name, waiting.as_ref(), context.as_ref())
    });
    Ok(())
}

fn send(
    outbound: &Outbound,
    name: &str,
    instance: &dyn Component,
    context: Option<&Value>,
) -> FlowResult<()> {
    let description = ComponentDescription::describe(name, instance);
    let payload = encode(&description)?;
    outbound.send(PROTOCOL, "component", payload, context)
}
