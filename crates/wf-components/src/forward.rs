//! Event relaying shared by the pass-through components.

use wf_core::FlowResult;
use wf_ports::{Port, PortEvent};

/// Replay an inport event on `out`. Attach and detach stay local.
pub(crate) fn forward(out: &Port, event: &PortEvent) -> FlowResult<()> {
    match event {
        PortEvent::Connect { .. } => out.connect(),
        PortEvent::BeginGroup { group, .. } => out.begin_group(group.clone()),
        PortEvent::Data { packet, .. } => out.send(packet.clone()),
        PortEvent::EndGroup { .. } => out.end_group(),
        PortEvent::Disconnect { .. } => out.disconnect(),
        PortEvent::Attach { .. } | PortEvent::Detach { .. } => Ok(()),
    }
}
