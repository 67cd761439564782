//! Protocol messages and the outbound side of a transport.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use wf_core::{Emitter, FlowError, FlowResult, ListenerId};

/// One message in either direction.
///
/// `context` is opaque to the runtime; replies and events caused by a
/// message carry the context it arrived with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub protocol: String,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl Message {
    pub fn new(protocol: impl Into<String>, command: impl Into<String>, payload: Value) -> Self {
        Self {
            protocol: protocol.into(),
            command: command.into(),
            payload,
            context: None,
        }
    }
}

/// Fan-out to the transport's listeners. Cheap to clone; every protocol
/// holds one.
#[derive(Clone, Default)]
pub(crate) struct Outbound {
    listeners: Rc<Emitter<Message>>,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Outbound {
    pub(crate) fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Message) -> FlowResult<()> + 'static,
    {
        self.listeners.on(listener)
    }

    pub(crate) fn off(&self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    pub(crate) fn send(
        &self,
        protocol: &str,
        command: &str,
        payload: Value,
        context: Option<&Value>,
    ) -> FlowResult<()> {
        debug!(protocol, command, "runtime send");
        self.listeners.emit(&Message {
            protocol: protocol.to_string(),
            command: command.to_string(),
            payload,
            context: context.cloned(),
        })
    }

    /// Send `error` with a `{message}` payload.
    pub(crate) fn error(
        &self,
        protocol: &str,
        message: impl fmt::Display,
        context: Option<&Value>,
    ) -> FlowResult<()> {
        self.send(
            protocol,
            "error",
            json!({ "message": message.to_string() }),
            context,
        )
    }
}

/// Serialize `item` as a message payload.
pub(crate) fn encode<T: Serialize>(item: &T) -> FlowResult<Value> {
    serde_json::to_value(item)
        .map_err(|err| FlowError::component(format!("cannot encode payload: {err}")))
}
