//! Error types for the runtime transport.

use serde_json::{Value, json};
use wf_core::FlowError;
use wf_graph::GraphError;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Failures while dispatching protocol messages or providing graphs.
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("Unknown {protocol} command: {command}")]
    UnknownCommand { protocol: String, command: String },

    #[error("Invalid {command} payload: {source}")]
    Payload {
        command: String,
        source: serde_json::Error,
    },

    #[error("{0}")]
    Options(String),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn options(message: impl Into<String>) -> Self {
        RuntimeError::Options(message.into())
    }

    /// The `{message}` payload sent for this error.
    pub fn to_payload(&self) -> Value {
        json!({ "message": self.to_string() })
    }
}
