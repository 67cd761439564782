use thiserror::Error;

pub type FlowResult<T> = Result<T, FlowError>;

/// Fatal conditions raised while wiring or running a network.
///
/// These travel back through event listeners, so every variant owns its data
/// and the type stays `Clone`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("{port}: No connection available")]
    NotConnected { port: String },

    #[error("{port}: No connection '{index}' available")]
    NoSuchConnection { port: String, index: usize },

    #[error("{port}: Socket already attached {attached} - {incoming}")]
    AlreadyAttached {
        port: String,
        attached: String,
        incoming: String,
    },

    #[error("No inport '{port}' defined in process {node} ({socket})")]
    MissingInPort {
        node: String,
        port: String,
        socket: String,
    },

    #[error("No outport '{port}' defined in process {node} ({socket})")]
    MissingOutPort {
        node: String,
        port: String,
        socket: String,
    },

    #[error("No process defined for {side} node {node}")]
    MissingProcess { side: &'static str, node: String },

    #[error("No component defined for {side} node {node}")]
    MissingComponent { side: &'static str, node: String },

    #[error("Component {name} not available with base {base_dir}")]
    ComponentNotAvailable { name: String, base_dir: String },

    #[error("Load cannot be negative in {component}")]
    NegativeLoad { component: String },

    #[error("Invalid configuration: {what}")]
    Config { what: String },

    #[error("Component error: {message}")]
    Component { message: String },
}

impl FlowError {
    /// Shorthand for a component-reported failure.
    pub fn component(message: impl Into<String>) -> Self {
        FlowError::Component {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration failure.
    pub fn config(what: impl Into<String>) -> Self {
        FlowError::Config { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiring_messages_name_the_socket() {
        let err = FlowError::MissingInPort {
            node: "Bar".to_string(),
            port: "foo".to_string(),
            socket: "Foo() OUT -> FOO Bar()".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No inport 'foo' defined in process Bar (Foo() OUT -> FOO Bar())"
        );
    }

    #[test]
    fn loader_message_includes_base() {
        let err = FlowError::ComponentNotAvailable {
            name: "core/Nope".to_string(),
            base_dir: "/".to_string(),
        };
        assert_eq!(err.to_string(), "Component core/Nope not available with base /");
    }
}
