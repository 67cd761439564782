//! Graph-specific error types.

use std::path::PathBuf;

use wf_core::FlowError;

pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while loading, saving or building graphs.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("Failed to read graph file: {path}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write graph file: {path}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A graph listener failed while the graph was being built.
    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl From<GraphError> for FlowError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Flow(inner) => inner,
            other => FlowError::Config {
                what: other.to_string(),
            },
        }
    }
}
