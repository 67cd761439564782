//! Getting a graph and a network to run, either from a local graph file or
//! from a client driving a [`Runtime`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use wf_core::FlowResult;
use wf_graph::{Graph, load_file};
use wf_network::{ComponentContext, ComponentLoader, Network, create_network};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Load the graph file at `path`.
    Local,
    /// Wait for a client to build and start a graph through the runtime.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOptions {
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, alias = "base_dir")]
    pub base_dir: Option<String>,
}

impl ProviderOptions {
    pub fn local(path: impl Into<String>, base_dir: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::Local,
            path: Some(path.into()),
            base_dir: Some(base_dir.into()),
        }
    }

    pub fn remote() -> Self {
        Self {
            kind: ProviderKind::Remote,
            path: None,
            base_dir: None,
        }
    }

    /// Read options from a JSON object such as `{"type": "local", "path": ..., "baseDir": ...}`.
    pub fn from_value(value: Value) -> RuntimeResult<Self> {
        if !value.is_object() {
            return Err(RuntimeError::options("Options must be provided"));
        }
        if !matches!(value.get("type").and_then(Value::as_str), Some("local" | "remote")) {
            return Err(RuntimeError::options(
                r#"Options must contain a property "type" with values ["local"|"remote"]"#,
            ));
        }
        serde_json::from_value(value).map_err(|source| RuntimeError::Payload {
            command: "initialize".to_string(),
            source,
        })
    }
}

type Ready = Box<dyn FnOnce(Rc<Graph>, Network) -> FlowResult<()>>;

pub struct GraphProvider {
    ctx: ComponentContext,
    runtime: Option<Rc<Runtime>>,
    local: Cell<bool>,
}

impl fmt::Debug for GraphProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphProvider")
            .field("base_dir", &self.ctx.base_dir)
            .field("runtime", &self.runtime.is_some())
            .field("local", &self.local.get())
            .finish()
    }
}

impl GraphProvider {
    pub fn new(loader: &Rc<ComponentLoader>) -> Self {
        Self {
            ctx: loader.context(),
            runtime: None,
            local: Cell::new(true),
        }
    }

    /// The runtime remote graphs are taken from.
    pub fn register_runtime(&mut self, runtime: Rc<Runtime>) {
        debug!("runtime registered with graph provider");
        self.runtime = Some(runtime);
    }

    /// False once a remote initialization was requested.
    pub fn is_local(&self) -> bool {
        self.local.get()
    }

    /// Produce a graph and its network and hand both to `ready`.
    ///
    /// Local graphs are loaded, connected and started right away. Remote
    /// graphs are reported the first time the runtime has both a graph and
    /// a network.
    pub fn initialize<F>(&self, options: &ProviderOptions, ready: F) -> RuntimeResult<()>
    where
        F: FnOnce(Rc<Graph>, Network) -> FlowResult<()> + 'static,
    {
        match options.kind {
            ProviderKind::Local => self.initialize_local(options, Box::new(ready)),
            ProviderKind::Remote => self.initialize_remote(Box::new(ready)),
        }
    }

    fn initialize_local(&self, options: &ProviderOptions, ready: Ready) -> RuntimeResult<()> {
        let path = options
            .path
            .as_deref()
            .ok_or_else(|| RuntimeError::options(r#"Options must contain a property "path""#))?;
        let base_dir = options
            .base_dir
            .clone()
            .ok_or_else(|| RuntimeError::options(r#"Options must contain a property "baseDir""#))?;
        self.local.set(true);

        let graph = Rc::new(load_file(Path::new(path))?);
        graph.set_base_dir(Some(base_dir));
        info!(path, graph = %graph.name(), "local graph loaded");

        let handed = Rc::clone(&graph);
        create_network(graph, &self.ctx, false, move |network| {
            ready(handed, network.clone())
        })?;
        Ok(())
    }

    fn initialize_remote(&self, ready: Ready) -> RuntimeResult<()> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| RuntimeError::options("No runtime registered for remote graphs"))?;
        self.local.set(false);

        let pending = Rc::new(RefCell::new(Some(ready)));
        let weak = Rc::downgrade(runtime);
        let check = move || -> FlowResult<()> {
            let Some(runtime) = weak.upgrade() else {
                return Ok(());
            };
            let (Some(graph), Some(network)) = (runtime.graph(), runtime.network()) else {
                return Ok(());
            };
            let ready = pending.borrow_mut().take();
            match ready {
                Some(ready) => {
                    debug!(graph = %graph.name(), "remote graph available");
                    ready(graph, network)
                }
                None => Ok(()),
            }
        };
        check()?;
        runtime.add_listener(move |_| check());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_need_a_known_type() {
        let err = ProviderOptions::from_value(json!({"type": "cloud"})).unwrap_err();
        assert!(err.to_string().contains(r#"["local"|"remote"]"#));
        let err = ProviderOptions::from_value(Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "Options must be provided");
    }

    #[test]
    fn options_read_base_dir_in_either_case() {
        let camel = ProviderOptions::from_value(
            json!({"type": "local", "path": "g.json", "baseDir": "/app"}),
        )
        .unwrap();
        let snake = ProviderOptions::from_value(
            json!({"type": "local", "path": "g.json", "base_dir": "/app"}),
        )
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel, ProviderOptions::local("g.json", "/app"));
    }

    #[test]
    fn local_requires_path_and_base_dir() {
        let loader = ComponentLoader::new("/", Rc::new(wf_core::Scheduler::new()));
        let provider = GraphProvider::new(&loader);
        let mut options = ProviderOptions::local("g.json", "/app");
        options.path = None;
        let err = provider.initialize(&options, |_, _| Ok(())).unwrap_err();
        assert_eq!(err.to_string(), r#"Options must contain a property "path""#);

        let mut options = ProviderOptions::local("g.json", "/app");
        options.base_dir = None;
        let err = provider.initialize(&options, |_, _| Ok(())).unwrap_err();
        assert_eq!(err.to_string(), r#"Options must contain a property "baseDir""#);
    }

    #[test]
    fn remote_needs_a_runtime() {
        let loader = ComponentLoader::new("/", Rc::new(wf_core::Scheduler::new()));
        let provider = GraphProvider::new(&loader);
        let err = provider
            .initialize(&ProviderOptions::remote(), |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Options(_)));
        assert!(provider.is_local());
    }
}
