//! Persisted graph format.
//!
//! ```json
//! {
//!   "properties": { "name": "hello" },
//!   "processes": { "Foo": { "component": "core/Repeat" } },
//!   "connections": [
//!     { "data": "Hello, world!", "tgt": { "process": "Foo", "port": "in" } }
//!   ]
//! }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GraphError, GraphResult};
use crate::graph::{ComponentRef, Export, Graph, Group, Metadata};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub properties: Metadata,
    #[serde(default)]
    pub exports: Vec<Export>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub processes: IndexMap<String, ProcessDef>,
    #[serde(default)]
    pub connections: Vec<ConnectionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDef {
    pub component: ComponentRef,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDef {
    pub process: String,
    pub port: String,
}

/// An edge (`src` + `tgt`) or an initial packet (`data` + `tgt`).
///
/// Initial packets are recognised by the presence of a `data` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionDef {
    Initial {
        data: Value,
        tgt: EndpointDef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    Edge {
        src: EndpointDef,
        tgt: EndpointDef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
}

impl GraphDocument {
    /// The `name` property, or an empty string.
    pub fn name(&self) -> &str {
        self.properties
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn from_json_str(input: &str) -> GraphResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_yaml_str(input: &str) -> GraphResult<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn from_value(value: Value) -> GraphResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json_string(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Graph {
    /// Serialize into the persisted document form.
    pub fn to_json(&self) -> GraphDocument {
        let mut properties = Metadata::new();
        let name = self.name();
        if !name.is_empty() {
            properties.insert("name".to_string(), Value::String(name));
        }
        properties.extend(self.properties());

        let processes = self
            .nodes()
            .into_iter()
            .map(|node| {
                let def = ProcessDef {
                    component: node.component,
                    metadata: node.metadata,
                };
                (node.id, def)
            })
            .collect();

        let edges = self.edges().into_iter().map(|edge| ConnectionDef::Edge {
            src: EndpointDef {
                process: edge.from.node,
                port: edge.from.port,
            },
            tgt: EndpointDef {
                process: edge.to.node,
                port: edge.to.port,
            },
            metadata: (!edge.metadata.is_empty()).then_some(edge.metadata),
        });
        let initials = self
            .initializers()
            .into_iter()
            .map(|initial| ConnectionDef::Initial {
                data: initial.from.data,
                tgt: EndpointDef {
                    process: initial.to.node,
                    port: initial.to.port,
                },
                metadata: (!initial.metadata.is_empty()).then_some(initial.metadata),
            });

        GraphDocument {
            properties,
            exports: self.exports(),
            groups: self.groups(),
            processes,
            connections: edges.chain(initials).collect(),
        }
    }

    /// Build a graph from a document. Port names in connections are lowercased.
    pub fn load_json(doc: &GraphDocument) -> GraphResult<Graph> {
        let graph = Graph::new(doc.name());
        for (key, value) in &doc.properties {
            if key != "name" {
                graph.set_property(key.clone(), value.clone());
            }
        }
        for (id, def) in &doc.processes {
            graph.add_node(id.clone(), def.component.clone(), Some(def.metadata.clone()))?;
        }
        for conn in &doc.connections {
            match conn {
                ConnectionDef::Initial { data, tgt, metadata } => {
                    graph.add_initial(
                        data.clone(),
                        &tgt.process,
                        &tgt.port.to_lowercase(),
                        metadata.clone(),
                    )?;
                }
                ConnectionDef::Edge { src, tgt, metadata } => {
                    graph.add_edge(
                        &src.process,
                        &src.port.to_lowercase(),
                        &tgt.process,
                        &tgt.port.to_lowercase(),
                        metadata.clone(),
                    )?;
                }
            }
        }
        for export in &doc.exports {
            graph.add_export(&export.private, &export.public, export.metadata.clone())?;
        }
        for group in &doc.groups {
            graph.add_group(&group.name, group.nodes.clone(), group.metadata.clone())?;
        }
        Ok(graph)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load a graph file. `.yaml`/`.yml` files are read as YAML, anything else as JSON.
pub fn load_file(path: &Path) -> GraphResult<Graph> {
    let content = std::fs::read_to_string(path).map_err(|source| GraphError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = if is_yaml(path) {
        GraphDocument::from_yaml_str(&content)?
    } else {
        GraphDocument::from_json_str(&content)?
    };
    let graph = Graph::load_json(&doc)?;
    if let Some(parent) = path.parent() {
        graph.set_base_dir(Some(parent.display().to_string()));
    }
    Ok(graph)
}

/// Save a graph file, choosing the format from the extension.
pub fn save_file(path: &Path, graph: &Graph) -> GraphResult<()> {
    let doc = graph.to_json();
    let content = if is_yaml(path) {
        serde_yaml::to_string(&doc)?
    } else {
        serde_json::to_string_pretty(&doc)?
    };
    std::fs::write(path, content).map_err(|source| GraphError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}
