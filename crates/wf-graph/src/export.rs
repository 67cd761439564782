//! Textual renderings of a graph.

use serde_json::Value;

use crate::graph::Graph;

fn clean_id(id: &str) -> String {
    id.chars().filter(|c| !c.is_whitespace()).collect()
}

fn clean_port(port: &str) -> String {
    port.replace('.', "")
}

fn label(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Graph {
    /// Render as a Graphviz digraph.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph {\n");
        for node in self.nodes() {
            dot.push_str(&format!(
                "    {} [label={} shape=box]\n",
                clean_id(&node.id),
                node.id
            ));
        }
        for (id, initial) in self.initializers().iter().enumerate() {
            dot.push_str(&format!(
                "    data{} [label=\"'{}'\" shape=plaintext]\n",
                id,
                label(&initial.from.data)
            ));
            dot.push_str(&format!(
                "    data{} -> {}[headlabel={} labelfontcolor=blue labelfontsize=8.0]\n",
                id,
                clean_id(&initial.to.node),
                clean_port(&initial.to.port)
            ));
        }
        for edge in self.edges() {
            dot.push_str(&format!(
                "    {} -> {}[taillabel={} headlabel={} labelfontcolor=blue labelfontsize=8.0]\n",
                clean_id(&edge.from.node),
                clean_id(&edge.to.node),
                clean_port(&edge.from.port),
                clean_port(&edge.to.port)
            ));
        }
        dot.push('}');
        dot
    }

    /// Render as a yUML activity diagram.
    pub fn to_yuml(&self) -> String {
        let initials = self
            .initializers()
            .into_iter()
            .map(|i| format!("(start)[{}]->({})", i.to.port, i.to.node));
        let edges = self
            .edges()
            .into_iter()
            .map(|e| format!("({})[{}]->({})", e.from.node, e.from.port, e.to.node));
        initials.chain(edges).collect::<Vec<_>>().join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Graph {
        let graph = Graph::new("sample");
        graph.add_node("Read File", "ReadFile", None).unwrap();
        graph.add_node("Display", "Output", None).unwrap();
        graph
            .add_edge("Read File", "out", "Display", "in", None)
            .unwrap();
        graph
            .add_initial(json!("somefile.txt"), "Read File", "source", None)
            .unwrap();
        graph
    }

    #[test]
    fn dot_strips_whitespace_from_ids() {
        let dot = sample().to_dot();
        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.contains("    ReadFile [label=Read File shape=box]\n"));
        assert!(dot.contains("    data0 [label=\"'somefile.txt'\" shape=plaintext]\n"));
        assert!(dot.contains("    ReadFile -> Display[taillabel=out headlabel=in"));
        assert!(dot.ends_with('}'));
    }

    #[test]
    fn yuml_lists_initials_then_edges() {
        assert_eq!(
            sample().to_yuml(),
            "(start)[source]->(Read File),(Read File)[out]->(Display)"
        );
    }
}
