//! Property tests over random mutation sequences.

use proptest::prelude::*;
use serde_json::json;
use wf_graph::Graph;

const IDS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];
const PORTS: [&str; 3] = ["in", "out", "options"];

#[derive(Debug, Clone)]
enum Op {
    AddNode(usize),
    RemoveNode(usize),
    AddEdge(usize, usize, usize, usize),
    AddInitial(usize, usize, i64),
    AddExport(usize, usize),
    AddGroup(Vec<usize>),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..IDS.len()).prop_map(Op::AddNode),
        1 => (0..IDS.len()).prop_map(Op::RemoveNode),
        3 => (0..IDS.len(), 0..PORTS.len(), 0..IDS.len(), 0..PORTS.len())
            .prop_map(|(a, p, b, q)| Op::AddEdge(a, p, b, q)),
        2 => (0..IDS.len(), 0..PORTS.len(), any::<i64>())
            .prop_map(|(a, p, v)| Op::AddInitial(a, p, v)),
        1 => (0..IDS.len(), 0..PORTS.len()).prop_map(|(a, p)| Op::AddExport(a, p)),
        1 => prop::collection::vec(0..IDS.len(), 1..4).prop_map(Op::AddGroup),
    ]
}

fn build(ops: &[Op]) -> Graph {
    let graph = Graph::new("prop");
    for (i, op) in ops.iter().enumerate() {
        match op {
            Op::AddNode(n) => {
                graph.add_node(IDS[*n], "core/Repeat", None).unwrap();
            }
            Op::RemoveNode(n) => {
                graph.remove_node(IDS[*n]).unwrap();
            }
            Op::AddEdge(a, p, b, q) => {
                graph
                    .add_edge(IDS[*a], PORTS[*p], IDS[*b], PORTS[*q], None)
                    .unwrap();
            }
            Op::AddInitial(a, p, v) => {
                graph
                    .add_initial(json!(v), IDS[*a], PORTS[*p], None)
                    .unwrap();
            }
            Op::AddExport(a, p) => {
                let private = format!("{}.{}", IDS[*a], PORTS[*p]);
                graph
                    .add_export(&private, &format!("x{}", i), None)
                    .unwrap();
            }
            Op::AddGroup(members) => {
                let nodes = members.iter().map(|m| IDS[*m].to_string()).collect();
                graph.add_group(&format!("g{}", i), nodes, None).unwrap();
            }
        }
    }
    graph
}

fn references(graph: &Graph, id: &str) -> bool {
    graph.has_node(id)
        || graph
            .edges()
            .iter()
            .any(|e| e.from.node == id || e.to.node == id)
        || graph.initializers().iter().any(|i| i.to.node == id)
        || graph.exports().iter().any(|e| e.node() == id)
        || graph
            .groups()
            .iter()
            .any(|g| g.nodes.iter().any(|n| n == id))
}

proptest! {
    #[test]
    fn json_roundtrip_is_idempotent(ops in prop::collection::vec(op(), 0..40)) {
        let graph = build(&ops);
        let doc = graph.to_json();
        let reloaded = Graph::load_json(&doc).unwrap();
        prop_assert_eq!(reloaded.to_json(), doc);
    }

    #[test]
    fn remove_node_leaves_no_references(
        ops in prop::collection::vec(op(), 0..40),
        victim in 0..IDS.len(),
    ) {
        let graph = build(&ops);
        graph.remove_node(IDS[victim]).unwrap();
        prop_assert!(!references(&graph, IDS[victim]));
    }

    #[test]
    fn rename_there_and_back_restores_document(
        ops in prop::collection::vec(op(), 0..40),
        target in 0..IDS.len(),
    ) {
        let graph = build(&ops);
        let before = graph.to_json();
        if graph.rename_node(IDS[target], "renamed").unwrap() {
            prop_assert!(!references(&graph, IDS[target]));
            prop_assert!(graph.rename_node("renamed", IDS[target]).unwrap());
        }
        prop_assert_eq!(graph.to_json(), before);
    }
}
