//! Integration tests for wf-graph.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use wf_graph::{Graph, GraphEvent, load_file, save_file};

fn hello_graph() -> Graph {
    let graph = Graph::new("hello");
    graph.add_node("Foo", "core/Repeat", None).unwrap();
    graph.add_node("Bar", "core/Drop", None).unwrap();
    graph.add_edge("Foo", "out", "Bar", "in", None).unwrap();
    graph
        .add_initial(json!("Hello, world!"), "Foo", "in", None)
        .unwrap();
    graph
}

#[test]
fn removing_consumer_keeps_initial() {
    let graph = hello_graph();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    graph.subscribe(move |event| {
        sink.borrow_mut().push(event.clone());
        Ok(())
    });

    graph.remove_node("Bar").unwrap();

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    match &events[0] {
        GraphEvent::RemoveEdge(edge) => {
            assert_eq!(edge.from.node, "Foo");
            assert_eq!(edge.to.node, "Bar");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(&events[1], GraphEvent::RemoveNode(node) if node.id == "Bar"));

    assert_eq!(graph.nodes().len(), 1);
    assert_eq!(graph.initializers().len(), 1);
    assert_eq!(graph.initializers()[0].to.node, "Foo");
}

#[test]
fn json_file_roundtrip() {
    let graph = hello_graph();
    graph.add_export("Foo.in", "input", None).unwrap();
    graph
        .add_group("pipeline", vec!["Foo".into(), "Bar".into()], None)
        .unwrap();

    let path = std::env::temp_dir().join("wf_graph_roundtrip.json");
    save_file(&path, &graph).unwrap();
    let loaded = load_file(&path).unwrap();

    assert_eq!(loaded.to_json(), graph.to_json());
    assert!(loaded.base_dir().is_some());
}

#[test]
fn yaml_file_roundtrip() {
    let graph = hello_graph();
    let path = std::env::temp_dir().join("wf_graph_roundtrip.yaml");
    save_file(&path, &graph).unwrap();
    let loaded = load_file(&path).unwrap();
    assert_eq!(loaded.to_json(), graph.to_json());
}

#[test]
fn missing_file_reports_path() {
    let path = std::env::temp_dir().join("wf_graph_does_not_exist.json");
    let err = load_file(&path).unwrap_err();
    assert!(err.to_string().contains("wf_graph_does_not_exist.json"));
}
