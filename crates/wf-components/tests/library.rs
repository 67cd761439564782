//! Core components wired into real networks.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde_json::{Value, json};
use wf_components::{register_callback, register_core};
use wf_core::{FlowError, Packet, Scheduler};
use wf_graph::{Graph, GraphDocument};
use wf_network::{ComponentLoader, GraphSource, Network, NetworkEvent, create_network};

type Collected = Rc<RefCell<Vec<Packet>>>;

fn loader_with_collector() -> (Rc<ComponentLoader>, Collected) {
    let loader = ComponentLoader::new("/", Rc::new(Scheduler::new()));
    register_core(&loader);
    let collected: Collected = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&collected);
    register_callback(&loader, "test", "Collect", move |packet| {
        sink.borrow_mut().push(packet.clone());
        Ok(())
    });
    (loader, collected)
}

fn topics(network: &Network) -> Rc<RefCell<Vec<&'static str>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    network.on(move |event| {
        sink.borrow_mut().push(event.topic());
        Ok(())
    });
    seen
}

#[test]
fn hello_world_with_core_components() {
    let (loader, _) = loader_with_collector();
    let graph = Graph::new("hello");
    graph.add_node("Foo", "core/Repeat", None).unwrap();
    graph.add_node("Bar", "core/Drop", None).unwrap();
    graph.add_edge("Foo", "out", "Bar", "in", None).unwrap();
    graph
        .add_initial(json!("Hello, world!"), "Foo", "in", None)
        .unwrap();

    let network = create_network(Rc::new(graph), &loader.context(), false, |_| Ok(())).unwrap();
    let seen = topics(&network);
    loader.scheduler().run_until_idle().unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.first(), Some(&"start"));
    assert_eq!(seen.last(), Some(&"end"));
    let foo = network.process("Foo").unwrap().component.unwrap();
    assert_eq!(foo.icon().as_deref(), Some("forward"));
}

#[test]
fn kick_feeds_split_into_collectors() {
    let (loader, collected) = loader_with_collector();
    let doc = GraphDocument::from_value(json!({
        "properties": {"name": "kick"},
        "processes": {
            "Kick": {"component": "core/Kick"},
            "Split": {"component": "core/Split"},
            "Left": {"component": "test/Collect"},
            "Right": {"component": "test/Collect"}
        },
        "connections": [
            {"src": {"process": "Kick", "port": "out"}, "tgt": {"process": "Split", "port": "in"}},
            {"src": {"process": "Split", "port": "out"}, "tgt": {"process": "Left", "port": "in"}},
            {"src": {"process": "Split", "port": "out"}, "tgt": {"process": "Right", "port": "in"}},
            {"data": {"hello": "kick"}, "tgt": {"process": "Kick", "port": "data"}},
            {"data": true, "tgt": {"process": "Kick", "port": "in"}}
        ]
    }))
    .unwrap();
    let graph = Graph::load_json(&doc).unwrap();

    create_network(Rc::new(graph), &loader.context(), false, |_| Ok(())).unwrap();
    loader.scheduler().run_until_idle().unwrap();

    let kicked = json!({"hello": "kick"});
    assert_eq!(*collected.borrow(), vec![kicked.clone(), kicked]);
}

#[test]
fn merge_joins_two_initials() {
    let (loader, collected) = loader_with_collector();
    let graph = Graph::new("merge");
    graph.add_node("A", "core/Repeat", None).unwrap();
    graph.add_node("B", "core/Repeat", None).unwrap();
    graph.add_node("M", "core/Merge", None).unwrap();
    graph.add_node("C", "test/Collect", None).unwrap();
    graph.add_edge("A", "out", "M", "in", None).unwrap();
    graph.add_edge("B", "out", "M", "in", None).unwrap();
    graph.add_edge("M", "out", "C", "in", None).unwrap();
    graph.add_initial(json!(1), "A", "in", None).unwrap();
    graph.add_initial(json!(2), "B", "in", None).unwrap();

    let network = create_network(Rc::new(graph), &loader.context(), false, |_| Ok(())).unwrap();
    loader.scheduler().run_until_idle().unwrap();

    assert_eq!(*collected.borrow(), vec![json!(1), json!(2)]);
    assert_eq!(network.connection_count(), 0);
}

#[test]
fn callback_errors_reach_the_error_port() {
    let (loader, collected) = loader_with_collector();
    register_callback(&loader, "test", "Fail", |packet| {
        Err(FlowError::component(format!("refused {packet}")))
    });
    let graph = Graph::new("errors");
    graph.add_node("F", "test/Fail", None).unwrap();
    graph.add_node("C", "test/Collect", None).unwrap();
    graph.add_edge("F", "error", "C", "in", None).unwrap();
    graph.add_initial(json!(7), "F", "in", None).unwrap();

    create_network(Rc::new(graph), &loader.context(), false, |_| Ok(())).unwrap();
    loader.scheduler().run_until_idle().unwrap();

    assert_eq!(
        *collected.borrow(),
        vec![json!({"message": "Component error: refused 7"})]
    );
}

#[test]
fn unhandled_callback_errors_stop_the_run() {
    let (loader, _) = loader_with_collector();
    register_callback(&loader, "test", "Fail", |_| Err(FlowError::component("boom")));
    let graph = Graph::new("fatal");
    graph.add_node("F", "test/Fail", None).unwrap();
    graph.add_initial(json!(1), "F", "in", None).unwrap();

    create_network(Rc::new(graph), &loader.context(), false, |_| Ok(())).unwrap();
    let err = loader.scheduler().run_until_idle().unwrap_err();
    assert_eq!(err, FlowError::component("boom"));
}

#[test]
fn run_interval_ticks_inside_a_network() {
    let (loader, collected) = loader_with_collector();
    let graph = Graph::new("ticker");
    graph.add_node("Timer", "core/RunInterval", None).unwrap();
    graph.add_node("C", "test/Collect", None).unwrap();
    graph.add_edge("Timer", "out", "C", "in", None).unwrap();
    graph.add_initial(json!(25), "Timer", "interval", None).unwrap();
    graph.add_initial(json!(true), "Timer", "start", None).unwrap();

    let network = create_network(Rc::new(graph), &loader.context(), false, |_| Ok(())).unwrap();
    let seen = topics(&network);
    loader.scheduler().run_for(Duration::from_millis(110)).unwrap();

    assert_eq!(collected.borrow().len(), 4);
    assert!(collected.borrow().iter().all(|p| *p == Value::Bool(true)));
    assert_eq!(seen.borrow().iter().filter(|t| **t == "end").count(), 0);

    network.stop().unwrap();
    loader.scheduler().run_until_idle().unwrap();
    assert_eq!(collected.borrow().len(), 4);
    assert_eq!(seen.borrow().last(), Some(&"end"));
}

#[test]
fn repeat_async_delivers_through_the_scheduler() {
    let (loader, collected) = loader_with_collector();
    let graph = Graph::new("async");
    graph.add_node("R", "core/RepeatAsync", None).unwrap();
    graph.add_node("C", "test/Collect", None).unwrap();
    graph.add_edge("R", "out", "C", "in", None).unwrap();
    graph.add_initial(json!("later"), "R", "in", None).unwrap();

    create_network(Rc::new(graph), &loader.context(), false, |_| Ok(())).unwrap();
    loader.scheduler().run_until_idle().unwrap();
    assert_eq!(*collected.borrow(), vec![json!("later")]);
}

#[test]
fn registered_graph_of_core_components() {
    let (loader, collected) = loader_with_collector();
    let inner = GraphDocument::from_value(json!({
        "properties": {"name": "Relay"},
        "processes": {
            "First": {"component": "core/Repeat"},
            "Second": {"component": "core/DisconnectAfterPacket"}
        },
        "connections": [
            {"src": {"process": "First", "port": "out"}, "tgt": {"process": "Second", "port": "in"}}
        ]
    }))
    .unwrap();
    loader.register_graph("test", "Relay", GraphSource::Document(inner));

    let graph = Graph::new("outer");
    graph.add_node("Relay", "test/Relay", None).unwrap();
    graph.add_node("C", "test/Collect", None).unwrap();
    graph.add_edge("Relay", "second.out", "C", "in", None).unwrap();
    graph.add_initial(json!("through"), "Relay", "first.in", None).unwrap();

    let network = create_network(Rc::new(graph), &loader.context(), false, |_| Ok(())).unwrap();
    let forwarded = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&forwarded);
    network.on(move |event| {
        if let NetworkEvent::Socket(activity) = event {
            if let Some(path) = activity.subgraph_path() {
                sink.borrow_mut().push(path);
            }
        }
        Ok(())
    });
    loader.scheduler().run_until_idle().unwrap();

    assert_eq!(*collected.borrow(), vec![json!("through")]);
    assert!(!forwarded.borrow().is_empty());
    assert!(forwarded.borrow().iter().all(|path| path == "Relay"));

    let relay = network.process("Relay").unwrap().component.unwrap();
    let mut exposed = relay.in_ports().names();
    exposed.sort();
    assert_eq!(exposed, vec!["first.in"]);
}
