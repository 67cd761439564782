//! Stream-shaping properties of the core components.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;
use wf_components::{Group, Merge};
use wf_network::Component;
use wf_ports::{InternalSocket, SocketEvent, create_socket};

fn feed(component: &dyn Component, port: &str) -> Rc<InternalSocket> {
    let socket = create_socket();
    component
        .in_ports()
        .get(port)
        .unwrap()
        .attach(Rc::clone(&socket))
        .unwrap();
    socket
}

fn tap(component: &dyn Component, port: &str) -> Rc<RefCell<Vec<SocketEvent>>> {
    let socket = create_socket();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    socket.on(move |event| {
        sink.borrow_mut().push(event.clone());
        Ok(())
    });
    component.out_ports().get(port).unwrap().attach(socket).unwrap();
    seen
}

proptest! {
    #[test]
    fn group_keeps_the_most_recent_names(
        names in prop::collection::vec("[a-z]{1,4}", 0..12),
        threshold in 1usize..6,
    ) {
        let group = Group::new();
        let input = feed(group.as_ref(), "in");
        let names_in = feed(group.as_ref(), "group");
        let limit = feed(group.as_ref(), "threshold");
        let out = tap(group.as_ref(), "out");

        limit.send(json!(threshold)).unwrap();
        for name in &names {
            names_in.send(json!(name)).unwrap();
        }
        input.send(json!("payload")).unwrap();
        input.disconnect().unwrap();

        let opened: Vec<String> = out
            .borrow()
            .iter()
            .filter_map(|e| match e {
                SocketEvent::BeginGroup(g) => Some(g.clone()),
                _ => None,
            })
            .collect();
        let keep = names.len().min(threshold);
        prop_assert_eq!(&opened[..], &names[names.len() - keep..]);

        let closed = out
            .borrow()
            .iter()
            .filter(|e| matches!(e, SocketEvent::EndGroup(_)))
            .count();
        prop_assert_eq!(closed, opened.len());
    }

    #[test]
    fn merge_disconnects_once_all_inputs_close(order in Just((0..4usize).collect::<Vec<_>>()).prop_shuffle()) {
        let merge = Merge::new();
        let inputs: Vec<_> = (0..4).map(|_| feed(merge.as_ref(), "in")).collect();
        let out = tap(merge.as_ref(), "out");

        for input in &inputs {
            input.send(json!(1)).unwrap();
        }
        for (closed, index) in order.iter().enumerate() {
            inputs[*index].disconnect().unwrap();
            let disconnects = out
                .borrow()
                .iter()
                .filter(|e| matches!(e, SocketEvent::Disconnect))
                .count();
            let expected = usize::from(closed == order.len() - 1);
            prop_assert_eq!(disconnects, expected);
        }
    }
}
