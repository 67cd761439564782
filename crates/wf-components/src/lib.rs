//! wf-components: the core component library.
//!
//! Provides the building blocks most graphs start from:
//! - pass-through components (Repeat, Split, Merge, DisconnectAfterPacket)
//! - sinks and taps (Drop, Output, Callback)
//! - packet sources (Kick, RunInterval)
//! - stream shaping (Group) and deferred delivery (RepeatAsync)
//!
//! [`register_core`] makes all of them available under `core/`.
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use wf_core::Scheduler;
//! use wf_network::ComponentLoader;
//!
//! let loader = ComponentLoader::new(".", Rc::new(Scheduler::new()));
//! wf_components::register_core(&loader);
//! assert!(loader.list_components().contains(&"core/Repeat".to_string()));
//! ```

pub mod callback;
pub mod disconnect_after_packet;
pub mod discard;
mod forward;
pub mod group;
pub mod kick;
pub mod merge;
pub mod output;
pub mod repeat;
pub mod repeat_async;
pub mod run_interval;
pub mod split;

use std::rc::Rc;

use wf_core::{FlowResult, Packet};
use wf_network::{Component, ComponentLoader};

pub use callback::{Callback, CallbackFn};
pub use disconnect_after_packet::DisconnectAfterPacket;
pub use discard::Discard;
pub use group::Group;
pub use kick::Kick;
pub use merge::Merge;
pub use output::Output;
pub use repeat::Repeat;
pub use repeat_async::RepeatAsync;
pub use run_interval::RunInterval;
pub use split::Split;

/// Library prefix the core components are registered under.
pub const LIBRARY: &str = "core";

/// Icon for core components that do not pick their own.
pub const LIBRARY_ICON: &str = "cog";

/// Register every core component as `core/<Name>`.
pub fn register_core(loader: &ComponentLoader) {
    loader.set_library_icon(LIBRARY, LIBRARY_ICON);
    loader.register_component(LIBRARY, "Callback", |_| {
        Ok(Callback::new() as Rc<dyn Component>)
    });
    loader.register_component(LIBRARY, "DisconnectAfterPacket", |_| {
        Ok(DisconnectAfterPacket::new() as Rc<dyn Component>)
    });
    loader.register_component(LIBRARY, "Drop", |_| Ok(Discard::new() as Rc<dyn Component>));
    loader.register_component(LIBRARY, "Group", |_| Ok(Group::new() as Rc<dyn Component>));
    loader.register_component(LIBRARY, "Kick", |_| Ok(Kick::new() as Rc<dyn Component>));
    loader.register_component(LIBRARY, "Merge", |_| Ok(Merge::new() as Rc<dyn Component>));
    loader.register_component(LIBRARY, "Output", |_| Ok(Output::new() as Rc<dyn Component>));
    loader.register_component(LIBRARY, "Repeat", |_| Ok(Repeat::new() as Rc<dyn Component>));
    loader.register_component(LIBRARY, "RepeatAsync", |ctx| {
        let component = RepeatAsync::component(Rc::clone(&ctx.scheduler))?;
        Ok(Rc::new(component) as Rc<dyn Component>)
    });
    loader.register_component(LIBRARY, "RunInterval", |ctx| {
        Ok(RunInterval::new(Rc::clone(&ctx.scheduler)) as Rc<dyn Component>)
    });
    loader.register_component(LIBRARY, "Split", |_| Ok(Split::new() as Rc<dyn Component>));
}

/// Register a [`Callback`] bound to `callback` as `library/name`.
///
/// Every instance the loader creates shares the same closure.
pub fn register_callback<F>(loader: &ComponentLoader, library: &str, name: &str, callback: F)
where
    F: Fn(&Packet) -> FlowResult<()> + 'static,
{
    let callback: CallbackFn = Rc::new(callback);
    loader.register_component(library, name, move |_| {
        Ok(Callback::with_callback_fn(Rc::clone(&callback)) as Rc<dyn Component>)
    });
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;

    use wf_network::Component;
    use wf_ports::{InternalSocket, SocketEvent, create_socket};

    pub type Tap = Rc<RefCell<Vec<String>>>;

    /// A socket feeding the named inport.
    pub fn feed(component: &dyn Component, port: &str) -> Rc<InternalSocket> {
        let socket = create_socket();
        let target = component.in_ports().get(port).expect("inport exists");
        target.attach(Rc::clone(&socket)).expect("attach");
        socket
    }

    /// Record what leaves the named outport, one string per event:
    /// `connect`, `<group`, the packet as JSON, `>` and `disconnect`.
    pub fn tap(component: &dyn Component, port: &str) -> Tap {
        let socket = create_socket();
        let seen: Tap = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        socket.on(move |event| {
            let line = match event {
                SocketEvent::Connect => "connect".to_string(),
                SocketEvent::BeginGroup(group) => format!("<{group}"),
                SocketEvent::Data(packet) => packet.to_string(),
                SocketEvent::EndGroup(_) => ">".to_string(),
                SocketEvent::Disconnect => "disconnect".to_string(),
            };
            sink.borrow_mut().push(line);
            Ok(())
        });
        let source = component.out_ports().get(port).expect("outport exists");
        source.attach(socket).expect("attach");
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::Scheduler;

    #[test]
    fn registers_everything_under_core() {
        let loader = ComponentLoader::new("/", Rc::new(Scheduler::new()));
        register_core(&loader);
        let names = loader.list_components();
        for name in [
            "core/Callback",
            "core/DisconnectAfterPacket",
            "core/Drop",
            "core/Group",
            "core/Kick",
            "core/Merge",
            "core/Output",
            "core/Repeat",
            "core/RepeatAsync",
            "core/RunInterval",
            "core/Split",
        ] {
            assert!(names.contains(&name.to_string()), "{name} missing");
        }
        assert_eq!(loader.library_icon("core").as_deref(), Some("cog"));
    }

    #[test]
    fn registered_callbacks_share_the_closure() {
        use std::cell::RefCell;

        let loader = ComponentLoader::new("/", Rc::new(Scheduler::new()));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        register_callback(&loader, "app", "Collect", move |packet| {
            sink.borrow_mut().push(packet.clone());
            Ok(())
        });

        for value in [1, 2] {
            loader
                .load("app/Collect", move |instance| {
                    let input = testing::feed(instance.as_ref(), "in");
                    input.send(serde_json::json!(value))
                })
                .unwrap();
        }
        assert_eq!(*seen.borrow(), vec![serde_json::json!(1), serde_json::json!(2)]);
    }
}
