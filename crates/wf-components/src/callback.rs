//! Callback: hands every packet to a Rust closure.
//!
//! Packets cannot carry closures, so the callback is bound when the component
//! is built (see [`crate::register_callback`]) or later with
//! [`Callback::set_callback`]. Failures, including a missing callback, go out
//! on `error` when it is attached and are fatal otherwise.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use wf_core::{FlowError, FlowResult, Packet, error_packet};
use wf_network::{Component, ComponentBase};
use wf_ports::{Port, PortEvent};

pub type CallbackFn = Rc<dyn Fn(&Packet) -> FlowResult<()>>;

type Slot = Rc<RefCell<Option<CallbackFn>>>;

pub struct Callback {
    base: ComponentBase,
    callback: Slot,
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("base", &self.base)
            .field("bound", &self.callback.borrow().is_some())
            .finish()
    }
}

impl Callback {
    /// A callback component with nothing bound yet.
    pub fn new() -> Rc<Self> {
        let base = ComponentBase::new(
            "This component calls a given callback function for each IP it receives",
        );
        base.set_icon("signout");
        let input = base.in_ports.add("in", Port::new("all"));
        let error = base.out_ports.add("error", Port::new("object"));
        let callback: Slot = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&callback);
        input.on(move |event| {
            let PortEvent::Data { packet, .. } = event else {
                return Ok(());
            };
            let bound = slot.borrow().clone();
            let result = match bound {
                Some(callback) => callback(packet),
                None => Err(FlowError::component("No callback provided")),
            };
            match result {
                Ok(()) => Ok(()),
                Err(err) => report(&error, err),
            }
        });

        Rc::new(Self { base, callback })
    }

    pub fn with_callback<F>(callback: F) -> Rc<Self>
    where
        F: Fn(&Packet) -> FlowResult<()> + 'static,
    {
        Self::with_callback_fn(Rc::new(callback))
    }

    pub fn with_callback_fn(callback: CallbackFn) -> Rc<Self> {
        let component = Self::new();
        *component.callback.borrow_mut() = Some(callback);
        component
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&Packet) -> FlowResult<()> + 'static,
    {
        *self.callback.borrow_mut() = Some(Rc::new(callback));
    }
}

fn report(error: &Port, err: FlowError) -> FlowResult<()> {
    if !error.is_attached() {
        return Err(err);
    }
    error.send(error_packet(&err))?;
    error.disconnect()
}

impl Component for Callback {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}
