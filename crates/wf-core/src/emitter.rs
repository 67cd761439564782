//! Per-entity event subscriptions.
//!
//! Every graph, socket, port and network owns an [`Emitter`] for its own
//! events. Listeners live as long as the owning entity (or until removed with
//! [`Emitter::off`]). Emission iterates a snapshot of the listener list, so a
//! listener may subscribe, unsubscribe or emit again without invalidating the
//! running dispatch.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::FlowResult;

/// Handle returned by [`Emitter::on`] and [`Emitter::once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Rc<dyn Fn(&E) -> FlowResult<()>>;

struct Listener<E> {
    id: ListenerId,
    once: bool,
    callback: Callback<E>,
}

pub struct Emitter<E> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<Listener<E>>>,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<E> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe for every future event.
    pub fn on<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&E) -> FlowResult<()> + 'static,
    {
        self.register(Rc::new(callback), false)
    }

    /// Subscribe for the next event only.
    pub fn once<F>(&self, callback: F) -> ListenerId
    where
        F: FnOnce(&E) -> FlowResult<()> + 'static,
    {
        let slot = RefCell::new(Some(callback));
        self.register(
            Rc::new(move |event: &E| {
                let callback = slot.borrow_mut().take();
                match callback {
                    Some(callback) => callback(event),
                    None => Ok(()),
                }
            }),
            true,
        )
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to the listeners registered at call time.
    ///
    /// Stops at the first listener error and returns it.
    pub fn emit(&self, event: &E) -> FlowResult<()> {
        let snapshot: Vec<Callback<E>> = {
            let mut listeners = self.listeners.borrow_mut();
            let snapshot = listeners.iter().map(|l| Rc::clone(&l.callback)).collect();
            listeners.retain(|l| !l.once);
            snapshot
        };
        for callback in snapshot {
            callback(event)?;
        }
        Ok(())
    }

    fn register(&self, callback: Callback<E>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener { id, once, callback });
        id
    }
}
