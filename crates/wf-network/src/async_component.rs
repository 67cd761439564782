//! Components whose work completes later.
//!
//! [`AsyncComponent`] wraps an [`AsyncHandler`] and keeps the stream on its
//! outport in input order: while a job is in flight every incoming group,
//! disconnect and data event is queued, and the queue is replayed one data
//! unit at a time once the load drops back to zero.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde_json::json;
use tracing::trace;
use wf_core::{FlowError, FlowResult, Packet, Scheduler, error_packet};
use wf_ports::{Port, PortEvent};

use crate::component::{Component, ComponentBase};

/// The asynchronous part of a component.
pub trait AsyncHandler {
    /// Start processing `packet`. The handler must eventually call
    /// [`AsyncJob::finish`], now or from a scheduled task.
    fn do_async(&self, packet: Packet, job: AsyncJob) -> FlowResult<()>;
}

#[derive(Debug, Clone)]
enum Queued {
    BeginGroup(String),
    EndGroup,
    Disconnect,
    Data(Packet),
}

struct AsyncState {
    in_port: Rc<Port>,
    out_port: Rc<Port>,
    error_port: Option<Rc<Port>>,
    load_port: Rc<Port>,
    load: Cell<usize>,
    queue: RefCell<VecDeque<Queued>>,
    handler: Rc<dyn AsyncHandler>,
    scheduler: Rc<Scheduler>,
}

/// Handle for one in-flight packet.
pub struct AsyncJob {
    state: Rc<AsyncState>,
}

impl fmt::Debug for AsyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncJob")
            .field("load", &self.state.load.get())
            .finish()
    }
}

impl AsyncJob {
    /// The designated outport.
    pub fn out(&self) -> &Rc<Port> {
        &self.state.out_port
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.state.scheduler
    }

    /// Complete the job.
    ///
    /// An error goes out on the error port when one is attached and is
    /// returned as fatal otherwise.
    pub fn finish(self, result: FlowResult<()>) -> FlowResult<()> {
        if let Err(err) = result {
            match &self.state.error_port {
                Some(port) if port.is_attached() => {
                    port.send(error_packet(&err))?;
                    port.disconnect()?;
                }
                _ => return Err(err),
            }
        }
        self.state.decrement_load()
    }
}

pub struct AsyncComponent {
    base: ComponentBase,
    state: Rc<AsyncState>,
}

impl fmt::Debug for AsyncComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncComponent")
            .field("base", &self.base)
            .field("load", &self.state.load.get())
            .field("queued", &self.state.queue.borrow().len())
            .finish()
    }
}

impl AsyncComponent {
    /// Wrap `handler` using the `in`, `out` and `error` ports of `base`.
    pub fn new(
        base: ComponentBase,
        scheduler: Rc<Scheduler>,
        handler: impl AsyncHandler + 'static,
    ) -> FlowResult<Self> {
        Self::with_port_names(base, scheduler, handler, "in", "out", "error")
    }

    pub fn with_port_names(
        base: ComponentBase,
        scheduler: Rc<Scheduler>,
        handler: impl AsyncHandler + 'static,
        in_name: &str,
        out_name: &str,
        error_name: &str,
    ) -> FlowResult<Self> {
        let in_port = base
            .in_ports
            .get(in_name)
            .ok_or_else(|| FlowError::config(format!("no inport named '{in_name}'")))?;
        let out_port = base
            .out_ports
            .get(out_name)
            .ok_or_else(|| FlowError::config(format!("no outport named '{out_name}'")))?;
        let error_port = base.out_ports.get(error_name);
        let load_port = base.out_ports.add("load", Port::new("int"));

        let state = Rc::new(AsyncState {
            in_port: Rc::clone(&in_port),
            out_port,
            error_port,
            load_port,
            load: Cell::new(0),
            queue: RefCell::new(VecDeque::new()),
            handler: Rc::new(handler),
            scheduler,
        });

        let weak = Rc::downgrade(&state);
        in_port.on(move |event| match weak.upgrade() {
            Some(state) => state.accept(event),
            None => Ok(()),
        });

        Ok(Self { base, state })
    }

    /// Number of jobs currently in flight.
    pub fn load(&self) -> usize {
        self.state.load.get()
    }

    /// Events waiting for the in-flight job to finish.
    pub fn queued(&self) -> usize {
        self.state.queue.borrow().len()
    }

    /// Account for a finished job. Fails with `NegativeLoad` at zero.
    pub fn decrement_load(&self) -> FlowResult<()> {
        self.state.decrement_load()
    }
}

impl Component for AsyncComponent {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}

impl AsyncState {
    fn busy(&self) -> bool {
        self.load.get() > 0 || !self.queue.borrow().is_empty()
    }

    fn accept(self: &Rc<Self>, event: &PortEvent) -> FlowResult<()> {
        let item = match event {
            PortEvent::BeginGroup { group, .. } => Queued::BeginGroup(group.clone()),
            PortEvent::EndGroup { .. } => Queued::EndGroup,
            PortEvent::Disconnect { .. } => Queued::Disconnect,
            PortEvent::Data { packet, .. } => Queued::Data(packet.clone()),
            _ => return Ok(()),
        };
        if self.busy() {
            self.queue.borrow_mut().push_back(item);
            return Ok(());
        }
        self.replay(item)
    }

    fn replay(self: &Rc<Self>, item: Queued) -> FlowResult<()> {
        match item {
            Queued::BeginGroup(group) => self.out_port.begin_group(group),
            Queued::EndGroup => self.out_port.end_group(),
            Queued::Disconnect => {
                self.out_port.disconnect()?;
                if self.load_port.is_attached() {
                    self.load_port.disconnect()?;
                }
                Ok(())
            }
            Queued::Data(packet) => self.process(packet),
        }
    }

    fn process(self: &Rc<Self>, packet: Packet) -> FlowResult<()> {
        self.load.set(self.load.get() + 1);
        self.report_load()?;
        let handler = Rc::clone(&self.handler);
        handler.do_async(
            packet,
            AsyncJob {
                state: Rc::clone(self),
            },
        )
    }

    fn decrement_load(self: &Rc<Self>) -> FlowResult<()> {
        let load = self.load.get();
        if load == 0 {
            return Err(FlowError::NegativeLoad {
                component: self.label(),
            });
        }
        self.load.set(load - 1);
        self.report_load()?;

        let weak = Rc::downgrade(self);
        self.scheduler.defer(move || match weak.upgrade() {
            Some(state) => state.drain(),
            None => Ok(()),
        });
        Ok(())
    }

    fn report_load(&self) -> FlowResult<()> {
        if self.load_port.is_attached() {
            self.load_port.send(json!(self.load.get()))?;
            self.load_port.disconnect()?;
        }
        Ok(())
    }

    /// Replay queued events until one data unit has been started.
    fn drain(self: &Rc<Self>) -> FlowResult<()> {
        if self.load.get() > 0 {
            return Ok(());
        }
        trace!(component = %self.label(), queued = self.queue.borrow().len(), "draining");
        let mut started = false;
        while !started {
            let Some(item) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            started = matches!(item, Queued::Data(_));
            self.replay(item)?;
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.in_port
            .node()
            .unwrap_or_else(|| "unplaced component".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ports::create_socket;

    /// Echoes each packet on the next scheduler turn.
    struct DeferredEcho {
        in_flight: Rc<Cell<usize>>,
        max_in_flight: Rc<Cell<usize>>,
    }

    impl AsyncHandler for DeferredEcho {
        fn do_async(&self, packet: Packet, job: AsyncJob) -> FlowResult<()> {
            self.in_flight.set(self.in_flight.get() + 1);
            self.max_in_flight
                .set(self.max_in_flight.get().max(self.in_flight.get()));
            let in_flight = Rc::clone(&self.in_flight);
            let scheduler = Rc::clone(job.scheduler());
            scheduler.defer(move || {
                in_flight.set(in_flight.get() - 1);
                job.out().send(packet)?;
                job.finish(Ok(()))
            });
            Ok(())
        }
    }

    struct Failing;

    impl AsyncHandler for Failing {
        fn do_async(&self, _packet: Packet, job: AsyncJob) -> FlowResult<()> {
            job.finish(Err(FlowError::component("boom")))
        }
    }

    fn ports(with_error: bool) -> ComponentBase {
        let base = ComponentBase::new("test");
        base.in_ports.add("in", Port::new("all"));
        base.out_ports.add("out", Port::new("all"));
        if with_error {
            base.out_ports.add("error", Port::new("object"));
        }
        base
    }

    type Seen = Rc<RefCell<Vec<PortEvent>>>;

    /// Connect `port` to a fresh receiving port and record what arrives.
    fn wire(port: &Rc<Port>) -> (Rc<Port>, Seen) {
        let socket = create_socket();
        port.attach(Rc::clone(&socket)).unwrap();
        let receiver = Rc::new(Port::new("all"));
        receiver.attach(socket).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        receiver.on(move |event| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });
        (receiver, seen)
    }

    #[test]
    fn serializes_work_and_keeps_order() {
        let scheduler = Rc::new(Scheduler::new());
        let max = Rc::new(Cell::new(0));
        let component = AsyncComponent::new(
            ports(false),
            Rc::clone(&scheduler),
            DeferredEcho {
                in_flight: Rc::new(Cell::new(0)),
                max_in_flight: Rc::clone(&max),
            },
        )
        .unwrap();
        let (_receiver, out) = wire(&component.out_ports().get("out").unwrap());

        let input = create_socket();
        component
            .in_ports()
            .get("in")
            .unwrap()
            .attach(Rc::clone(&input))
            .unwrap();
        input.begin_group("g").unwrap();
        input.send(json!(1)).unwrap();
        input.send(json!(2)).unwrap();
        input.end_group().unwrap();
        input.disconnect().unwrap();

        assert_eq!(component.load(), 1);
        assert_eq!(component.queued(), 3);

        scheduler.run_until_idle().unwrap();

        assert_eq!(component.load(), 0);
        assert_eq!(component.queued(), 0);
        assert_eq!(max.get(), 1);
        let names: Vec<String> = out
            .borrow()
            .iter()
            .map(|e| match e {
                PortEvent::BeginGroup { group, .. } => format!("begin {group}"),
                PortEvent::Data { packet, .. } => format!("data {packet}"),
                PortEvent::EndGroup { .. } => "end".to_string(),
                PortEvent::Connect { .. } => "connect".to_string(),
                PortEvent::Disconnect { .. } => "disconnect".to_string(),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(
            names,
            vec!["connect", "begin g", "data 1", "data 2", "end", "disconnect"]
        );
    }

    #[test]
    fn decrement_at_zero_is_fatal() {
        let component =
            AsyncComponent::new(ports(false), Rc::new(Scheduler::new()), Failing).unwrap();
        assert!(matches!(
            component.decrement_load(),
            Err(FlowError::NegativeLoad { .. })
        ));
    }

    #[test]
    fn errors_go_to_attached_error_port() {
        let scheduler = Rc::new(Scheduler::new());
        let component = AsyncComponent::new(ports(true), Rc::clone(&scheduler), Failing).unwrap();
        let (_receiver, errors) = wire(&component.out_ports().get("error").unwrap());

        let input = create_socket();
        component
            .in_ports()
            .get("in")
            .unwrap()
            .attach(Rc::clone(&input))
            .unwrap();
        input.send(json!("x")).unwrap();
        scheduler.run_until_idle().unwrap();

        assert!(errors.borrow().contains(&PortEvent::Data {
            packet: json!({"message": "Component error: boom"}),
            index: None
        }));
        assert_eq!(component.load(), 0);
    }

    #[test]
    fn errors_without_error_port_are_fatal() {
        let component =
            AsyncComponent::new(ports(false), Rc::new(Scheduler::new()), Failing).unwrap();
        let input = create_socket();
        component
            .in_ports()
            .get("in")
            .unwrap()
            .attach(Rc::clone(&input))
            .unwrap();
        let err = input.send(json!("x")).unwrap_err();
        assert_eq!(err, FlowError::component("boom"));
    }

    #[test]
    fn missing_ports_are_rejected() {
        let err = AsyncComponent::new(
            ComponentBase::new("bare"),
            Rc::new(Scheduler::new()),
            Failing,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration: no inport named 'in'");
    }

    #[test]
    fn load_port_reports_changes() {
        let scheduler = Rc::new(Scheduler::new());
        let component = AsyncComponent::new(
            ports(false),
            Rc::clone(&scheduler),
            DeferredEcho {
                in_flight: Rc::new(Cell::new(0)),
                max_in_flight: Rc::new(Cell::new(0)),
            },
        )
        .unwrap();
        let _out = wire(&component.out_ports().get("out").unwrap());
        let (_receiver, load) = wire(&component.out_ports().get("load").unwrap());

        let input = create_socket();
        component
            .in_ports()
            .get("in")
            .unwrap()
            .attach(Rc::clone(&input))
            .unwrap();
        input.send(json!(1)).unwrap();
        scheduler.run_until_idle().unwrap();

        let reported: Vec<Packet> = load
            .borrow()
            .iter()
            .filter_map(|e| match e {
                PortEvent::Data { packet, .. } => Some(packet.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(reported, vec![json!(1), json!(0)]);
    }
}
