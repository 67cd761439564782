//! RunInterval: sends `true` every interval while running.
//!
//! `interval` takes milliseconds, `start` opens the outbound connection and
//! arms the timer, `stop` cancels it and disconnects. Timers run on the
//! network's scheduler; a changed interval re-arms a running timer.

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;
use wf_core::{FlowError, FlowResult, Scheduler};
use wf_network::{Component, ComponentBase};
use wf_ports::{Port, PortEvent};

struct IntervalState {
    out: Rc<Port>,
    scheduler: Rc<Scheduler>,
    interval: Cell<Option<Duration>>,
    /// Bumped on every arm and cancel; stale ticks compare and bail.
    generation: Cell<u64>,
    active: Cell<bool>,
}

impl IntervalState {
    fn set_interval(self: &Rc<Self>, packet: &Value) -> FlowResult<()> {
        let millis = packet
            .as_f64()
            .filter(|ms| *ms > 0.0)
            .ok_or_else(|| {
                FlowError::config(format!(
                    "interval must be a positive number of milliseconds, got {packet}"
                ))
            })?;
        self.interval
            .set(Some(Duration::from_millis((millis as u64).max(1))));
        if self.active.get() {
            self.arm()?;
        }
        Ok(())
    }

    fn start(self: &Rc<Self>) -> FlowResult<()> {
        if self.interval.get().is_none() {
            return Err(FlowError::config("RunInterval needs an interval before start"));
        }
        self.out.connect()?;
        self.arm()
    }

    fn stop(&self) -> FlowResult<()> {
        if !self.active.get() {
            return Ok(());
        }
        self.cancel();
        self.out.disconnect()
    }

    fn arm(self: &Rc<Self>) -> FlowResult<()> {
        let interval = self
            .interval
            .get()
            .ok_or_else(|| FlowError::config("RunInterval needs an interval before start"))?;
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.active.set(true);
        debug!(interval_ms = interval.as_millis() as u64, "interval armed");
        schedule_tick(Rc::downgrade(self), interval, generation, &self.scheduler);
        Ok(())
    }

    fn cancel(&self) {
        self.generation.set(self.generation.get() + 1);
        self.active.set(false);
    }
}

fn schedule_tick(
    state: Weak<IntervalState>,
    interval: Duration,
    generation: u64,
    scheduler: &Scheduler,
) {
    scheduler.defer_after(interval, move || {
        let Some(state) = state.upgrade() else {
            return Ok(());
        };
        if state.generation.get() != generation {
            return Ok(());
        }
        state.out.send(json!(true))?;
        schedule_tick(Rc::downgrade(&state), interval, generation, &state.scheduler);
        Ok(())
    });
}

pub struct RunInterval {
    base: ComponentBase,
    state: Rc<IntervalState>,
}

impl std::fmt::Debug for RunInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunInterval")
            .field("base", &self.base)
            .field("interval", &self.state.interval.get())
            .field("active", &self.state.active.get())
            .finish()
    }
}

impl RunInterval {
    pub fn new(scheduler: Rc<Scheduler>) -> Rc<Self> {
        let base = ComponentBase::new("Send a packet at the given interval");
        base.set_icon("clock");
        let interval = base.in_ports.add("interval", Port::new("number"));
        let start = base.in_ports.add("start", Port::new("bang"));
        let stop = base.in_ports.add("stop", Port::new("bang"));
        let out = base.out_ports.add("out", Port::new("bang"));

        let state = Rc::new(IntervalState {
            out,
            scheduler,
            interval: Cell::new(None),
            generation: Cell::new(0),
            active: Cell::new(false),
        });

        let timer = Rc::clone(&state);
        interval.on(move |event| match event {
            PortEvent::Data { packet, .. } => timer.set_interval(packet),
            _ => Ok(()),
        });
        let timer = Rc::clone(&state);
        start.on(move |event| match event {
            PortEvent::Data { .. } => timer.start(),
            _ => Ok(()),
        });
        let timer = Rc::clone(&state);
        stop.on(move |event| match event {
            PortEvent::Data { .. } => timer.stop(),
            _ => Ok(()),
        });

        Rc::new(Self { base, state })
    }

    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }
}

impl Component for RunInterval {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn shutdown(&self) -> FlowResult<()> {
        self.state.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{feed, tap};

    #[test]
    fn ticks_until_stopped() {
        let scheduler = Rc::new(Scheduler::new());
        let component = RunInterval::new(Rc::clone(&scheduler));
        let interval = feed(component.as_ref(), "interval");
        let start = feed(component.as_ref(), "start");
        let stop = feed(component.as_ref(), "stop");
        let out = tap(component.as_ref(), "out");

        interval.send(json!(100)).unwrap();
        start.send(json!(true)).unwrap();
        scheduler.run_for(Duration::from_millis(350)).unwrap();
        stop.send(json!(true)).unwrap();
        scheduler.run_for(Duration::from_millis(500)).unwrap();

        assert_eq!(
            *out.borrow(),
            vec!["connect", "true", "true", "true", "disconnect"]
        );
        assert!(!component.is_active());
    }

    #[test]
    fn new_interval_rearms_running_timer() {
        let scheduler = Rc::new(Scheduler::new());
        let component = RunInterval::new(Rc::clone(&scheduler));
        let interval = feed(component.as_ref(), "interval");
        let start = feed(component.as_ref(), "start");
        let out = tap(component.as_ref(), "out");

        interval.send(json!(100)).unwrap();
        start.send(json!(true)).unwrap();
        scheduler.run_for(Duration::from_millis(50)).unwrap();
        interval.send(json!(20)).unwrap();
        scheduler.run_for(Duration::from_millis(45)).unwrap();

        assert_eq!(*out.borrow(), vec!["connect", "true", "true"]);
    }

    #[test]
    fn shutdown_cancels_the_timer() {
        let scheduler = Rc::new(Scheduler::new());
        let component = RunInterval::new(Rc::clone(&scheduler));
        let interval = feed(component.as_ref(), "interval");
        let start = feed(component.as_ref(), "start");
        let out = tap(component.as_ref(), "out");

        interval.send(json!(10)).unwrap();
        start.send(json!(true)).unwrap();
        component.shutdown().unwrap();
        scheduler.run_until_idle().unwrap();

        assert_eq!(*out.borrow(), vec!["connect"]);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn start_needs_an_interval() {
        let scheduler = Rc::new(Scheduler::new());
        let component = RunInterval::new(scheduler);
        let start = feed(component.as_ref(), "start");
        let err = start.send(json!(true)).unwrap_err();
        assert!(err.to_string().contains("needs an interval"));
        assert!(feed(component.as_ref(), "interval").send(json!(-5)).is_err());
    }
}
