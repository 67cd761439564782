//! Single-threaded cooperative run-loop.
//!
//! Work that must happen "on the next turn" (initial packets, async queue
//! draining) is pushed with [`Scheduler::defer`]. Delayed work (end-of-run
//! debounce, interval components) uses [`Scheduler::defer_after`].
//!
//! The scheduler never runs anything by itself: the host drives it with
//! [`Scheduler::run_until_idle`], [`Scheduler::run_for`] or
//! [`Scheduler::run_once`]. With [`Clock::Virtual`] time only moves when a
//! timer is reached, which keeps ordering reproducible in tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::FlowResult;

pub type Task = Box<dyn FnOnce() -> FlowResult<()>>;

/// Time source for timers.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    /// Time jumps straight to the next due timer.
    Virtual,
    /// Time follows the wall clock; waiting for a timer sleeps the thread.
    Wall { origin: Instant },
}

pub struct Scheduler {
    clock: Clock,
    queue: RefCell<VecDeque<Task>>,
    /// Keyed by (due in ms, insertion sequence) so equal deadlines keep FIFO order.
    timers: RefCell<BTreeMap<(u64, u64), Task>>,
    virtual_now: Cell<u64>,
    next_seq: Cell<u64>,
    turns: Cell<u64>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("clock", &self.clock)
            .field("queued", &self.queue.borrow().len())
            .field("timers", &self.timers.borrow().len())
            .field("turns", &self.turns.get())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler on a virtual clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::Virtual)
    }

    /// Create a scheduler whose timers wait for real time.
    pub fn wall_clock() -> Self {
        Self::with_clock(Clock::Wall {
            origin: Instant::now(),
        })
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            queue: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BTreeMap::new()),
            virtual_now: Cell::new(0),
            next_seq: Cell::new(0),
            turns: Cell::new(0),
        }
    }

    /// Time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms())
    }

    /// Run `task` on the next turn, after everything already queued.
    pub fn defer<F>(&self, task: F)
    where
        F: FnOnce() -> FlowResult<()> + 'static,
    {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Run `task` once `delay` has elapsed.
    pub fn defer_after<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() -> FlowResult<()> + 'static,
    {
        let due = self.now_ms().saturating_add(delay.as_millis() as u64);
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.timers.borrow_mut().insert((due, seq), Box::new(task));
    }

    /// Number of queued tasks plus pending timers.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len() + self.timers.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Total number of tasks executed so far.
    pub fn turns(&self) -> u64 {
        self.turns.get()
    }

    /// Run a single task. Immediate tasks go before timers.
    ///
    /// Returns `Ok(false)` when there was nothing to run.
    pub fn run_once(&self) -> FlowResult<bool> {
        self.run_next(None)
    }

    /// Run until no tasks or timers remain. Returns the number of tasks run.
    ///
    /// A component that re-arms a timer forever keeps this busy; use
    /// [`Scheduler::run_for`] to bound such networks.
    pub fn run_until_idle(&self) -> FlowResult<u64> {
        let start = self.turns.get();
        while self.run_next(None)? {}
        Ok(self.turns.get() - start)
    }

    /// Run everything due within `span` from now, then move the clock to the
    /// end of the span.
    pub fn run_for(&self, span: Duration) -> FlowResult<u64> {
        let start = self.turns.get();
        let deadline = self.now_ms().saturating_add(span.as_millis() as u64);
        while self.run_next(Some(deadline))? {}
        self.advance_to(deadline);
        Ok(self.turns.get() - start)
    }

    fn run_next(&self, deadline: Option<u64>) -> FlowResult<bool> {
        let task = self.queue.borrow_mut().pop_front();
        if let Some(task) = task {
            return self.execute(task);
        }

        let timer = {
            let mut timers = self.timers.borrow_mut();
            match timers.keys().next().copied() {
                Some(key) if deadline.is_none_or(|d| key.0 <= d) => {
                    timers.remove(&key).map(|task| (key.0, task))
                }
                _ => None,
            }
        };
        match timer {
            Some((due, task)) => {
                self.advance_to(due);
                self.execute(task)
            }
            None => Ok(false),
        }
    }

    fn execute(&self, task: Task) -> FlowResult<bool> {
        let turn = self.turns.get() + 1;
        self.turns.set(turn);
        trace!(turn, now_ms = self.now_ms(), "scheduler turn");
        task()?;
        Ok(true)
    }

    fn now_ms(&self) -> u64 {
        match self.clock {
            Clock::Virtual => self.virtual_now.get(),
            Clock::Wall { origin } => origin.elapsed().as_millis() as u64,
        }
    }

    fn advance_to(&self, target: u64) {
        match self.clock {
            Clock::Virtual => {
                if target > self.virtual_now.get() {
                    self.virtual_now.set(target);
                }
            }
            Clock::Wall { .. } => {
                let now = self.now_ms();
                if target > now {
                    std::thread::sleep(Duration::from_millis(target - now));
                }
            }
        }
    }
}
