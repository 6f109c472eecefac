//! The bundled single-threaded host loop.
//!
//! The runtime itself needs exactly two capabilities from its host
//! (see [`HostLoop`]): defer a thunk to the next tick, and pump callbacks
//! until a condition holds. [`TickLoop`] provides both with a FIFO tick queue
//! plus a timer heap, which is also enough to express timer-style callback
//! APIs in embeddings (and tests) without any real I/O.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::{Duration, Instant};

/// What the runtime requires from its embedding host.
pub trait HostLoop {
    /// Defer `thunk` to the next iteration of the loop. Non-blocking.
    fn schedule(&self, thunk: Box<dyn FnOnce()>);

    /// Drive the loop, pumping callbacks, until `pred()` holds or `timeout`
    /// elapses. Returns whether the predicate was satisfied. With no timeout,
    /// returns `false` only if the loop goes quiescent (nothing scheduled,
    /// no timers pending) while the predicate is still unsatisfied.
    fn block_until(&self, pred: &mut dyn FnMut() -> bool, timeout: Option<Duration>) -> bool;
}

/// Identifier of a pending [`TickLoop`] timer, usable to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    id: TimerId,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Deadline first; insertion order breaks ties.
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// The default host: a tick queue and a timer heap on one thread.
#[derive(Default)]
pub struct TickLoop {
    ticks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    timers: RefCell<BinaryHeap<Reverse<TimerEntry>>>,
    /// Live timer thunks; a cancelled timer is simply absent when its heap
    /// entry surfaces.
    timer_thunks: RefCell<HashMap<TimerId, Box<dyn FnOnce()>>>,
    next_seq: Cell<u64>,
}

impl TickLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer. The thunk runs once `delay` has elapsed, the next time
    /// the loop is pumped past the deadline.
    pub fn schedule_after(&self, delay: Duration, thunk: Box<dyn FnOnce()>) -> TimerId {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let id = TimerId(seq);
        self.timers.borrow_mut().push(Reverse(TimerEntry {
            deadline: Instant::now() + delay,
            seq,
            id,
        }));
        self.timer_thunks.borrow_mut().insert(id, thunk);
        id
    }

    /// Disarm a timer. Returns whether it was still pending.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.timer_thunks.borrow_mut().remove(&id).is_some()
    }

    /// Earliest armed deadline, if any timer is live.
    fn next_deadline(&self) -> Option<Instant> {
        let thunks = self.timer_thunks.borrow();
        let mut timers = self.timers.borrow_mut();
        // Drop cancelled entries off the top while peeking.
        while let Some(Reverse(entry)) = timers.peek() {
            if thunks.contains_key(&entry.id) {
                return Some(entry.deadline);
            }
            timers.pop();
        }
        None
    }

    /// Run one pending callback: ticks first (delivery order), then due
    /// timers. Returns whether anything ran.
    fn run_one(&self) -> bool {
        let tick = self.ticks.borrow_mut().pop_front();
        if let Some(thunk) = tick {
            thunk();
            return true;
        }

        let now = Instant::now();
        let due = {
            let mut timers = self.timers.borrow_mut();
            match timers.peek() {
                Some(Reverse(entry)) if entry.deadline <= now => {
                    let Reverse(entry) = timers.pop().unwrap_or_else(|| unreachable!());
                    self.timer_thunks.borrow_mut().remove(&entry.id)
                }
                _ => None,
            }
        };
        match due {
            Some(thunk) => {
                thunk();
                true
            }
            None => false,
        }
    }
}

impl HostLoop for TickLoop {
    fn schedule(&self, thunk: Box<dyn FnOnce()>) {
        self.ticks.borrow_mut().push_back(thunk);
    }

    fn block_until(&self, pred: &mut dyn FnMut() -> bool, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if pred() {
                return true;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return false;
                }
            }
            if self.run_one() {
                continue;
            }
            // Quiescent: sleep toward the nearest timer (bounded by the
            // caller's deadline), or give up if there is nothing to wait for.
            match self.next_deadline() {
                Some(at) => {
                    let until = match deadline {
                        Some(d) => at.min(d),
                        None => at,
                    };
                    let now = Instant::now();
                    if until > now {
                        std::thread::sleep(until - now);
                    }
                }
                None => match deadline {
                    Some(d) => {
                        let now = Instant::now();
                        if d > now {
                            std::thread::sleep(d - now);
                        }
                        return false;
                    }
                    None => return false,
                },
            }
        }
    }
}
