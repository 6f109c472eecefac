//! The step loop.
//!
//! A *step* polls a task's future once and dispatches whatever it yielded:
//! completion, failure, or a suspension request whose builder is invoked with
//! a resume capability. Two entry points exist: [`Scheduler::step_new`] runs
//! a freshly spawned task inline on the calling stack (a child starts before
//! control returns to its parent), and [`Scheduler::enter`] resumes a parked
//! task.
//!
//! Resumptions trampoline instead of recursing: while any step is active on
//! this thread, further `enter` calls only enqueue, and the outermost step
//! drains the queue. Same-task synchronous continuations short-circuit even
//! that — a reply that lands during the task's own step is consumed by the
//! step's inner loop. Both paths keep stack depth constant for arbitrarily
//! long synchronous chains.

use crate::context;
use crate::future::suspend::{AwaitRequest, RawResume};
use crate::runtime::HostLoop;
use crate::task::core::{Core, CurrentAwait};
use crate::task::TaskError;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::task::{Context, Poll};

pub(crate) struct Scheduler {
    active: Cell<bool>,
    queue: RefCell<VecDeque<Rc<Core>>>,
    host: Rc<dyn HostLoop>,
}

impl Scheduler {
    pub(crate) fn new(host: Rc<dyn HostLoop>) -> Rc<Self> {
        Rc::new(Self {
            active: Cell::new(false),
            queue: RefCell::new(VecDeque::new()),
            host,
        })
    }

    pub(crate) fn host(&self) -> &Rc<dyn HostLoop> {
        &self.host
    }

    /// Resume entry: run `task` soon. If a step is already active on this
    /// stack the task is queued and the outermost step picks it up.
    pub(crate) fn enter(task: Rc<Core>) {
        let sched = task.sched().clone();
        sched.queue.borrow_mut().push_back(task);
        if sched.active.get() {
            return;
        }
        sched.active.set(true);
        sched.drain();
        sched.active.set(false);
    }

    /// Spawn entry: run `task` now, on this stack, before returning.
    pub(crate) fn step_new(task: &Rc<Core>) {
        let sched = task.sched().clone();
        if sched.active.get() {
            Self::step(task);
        } else {
            sched.active.set(true);
            Self::step(task);
            sched.drain();
            sched.active.set(false);
        }
    }

    fn drain(&self) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(task) => Self::step(&task),
                None => break,
            }
        }
    }

    fn step(task: &Rc<Core>) {
        task.set_stepping(true);
        Self::step_inner(task);
        task.set_stepping(false);
    }

    fn step_inner(task: &Rc<Core>) {
        loop {
            if task.is_completed() {
                return;
            }
            if task.is_completing() {
                Core::seal_and_drain(task);
                return;
            }
            let Some(mut body) = task.take_coroutine_for_poll() else {
                return;
            };

            tracing::trace!(id = task.id().as_u64(), "step");
            task.set_polling(true);
            let poll = {
                let _enter = context::enter(task.clone());
                let mut cx = Context::from_waker(futures::task::noop_waker_ref());
                catch_unwind(AssertUnwindSafe(|| body.as_mut().poll(&mut cx)))
            };
            task.set_polling(false);

            match poll {
                Err(payload) => {
                    drop(body);
                    Core::begin_completing(task, Some(TaskError::from_panic(payload)));
                    return;
                }
                Ok(Poll::Ready(out)) => {
                    drop(body);
                    if task.is_completing() {
                        // An external `complete` raced this poll and won.
                        Core::seal_and_drain(task);
                        return;
                    }
                    Core::begin_completing(task, out.err());
                    return;
                }
                Ok(Poll::Pending) => {
                    task.put_back_coroutine(body);
                    if task.is_completing() {
                        Core::seal_and_drain(task);
                        return;
                    }
                    if task.take_double_deposit() {
                        Core::begin_completing(task, Some(TaskError::UnexpectedYield));
                        return;
                    }
                    let Some(deposit) = task.take_deposit() else {
                        if task.has_reply() {
                            // Resumed synchronously from within the poll.
                            continue;
                        }
                        if task.expected_marker().is_some() {
                            // Spurious wakeup of a parked task.
                            return;
                        }
                        // Pending without suspending through the runtime.
                        Core::begin_completing(task, Some(TaskError::UnexpectedYield));
                        return;
                    };

                    let marker = deposit.marker;
                    match deposit.request {
                        AwaitRequest::Callback(builder) => {
                            task.install_await(marker, deposit.at, CurrentAwait::Bare);
                            let raw = RawResume::new(task, marker);
                            match catch_unwind(AssertUnwindSafe(|| builder(raw))) {
                                Err(payload) => {
                                    Core::begin_completing(
                                        task,
                                        Some(TaskError::from_panic(payload)),
                                    );
                                    return;
                                }
                                Ok(Some(handle)) => {
                                    // Only install if the builder did not
                                    // already resume the task.
                                    if task.is_expecting(marker) {
                                        task.set_current_await(CurrentAwait::Handle(handle));
                                    }
                                }
                                Ok(None) => {}
                            }
                        }
                        AwaitRequest::Task { child, builder } => {
                            task.install_await(marker, deposit.at, CurrentAwait::Child(child));
                            let raw = RawResume::new(task, marker);
                            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| builder(raw))) {
                                Core::begin_completing(task, Some(TaskError::from_panic(payload)));
                                return;
                            }
                        }
                        AwaitRequest::HostTick => {
                            task.install_await(marker, deposit.at, CurrentAwait::Bare);
                            let raw = RawResume::new(task, marker);
                            task.sched()
                                .host()
                                .schedule(Box::new(move || raw.resume_ok()));
                        }
                    }

                    if task.has_reply() {
                        // Synchronous resume: loop instead of recursing.
                        continue;
                    }
                    return;
                }
            }
        }
    }
}
