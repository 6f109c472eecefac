//! Completion-order iteration over a set of tasks.
//!
//! Results are delivered as tasks finish, not in input order; each item
//! carries its input index, and an item failure is framed as
//! `iter error[index:N]: <payload>` so the consumer can tell which task died.
//! Dropping the iterator unregisters every notifier it installed — the
//! iterated tasks keep no callbacks behind.

use crate::context;
use crate::future::suspend::{suspend, ResumeHandle};
use crate::task::core::Core;
use crate::task::handle::read_result;
use crate::task::{Result, TaskError, TaskHandle};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// Iterate tasks in completion order. See [module docs](self).
pub fn iter<T: Clone + 'static>(handles: Vec<TaskHandle<T>>) -> TaskIter<T> {
    let owner = context::current().map(|core| core.id());
    let shared = Rc::new(RefCell::new(Shared {
        ready: VecDeque::new(),
        remaining: handles.len(),
        waiting: None,
    }));

    let mut registrations = Vec::with_capacity(handles.len());
    for (index, handle) in handles.iter().enumerate() {
        let core_weak = Rc::downgrade(&handle.core);
        let slot = handle.slot.clone();
        let shared = shared.clone();
        let key = handle.core.add_notifier(owner, Box::new(move || {
            let Some(core) = core_weak.upgrade() else { return };
            let result = read_result(&core, &slot);
            let mut state = shared.borrow_mut();
            state.ready.push_back((index, result));
            if let Some(resume) = state.waiting.take() {
                drop(state);
                resume.resume(());
            }
        }));
        registrations.push((Rc::downgrade(&handle.core), key));
    }

    TaskIter {
        shared,
        registrations,
    }
}

struct Shared<T> {
    ready: VecDeque<(usize, Result<T>)>,
    remaining: usize,
    waiting: Option<ResumeHandle<()>>,
}

/// Iterator returned by [`iter`].
pub struct TaskIter<T> {
    shared: Rc<RefCell<Shared<T>>>,
    registrations: Vec<(Weak<Core>, u64)>,
}

impl<T: Clone + 'static> TaskIter<T> {
    /// Next completed task as `(input_index, value)`, or `None` once every
    /// task has been delivered. Suspends until one completes.
    pub async fn next(&mut self) -> Option<Result<(usize, T)>> {
        loop {
            {
                let mut state = self.shared.borrow_mut();
                if let Some((index, result)) = state.ready.pop_front() {
                    state.remaining -= 1;
                    return Some(result.map(|value| (index, value)).map_err(|err| {
                        TaskError::Iter {
                            index,
                            cause: Rc::new(err),
                        }
                    }));
                }
                if state.remaining == 0 {
                    return None;
                }
            }
            let shared = self.shared.clone();
            let parked = suspend(move |resume| {
                shared.borrow_mut().waiting = Some(resume);
                None
            })
            .await;
            if let Err(err) = parked {
                return Some(Err(err));
            }
        }
    }
}

impl<T> Drop for TaskIter<T> {
    fn drop(&mut self) {
        for (core, key) in &self.registrations {
            if let Some(core) = core.upgrade() {
                core.remove_notifier(*key);
            }
        }
    }
}
