//! Awaiting another task.
//!
//! The suspension installs the awaited task as the awaiting task's
//! current-await and registers a completion notifier on it, keyed and tagged
//! with the awaiting task so (a) dropping an unresolved `Join` unregisters it
//! — the awaited task keeps no callbacks behind — and (b) completion can tell
//! a parent awaiting its child apart from an unrelated observer. If the
//! awaited task already completed the result is read directly, which also
//! makes recursively-nested synchronous completions resolve without a trip
//! through the host loop.

use crate::context;
use crate::future::suspend::{next_marker, AwaitRequest, Deposit, RequestBuilder};
use crate::task::core::{Core, SuspendGate};
use crate::task::handle::read_result;
use crate::task::{Result, ResultSlot, TaskError, TaskHandle};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// Future returned by [`TaskHandle::join`] and by awaiting a handle.
pub struct Join<T> {
    handle: TaskHandle<T>,
    /// Child result as delivered by the notifier.
    cell: Rc<RefCell<Option<Result<T>>>>,
    /// Key of the notifier installed on the awaited task, once registered.
    registration: Rc<Cell<Option<u64>>>,
    task: Option<Weak<Core>>,
    marker: Option<u64>,
    at: &'static Location<'static>,
}

impl<T: Clone + 'static> Join<T> {
    #[track_caller]
    pub(crate) fn new(handle: TaskHandle<T>) -> Self {
        Self {
            handle,
            cell: Rc::new(RefCell::new(None)),
            registration: Rc::new(Cell::new(None)),
            task: None,
            marker: None,
            at: Location::caller(),
        }
    }
}

impl<T> Unpin for Join<T> {}

impl<T: Clone + 'static> Future for Join<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(task) = context::current() else {
            return Poll::Ready(Err(TaskError::NotInTask));
        };

        match this.marker {
            None => {
                if std::ptr::eq(Rc::as_ptr(&task), Rc::as_ptr(&this.handle.core)) {
                    return Poll::Ready(Err(TaskError::failed("task cannot await itself")));
                }
                match task.suspend_gate() {
                    SuspendGate::Proceed => {}
                    SuspendGate::Defer => return Poll::Pending,
                    SuspendGate::Fail(err) => return Poll::Ready(Err(err)),
                }
                if this.handle.core.is_completed() {
                    return Poll::Ready(this.handle.peek_result());
                }

                let marker = next_marker();
                this.marker = Some(marker);
                this.task = Some(Rc::downgrade(&task));

                let owner = task.id();
                let child = this.handle.core.clone();
                let child_weak = Rc::downgrade(&child);
                let slot: ResultSlot<T> = this.handle.slot.clone();
                let cell = this.cell.clone();
                let registration = this.registration.clone();
                let builder: RequestBuilder = Box::new(move |raw| {
                    // Weak capture inside the notifier: the child must not
                    // own a closure that owns the child.
                    let key = child.add_notifier(
                        Some(owner),
                        Box::new(move || {
                            if let Some(child) = child_weak.upgrade() {
                                *cell.borrow_mut() = Some(read_result(&child, &slot));
                            }
                            raw.resume_ok();
                        }),
                    );
                    registration.set(Some(key));
                    None
                });
                task.push_deposit(Deposit {
                    marker,
                    request: AwaitRequest::Task {
                        child: this.handle.core.clone(),
                        builder,
                    },
                    at: this.at,
                });
                Poll::Pending
            }
            Some(marker) => match task.take_reply() {
                None => Poll::Pending,
                Some((m, reply)) => {
                    if m != marker {
                        return Poll::Ready(Err(TaskError::UnexpectedResume));
                    }
                    this.marker = None;
                    if task.is_closing() {
                        return Poll::Ready(Err(TaskError::Closed));
                    }
                    match reply {
                        Ok(()) => match this.cell.borrow_mut().take() {
                            Some(result) => Poll::Ready(result),
                            None => Poll::Ready(Err(TaskError::UnexpectedResume)),
                        },
                        Err(err) => Poll::Ready(Err(err)),
                    }
                }
            },
        }
    }
}

impl<T> Drop for Join<T> {
    fn drop(&mut self) {
        // An unresolved join must not leave its callback on the awaited task
        // (fired notifiers are already gone; removal is then a no-op).
        if let Some(key) = self.registration.get() {
            self.handle.core.remove_notifier(key);
        }
        if let (Some(marker), Some(task)) = (self.marker, self.task.as_ref()) {
            if let Some(core) = task.upgrade() {
                core.forget_await(marker);
            }
        }
    }
}
