use crate::context;
use crate::future::suspend::{next_marker, AwaitRequest, Deposit};
use crate::task::core::{Core, SuspendGate};
use crate::task::TaskError;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// Suspend the current task until the host loop's next tick.
///
/// The cheapest way to let other ready tasks (and host callbacks) run.
#[track_caller]
pub fn yield_now() -> YieldNow {
    YieldNow {
        task: None,
        marker: None,
        at: Location::caller(),
    }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    task: Option<Weak<Core>>,
    marker: Option<u64>,
    at: &'static Location<'static>,
}

impl Unpin for YieldNow {}

impl Future for YieldNow {
    type Output = Result<(), TaskError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(task) = context::current() else {
            return Poll::Ready(Err(TaskError::NotInTask));
        };

        match this.marker {
            None => {
                match task.suspend_gate() {
                    SuspendGate::Proceed => {}
                    SuspendGate::Defer => return Poll::Pending,
                    SuspendGate::Fail(err) => return Poll::Ready(Err(err)),
                }
                let marker = next_marker();
                this.marker = Some(marker);
                this.task = Some(Rc::downgrade(&task));
                task.push_deposit(Deposit {
                    marker,
                    request: AwaitRequest::HostTick,
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
                    Poll::Ready(reply)
                }
            },
        }
    }
}

impl Drop for YieldNow {
    fn drop(&mut self) {
        if let (Some(marker), Some(task)) = (self.marker, self.task.as_ref()) {
            if let Some(core) = task.upgrade() {
                core.forget_await(marker);
            }
        }
    }
}
