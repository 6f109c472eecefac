//! The single yield/resume bridge between task bodies and the runtime.
//!
//! Every await shape in this crate desugars to one suspension request: a
//! marker plus a builder the step loop invokes with a resume handle. The
//! marker is the hygiene mechanism — a reply is only honored while its marker
//! is the outstanding one, so stale or duplicate resumes are no-ops and a
//! mismatched delivery fails the await instead of corrupting the runtime.

use crate::closable::ClosableHandle;
use crate::context;
use crate::task::core::{Core, SuspendGate};
use crate::task::TaskError;
use std::cell::RefCell;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

/// Type-erased builder as stored in the yield channel.
pub(crate) type RequestBuilder = Box<dyn FnOnce(RawResume) -> Option<ClosableHandle>>;

/// The await shapes the step loop dispatches on.
pub(crate) enum AwaitRequest {
    /// Run a builder; an optional closable becomes the current-await.
    Callback(RequestBuilder),
    /// Await another task: the builder registers a completion notifier and
    /// the child itself becomes the current-await.
    Task {
        child: Rc<Core>,
        builder: RequestBuilder,
    },
    /// Reschedule on the host's next tick.
    HostTick,
}

/// One suspension request, deposited by an await future's first poll and
/// consumed by the step loop.
pub(crate) struct Deposit {
    pub(crate) marker: u64,
    pub(crate) request: AwaitRequest,
    pub(crate) at: &'static Location<'static>,
}

pub(crate) fn next_marker() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Type-erased resume capability for one suspension of one task.
///
/// Cheap to clone; every copy refers to the same (task, marker) pair, and the
/// first delivery through any copy wins.
#[derive(Clone)]
pub(crate) struct RawResume {
    task: Weak<Core>,
    marker: u64,
}

impl RawResume {
    pub(crate) fn new(task: &Rc<Core>, marker: u64) -> Self {
        Self {
            task: Rc::downgrade(task),
            marker,
        }
    }

    /// Whether this suspension has already been resumed (or the task died).
    pub(crate) fn is_spent(&self) -> bool {
        match self.task.upgrade() {
            Some(core) => !core.is_expecting(self.marker),
            None => true,
        }
    }

    pub(crate) fn resume_ok(&self) {
        self.deliver(Ok(()));
    }

    pub(crate) fn resume_err(&self, err: TaskError) {
        self.deliver(Err(err));
    }

    fn deliver(&self, reply: Result<(), TaskError>) {
        if let Some(core) = self.task.upgrade() {
            Core::push_reply(&core, self.marker, reply);
        }
    }
}

/// The continuation handed to a suspension builder.
///
/// Invoke [`resume`](ResumeHandle::resume) exactly once when the external
/// operation finishes. Extra invocations are ignored — the first one wins,
/// which also covers callbacks fired again after the task was cancelled.
pub struct ResumeHandle<V> {
    cell: Rc<RefCell<Option<V>>>,
    raw: RawResume,
}

impl<V> Clone for ResumeHandle<V> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            raw: self.raw.clone(),
        }
    }
}

impl<V> ResumeHandle<V> {
    pub(crate) fn new(cell: Rc<RefCell<Option<V>>>, raw: RawResume) -> Self {
        Self { cell, raw }
    }

    /// Deliver the awaited value and wake the suspended task.
    pub fn resume(&self, value: V) {
        if self.raw.is_spent() {
            tracing::trace!("dropping stale resume");
            return;
        }
        *self.cell.borrow_mut() = Some(value);
        self.raw.resume_ok();
    }

    /// Whether the suspension was already resumed (or cancelled).
    pub fn is_spent(&self) -> bool {
        self.raw.is_spent()
    }
}

/// Suspend the current task until a callback-style API resumes it.
///
/// `builder` runs inside the runtime's step loop with a [`ResumeHandle`]; it
/// starts the external operation and may return a [`Closable`] for the
/// runtime to cancel if the task is closed while suspended. Returning `None`
/// leaves the suspension bare (nothing to cancel; a close synthesizes the
/// `closed` resume directly).
///
/// The builder may invoke the handle synchronously; arbitrarily long chains
/// of synchronous resumptions run iteratively, not recursively.
///
/// ```no_run
/// # async fn demo() -> Result<u32, lariat::TaskError> {
/// let value = lariat::suspend(|resume| {
///     resume.resume(7); // e.g. an external API calling back immediately
///     None
/// })
/// .await?;
/// # Ok(value)
/// # }
/// ```
///
/// [`Closable`]: crate::Closable
#[track_caller]
pub fn suspend<V, B>(builder: B) -> Suspend<V, B>
where
    V: 'static,
    B: FnOnce(ResumeHandle<V>) -> Option<ClosableHandle> + 'static,
{
    Suspend {
        builder: Some(builder),
        cell: Rc::new(RefCell::new(None)),
        task: None,
        marker: None,
        at: Location::caller(),
    }
}

/// Future returned by [`suspend`].
pub struct Suspend<V, B> {
    builder: Option<B>,
    cell: Rc<RefCell<Option<V>>>,
    task: Option<Weak<Core>>,
    marker: Option<u64>,
    at: &'static Location<'static>,
}

impl<V, B> Unpin for Suspend<V, B> {}

impl<V, B> Future for Suspend<V, B>
where
    V: 'static,
    B: FnOnce(ResumeHandle<V>) -> Option<ClosableHandle> + 'static,
{
    type Output = Result<V, TaskError>;

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

                let builder = this
                    .builder
                    .take()
                    .unwrap_or_else(|| unreachable!("suspension builder consumed twice"));
                let cell = this.cell.clone();
                let wrapped: RequestBuilder =
                    Box::new(move |raw| builder(ResumeHandle::new(cell, raw)));
                task.push_deposit(Deposit {
                    marker,
                    request: AwaitRequest::Callback(wrapped),
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
                    // The closing flag is checked at every resume.
                    if task.is_closing() {
                        return Poll::Ready(Err(TaskError::Closed));
                    }
                    match reply {
                        Ok(()) => match this.cell.borrow_mut().take() {
                            Some(value) => Poll::Ready(Ok(value)),
                            None => Poll::Ready(Err(TaskError::UnexpectedResume)),
                        },
                        Err(err) => Poll::Ready(Err(err)),
                    }
                }
            },
        }
    }
}

impl<V, B> Drop for Suspend<V, B> {
    fn drop(&mut self) {
        // If the body is dropped while this suspension is outstanding (the
        // task was completed externally), release the channel slot so a late
        // callback is recognized as stale.
        if let (Some(marker), Some(task)) = (self.marker, self.task.as_ref()) {
            if let Some(core) = task.upgrade() {
                core.forget_await(marker);
            }
        }
    }
}
