use crate::context;
use crate::future::Join;
use crate::task::core::Core;
use crate::task::{traceback, Id, Result, ResultSlot, Status, TaskError};
use std::cell::RefCell;
use std::fmt;
use std::future::IntoFuture;
use std::panic::Location;
use std::rc::Rc;
use std::time::Duration;

/// An owned, typed reference to a task.
///
/// Cloning is cheap and every clone refers to the same task. The handle does
/// not keep the task running or detach it on drop; the parent→child tree owns
/// the task, the handle only observes and steers it.
///
/// Awaiting a handle from inside another task suspends the awaiting task
/// until this one completes:
///
/// ```no_run
/// # fn demo(rt: &lariat::Runtime) -> Result<(), lariat::TaskError> {
/// let total = rt.block_on(async {
///     let child = lariat::spawn(async { Ok(2) });
///     Ok(child.await? + 1)
/// })?;
/// assert_eq!(total, 3);
/// # Ok(())
/// # }
/// ```
pub struct TaskHandle<T> {
    pub(crate) core: Rc<Core>,
    pub(crate) slot: ResultSlot<T>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<T: 'static> TaskHandle<T> {
    pub(crate) fn new(core: Rc<Core>, slot: ResultSlot<T>) -> Self {
        Self { core, slot }
    }

    /// Unique ID of this task.
    pub fn id(&self) -> Id {
        self.core.id()
    }

    /// Debug name given at spawn time, if any.
    pub fn name(&self) -> Option<&str> {
        self.core.name()
    }

    /// Source location of the spawn call.
    pub fn spawned_at(&self) -> &'static Location<'static> {
        self.core.spawned_at()
    }

    pub fn status(&self) -> Status {
        self.core.status()
    }

    pub fn completed(&self) -> bool {
        self.core.is_completed()
    }

    pub fn is_closing(&self) -> bool {
        self.core.is_closing()
    }

    /// Request cancellation.
    ///
    /// Idempotent and synchronous at the request site; the task itself may
    /// take further steps to wind down (its current await is closed, and
    /// every subsequent resume raises `closed`). A task that already
    /// completed is left untouched.
    pub fn close(&self) {
        Core::close(&self.core, None);
    }

    /// Like [`close`](Self::close), and invokes `on_closed` once the task and
    /// all transitively closed descendants have completed — synchronously if
    /// that already holds. Each callback from repeated calls fires.
    pub fn close_with(&self, on_closed: impl FnOnce() + 'static) {
        Core::close(&self.core, Some(Box::new(on_closed)));
    }

    /// Externally assign the task a successful terminal result.
    ///
    /// The first caller to flip the completion guard wins; later calls (and a
    /// concurrent natural completion) fail with
    /// [`TaskError::AlreadyCompleting`]. The task's children are closed and
    /// drained before the result is published.
    pub fn complete(&self, value: T) -> Result<()> {
        let slot = self.slot.clone();
        Core::complete_with(&self.core, move || {
            *slot.borrow_mut() = Some(Ok(value));
        })
    }

    /// Sever the parent→child link: this task no longer participates in its
    /// former parent's error propagation, cancellation cascade, or completion
    /// sweep. Returns the handle for chaining.
    pub fn detach(&self) -> &Self {
        self.core.detach();
        self
    }

    /// Children in creation order, as erased references.
    pub fn children(&self) -> Vec<TaskRef> {
        self.core
            .children_snapshot()
            .into_iter()
            .map(|core| TaskRef { core })
            .collect()
    }

    /// Render the chain of nested awaits rooted at this task.
    pub fn traceback(&self, msg: Option<&str>) -> String {
        traceback::render(&self.core, msg)
    }

    /// Erased view of the same task, for tree walking.
    pub fn as_task_ref(&self) -> TaskRef {
        TaskRef {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + 'static> TaskHandle<T> {
    /// Drive the host loop until this task completes, then return its result.
    ///
    /// Must be called from outside any task (it pumps the host loop); inside
    /// a task, await the handle instead. Fails with [`TaskError::Stalled`] if
    /// the host goes quiescent first.
    pub fn wait(&self) -> Result<T> {
        self.wait_inner(None)
    }

    /// Like [`wait`](Self::wait) with a deadline. On expiry the task is left
    /// running and `Err(TaskError::Timeout)` is returned.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        self.wait_inner(Some(timeout))
    }

    fn wait_inner(&self, timeout: Option<Duration>) -> Result<T> {
        if context::current().is_some() {
            return Err(TaskError::WaitInTask);
        }
        let core = self.core.clone();
        let host = self.core.sched().host().clone();
        let done = host.block_until(&mut || core.is_completed(), timeout);
        if !done {
            return Err(if timeout.is_some() {
                TaskError::Timeout
            } else {
                TaskError::Stalled
            });
        }
        self.peek_result()
    }

    /// Future resolving to this task's result. Equivalent to awaiting the
    /// handle; kept for explicitness when the handle must stay usable.
    pub fn join(&self) -> Join<T> {
        Join::new(self.clone())
    }

    /// Result of a completed task. The erased terminal error (set by the
    /// propagation engine) takes precedence over the typed slot.
    pub(crate) fn peek_result(&self) -> Result<T> {
        read_result(&self.core, &self.slot)
    }
}

pub(crate) fn read_result<T: Clone>(
    core: &Core,
    slot: &RefCell<Option<Result<T>>>,
) -> Result<T> {
    debug_assert!(core.is_completed());
    if let Some(err) = core.terminal_err() {
        return Err(err);
    }
    match &*slot.borrow() {
        Some(Ok(value)) => Ok(value.clone()),
        Some(Err(err)) => Err(err.clone()),
        None => missing_result(),
    }
}

#[cold]
fn missing_result<T>() -> T {
    panic!("completed task published no result")
}

impl<T: Clone + 'static> IntoFuture for TaskHandle<T> {
    type Output = Result<T>;
    type IntoFuture = Join<T>;

    fn into_future(self) -> Join<T> {
        Join::new(self)
    }
}

impl<T: Clone + 'static> IntoFuture for &TaskHandle<T> {
    type Output = Result<T>;
    type IntoFuture = Join<T>;

    fn into_future(self) -> Join<T> {
        Join::new(self.clone())
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.core.id())
            .field("status", &self.core.status())
            .finish()
    }
}

/// A type-erased task reference: identity, state, and tree topology without
/// the output type. This is what inspection and tree-dump tooling consumes.
#[derive(Clone)]
pub struct TaskRef {
    pub(crate) core: Rc<Core>,
}

impl TaskRef {
    pub fn id(&self) -> Id {
        self.core.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.core.name()
    }

    pub fn spawned_at(&self) -> &'static Location<'static> {
        self.core.spawned_at()
    }

    pub fn status(&self) -> Status {
        self.core.status()
    }

    pub fn completed(&self) -> bool {
        self.core.is_completed()
    }

    pub fn is_closing(&self) -> bool {
        self.core.is_closing()
    }

    /// Terminal error of a completed task; `None` while running or when it
    /// completed successfully.
    pub fn err(&self) -> Option<TaskError> {
        self.core.terminal_err()
    }

    pub fn close(&self) {
        Core::close(&self.core, None);
    }

    pub fn close_with(&self, on_closed: impl FnOnce() + 'static) {
        Core::close(&self.core, Some(Box::new(on_closed)));
    }

    pub fn detach(&self) -> &Self {
        self.core.detach();
        self
    }

    /// Children in creation order.
    pub fn children(&self) -> Vec<TaskRef> {
        self.core
            .children_snapshot()
            .into_iter()
            .map(|core| TaskRef { core })
            .collect()
    }

    pub fn traceback(&self, msg: Option<&str>) -> String {
        traceback::render(&self.core, msg)
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRef")
            .field("id", &self.core.id())
            .field("status", &self.core.status())
            .finish()
    }
}
