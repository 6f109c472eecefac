use crate::context;
use crate::runtime::host::{HostLoop, TickLoop};
use crate::runtime::scheduler::Scheduler;
use crate::task::{new_task, TaskHandle};
use anyhow::{anyhow, Result};
use std::cell::Cell;
use std::future::Future;
use std::panic::Location;
use std::rc::Rc;

// Track whether a runtime is already active on this thread.
thread_local! {
    static IS_RUNTIME_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Configures a [`Runtime`].
///
/// ```
/// use lariat::Builder;
///
/// let rt = Builder::new().try_build().expect("build runtime");
/// let out = rt.block_on(async { Ok::<_, lariat::TaskError>(41 + 1) });
/// assert_eq!(out.unwrap(), 42);
/// ```
#[derive(Default)]
pub struct Builder {
    host: Option<Rc<dyn HostLoop>>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder { host: None }
    }

    /// Use a custom host loop instead of the bundled [`TickLoop`].
    pub fn host(mut self, host: Rc<dyn HostLoop>) -> Self {
        self.host = Some(host);
        self
    }

    /// Creates the configured `Runtime`, ready to spawn tasks.
    ///
    /// At most one runtime may be live per thread; a second `try_build`
    /// before the first runtime is dropped fails.
    pub fn try_build(self) -> Result<Runtime> {
        IS_RUNTIME_ACTIVE.with(|active| -> Result<()> {
            if active.get() {
                Err(anyhow!(
                    "cannot create a new Runtime: one is already active on this thread"
                ))
            } else {
                active.set(true);
                Ok(())
            }
        })?;

        let host = self.host.unwrap_or_else(|| Rc::new(TickLoop::new()));
        Ok(Runtime {
            sched: Scheduler::new(host),
        })
    }
}

/// The task runtime: a scheduler bound to a host loop.
///
/// Single-threaded and cooperative — at any instant at most one task is
/// executing, and control only changes hands at await points. Dropping the
/// runtime does not cancel live tasks; close the handles you care about.
pub struct Runtime {
    sched: Rc<Scheduler>,
}

impl Runtime {
    /// Spawn a task running `body`.
    ///
    /// Called from outside any task this creates a root; from inside a task
    /// it creates a child of the current task, same as [`spawn`]. The new
    /// task runs immediately on the calling stack up to its first suspension
    /// — it may already be completed when the handle comes back.
    ///
    /// [`spawn`]: crate::spawn
    #[track_caller]
    pub fn spawn<T, F>(&self, body: F) -> TaskHandle<T>
    where
        T: 'static,
        F: Future<Output = crate::task::Result<T>> + 'static,
    {
        new_task(
            None,
            Location::caller(),
            context::current(),
            self.sched.clone(),
            body,
        )
    }

    /// Like [`spawn`](Self::spawn) with a debug name, which shows up in
    /// tracebacks and tree dumps.
    #[track_caller]
    pub fn spawn_named<T, F>(&self, name: impl Into<String>, body: F) -> TaskHandle<T>
    where
        T: 'static,
        F: Future<Output = crate::task::Result<T>> + 'static,
    {
        new_task(
            Some(name.into()),
            Location::caller(),
            context::current(),
            self.sched.clone(),
            body,
        )
    }

    /// Spawn `body` and drive the host loop until it completes.
    #[track_caller]
    pub fn block_on<T, F>(&self, body: F) -> crate::task::Result<T>
    where
        T: Clone + 'static,
        F: Future<Output = crate::task::Result<T>> + 'static,
    {
        self.spawn(body).wait()
    }

    /// The host loop this runtime schedules on.
    pub fn host(&self) -> Rc<dyn HostLoop> {
        self.sched.host().clone()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        IS_RUNTIME_ACTIVE.with(|active| active.set(false));
    }
}
