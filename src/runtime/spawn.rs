use crate::context;
use crate::task::{new_task, Result, TaskHandle};
use std::future::Future;
use std::panic::Location;

/// Spawn a child of the currently running task.
///
/// The child is linked into the current task's children list: its errors
/// propagate to the parent, the parent's cancellation cascades into it, and
/// the parent does not publish its own result until the child has completed.
/// The child runs immediately on the calling stack up to its first
/// suspension.
///
/// # Panics
///
/// Panics if called from outside a task; use [`Runtime::spawn`] there.
///
/// [`Runtime::spawn`]: crate::Runtime::spawn
#[track_caller]
pub fn spawn<T, F>(body: F) -> TaskHandle<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    spawn_inner(None, Location::caller(), body)
}

/// Like [`spawn`] with a debug name for tracebacks and tree dumps.
#[track_caller]
pub fn spawn_named<T, F>(name: impl Into<String>, body: F) -> TaskHandle<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    spawn_inner(Some(name.into()), Location::caller(), body)
}

fn spawn_inner<T, F>(
    name: Option<String>,
    spawned_at: &'static Location<'static>,
    body: F,
) -> TaskHandle<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    let parent = context::current()
        .expect("spawn called outside a task; use Runtime::spawn for root tasks");
    let sched = parent.sched().clone();
    new_task(name, spawned_at, Some(parent), sched, body)
}
