use crate::runtime::scheduler::Scheduler;
use crate::task::core::Core;
use futures::ready;
use pin_project::pin_project;
use std::cell::RefCell;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

// Public API
mod error;
pub use self::error::{Failure, TaskError};

pub(crate) mod handle;
pub use self::handle::{TaskHandle, TaskRef};

pub mod id;
pub use self::id::{id, try_id, Id};

// Exports
pub(crate) mod core;

mod state;
pub use self::state::Status;

mod traceback;

/// Result alias for task outcomes.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Typed result slot shared between a task's body wrapper, `complete`, and
/// every handle clone.
pub(crate) type ResultSlot<T> = Rc<RefCell<Option<Result<T>>>>;

/// Constructor for a new task: wrap the typed body, build the erased core,
/// link it under `parent`, and step it once on the calling stack. The task
/// may therefore already be completed when the handle comes back.
pub(crate) fn new_task<T, F>(
    name: Option<String>,
    spawned_at: &'static Location<'static>,
    parent: Option<Rc<Core>>,
    sched: Rc<Scheduler>,
    body: F,
) -> TaskHandle<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    let slot: ResultSlot<T> = Rc::new(RefCell::new(None));
    let wrapper = TaskFuture {
        body,
        slot: slot.clone(),
    };
    let core = Core::new(name, spawned_at, parent, sched, Box::pin(wrapper));
    Scheduler::step_new(&core);
    TaskHandle::new(core, slot)
}

/// Adapter from the typed body to the erased future the core owns: the value
/// lands in the shared slot, the erased outcome drives the propagation
/// engine.
#[pin_project]
struct TaskFuture<F, T> {
    #[pin]
    body: F,
    slot: ResultSlot<T>,
}

impl<F, T> Future for TaskFuture<F, T>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.body.poll(cx)) {
            Ok(value) => {
                // The slot is single-assignment: an external `complete` that
                // raced this poll has already chosen the published value.
                let mut slot = this.slot.borrow_mut();
                if slot.is_none() {
                    *slot = Some(Ok(value));
                }
                Poll::Ready(Ok(()))
            }
            Err(err) => {
                let mut slot = this.slot.borrow_mut();
                if slot.is_none() {
                    *slot = Some(Err(err.clone()));
                }
                drop(slot);
                Poll::Ready(Err(err))
            }
        }
    }
}
