//! Thread-local accessor for the currently-running task.
//!
//! The runtime is single-threaded; "currently running" means the task whose
//! future is being polled right now. The slot is swapped on every poll and on
//! every nested inline spawn, restored by an RAII guard so a panic in user
//! code cannot leave a stale task installed.

use crate::task::core::Core;
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static CURRENT: RefCell<Option<Rc<Core>>> = const { RefCell::new(None) };
}

/// The task currently executing user code, if any.
pub(crate) fn current() -> Option<Rc<Core>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Install `task` as the current task until the guard drops.
pub(crate) fn enter(task: Rc<Core>) -> EnterGuard {
    let prev = CURRENT.with(|slot| slot.borrow_mut().replace(task));
    EnterGuard { prev }
}

pub(crate) struct EnterGuard {
    prev: Option<Rc<Core>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|slot| *slot.borrow_mut() = prev);
    }
}

/// Whether the current task has been asked to close.
///
/// Reads the closing flag of the task this call runs inside; `false` when
/// called outside any task. Long synchronous sections can poll this to bail
/// out early instead of waiting for the next suspension to raise `closed`.
pub fn is_closing() -> bool {
    current().map(|core| core.is_closing()).unwrap_or(false)
}
