use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Lifecycle flag set of a task core.
    ///
    /// `CLOSING` is level-triggered and monotone: once set it stays set until
    /// the task completes, and every resume delivered in the meantime carries
    /// the `closed` payload. `COMPLETING` is the edge guard that makes the
    /// terminal result single-assignment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Flags: u8 {
        /// Cancellation requested; propagates to all descendants.
        const CLOSING = 1 << 0;
        /// The terminal result has been chosen; no second assignment.
        const COMPLETING = 1 << 1;
        /// Children drained, notifiers fired. Terminal.
        const COMPLETED = 1 << 2;
        /// The task's future is being polled on this stack; destructive
        /// operations (retiring the coroutine) must be deferred.
        const POLLING = 1 << 3;
        /// The step loop is driving this task somewhere on this stack;
        /// replies delivered now are picked up in place, not re-queued.
        const STEPPING = 1 << 4;
    }
}

/// Externally observable state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Currently executing user code.
    Running,
    /// Suspended on an await point.
    Awaiting,
    /// Alive but not executing: an ancestor of the running task, a task
    /// queued for resumption, or one draining its children.
    Active,
    /// Terminal.
    Completed,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Running => "running",
            Status::Awaiting => "awaiting",
            Status::Active => "active",
            Status::Completed => "completed",
        };
        f.write_str(s)
    }
}
