use std::any::Any;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

/// Error payload carried by tasks.
///
/// The runtime treats payloads as opaque except for the sentinels it
/// synthesizes itself (`Closed`, `Timeout`, the `Child`/`Iter` framing and the
/// misuse variants). User failures travel as [`TaskError::Failed`] with the
/// site that raised them, so a failure surfacing at the top of an await chain
/// still names its origin.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The task was cancelled. Delivered at every resume while the closing
    /// flag is set, and published as the terminal result of a closed task.
    #[error("closed")]
    Closed,

    /// A `wait_timeout` deadline elapsed. The task itself is untouched.
    #[error("timeout")]
    Timeout,

    /// A non-awaited child failed while this task was still active.
    #[error("child error: {0}")]
    Child(Rc<TaskError>),

    /// An item of a completion-order iteration failed.
    #[error("iter error[index:{index}]: {cause}")]
    Iter { index: usize, cause: Rc<TaskError> },

    /// A failure raised by user code, tagged with its origin site.
    #[error("{0}")]
    Failed(Rc<Failure>),

    /// A task body or await builder panicked.
    #[error("task panicked: {0}")]
    Panicked(Rc<str>),

    /// `complete` was called after the terminal result was already chosen.
    #[error("already completing or completed")]
    AlreadyCompleting,

    /// The task future returned pending without suspending through one of the
    /// runtime's await points (e.g. it awaited a foreign future).
    #[error("unexpected yield: task suspended outside the runtime's await points")]
    UnexpectedYield,

    /// A resume reply did not match the outstanding suspension.
    #[error("unexpected resume: reply does not match the outstanding suspension")]
    UnexpectedResume,

    /// An await point was polled outside any task context.
    #[error("not inside a task")]
    NotInTask,

    /// `wait` was called from inside a task; it would re-enter the host loop.
    #[error("cannot wait on a task from inside a task")]
    WaitInTask,

    /// The host loop went quiescent with the awaited condition unsatisfied.
    #[error("host loop stalled with no pending work")]
    Stalled,
}

impl TaskError {
    /// A user failure carrying the caller's location.
    #[track_caller]
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(Rc::new(Failure {
            msg: msg.into(),
            site: Location::caller(),
        }))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, TaskError::Closed)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout)
    }

    /// Convert a caught panic payload into an error.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        TaskError::Panicked(msg.into())
    }
}

// Sentinel comparisons only; user payloads compare by message.
impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        use TaskError::*;
        match (self, other) {
            (Closed, Closed) => true,
            (Timeout, Timeout) => true,
            (AlreadyCompleting, AlreadyCompleting) => true,
            (UnexpectedYield, UnexpectedYield) => true,
            (UnexpectedResume, UnexpectedResume) => true,
            (NotInTask, NotInTask) => true,
            (WaitInTask, WaitInTask) => true,
            (Stalled, Stalled) => true,
            (Child(a), Child(b)) => a == b,
            (Iter { index: ai, cause: a }, Iter { index: bi, cause: b }) => ai == bi && a == b,
            (Failed(a), Failed(b)) => a.msg == b.msg,
            (Panicked(a), Panicked(b)) => a == b,
            _ => false,
        }
    }
}

/// A user failure: message plus the site that raised it.
#[derive(Debug)]
pub struct Failure {
    msg: String,
    site: &'static Location<'static>,
}

impl Failure {
    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn site(&self) -> &'static Location<'static> {
        self.site
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.site.file(), self.site.line(), self.msg)
    }
}
