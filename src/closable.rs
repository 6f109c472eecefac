use std::rc::Rc;

/// Contract for an externally-owned resource the runtime may cancel.
///
/// A callback-style API awaited through [`suspend`](crate::suspend) can hand
/// the runtime one of these from its builder. While the task is suspended on
/// it, the handle is owned exclusively by the runtime: cancelling the task
/// closes the handle instead of leaving the external operation dangling.
///
/// Implementations must tolerate `close` being called after the operation
/// already delivered its callback (the runtime resolves that race with a
/// first-resume-wins rule, but it may still close a handle it is releasing).
pub trait Closable {
    /// Request cancellation of the underlying resource.
    ///
    /// `on_closed` fires once the resource has actually released whatever it
    /// holds; it may fire synchronously from inside `close`.
    fn close(&self, on_closed: Box<dyn FnOnce()>);

    /// Whether a close is already in flight.
    ///
    /// The runtime never re-closes a handle that reports `true`; it waits for
    /// the originally scheduled callback instead. The default is `false`,
    /// matching handles that cannot observe their own shutdown.
    fn is_closing(&self) -> bool {
        false
    }
}

/// Shared, type-erased closable as stored in a task's current-await slot.
pub type ClosableHandle = Rc<dyn Closable>;
