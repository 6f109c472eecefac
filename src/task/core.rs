//! The type-erased task core: tree links, yield channel, notifier list and
//! the propagation engine (errors up, cancellation down, completion waits for
//! children).
//!
//! A task's typed output does not live here; it travels through the slot
//! shared with [`TaskHandle`](crate::task::TaskHandle). The core only records
//! the erased terminal error, which takes precedence over the slot when a
//! handle reads the result.

use crate::closable::ClosableHandle;
use crate::context;
use crate::future::suspend::{Deposit, RawResume};
use crate::runtime::scheduler::Scheduler;
use crate::task::state::{Flags, Status};
use crate::task::{Id, TaskError};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::rc::{Rc, Weak};

/// What a suspended task is blocked on.
#[derive(Clone)]
pub(crate) enum CurrentAwait {
    /// Awaiting another task by identity.
    Child(Rc<Core>),
    /// A closable handle returned by a suspension builder.
    Handle(ClosableHandle),
    /// A suspension with nothing to cancel (bare callback or host tick).
    Bare,
}

pub(crate) type BodyFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>>>>;

/// Decision taken before a fresh suspension registers.
pub(crate) enum SuspendGate {
    Proceed,
    /// Terminal result already chosen; park until the step loop seals.
    Defer,
    /// Raise into the body instead of suspending.
    Fail(TaskError),
}

/// Yield channel between the task's future and the step loop.
#[derive(Default)]
pub(crate) struct Channel {
    deposit: Option<Deposit>,
    /// Two suspension requests in one poll (e.g. a select-style combinator
    /// over runtime futures). Not a supported shape; fails the task.
    double_deposit: bool,
    expected: Option<u64>,
    reply: Option<(u64, Result<(), TaskError>)>,
}

struct Notifier {
    key: u64,
    /// Task the registration acts for, when one did the registering.
    /// Completion uses this to tell whether the structural parent is
    /// watching this task, as opposed to some unrelated observer.
    owner: Option<Id>,
    f: Box<dyn FnOnce()>,
}

pub(crate) struct Core {
    id: Id,
    name: Option<String>,
    spawned_at: &'static Location<'static>,
    flags: Cell<Flags>,
    /// Seal ran: coroutine retired, drain started.
    drained: Cell<bool>,
    /// Children still to complete before this task may publish.
    pending_children: Cell<usize>,
    parent: RefCell<Weak<Core>>,
    children: RefCell<SmallVec<[Rc<Core>; 4]>>,
    coroutine: RefCell<Option<BodyFuture>>,
    current_await: RefCell<Option<CurrentAwait>>,
    awaiting_at: Cell<Option<&'static Location<'static>>>,
    channel: RefCell<Channel>,
    notifiers: RefCell<Vec<Notifier>>,
    next_notifier_key: Cell<u64>,
    /// Errors from non-awaited children, awaiting delivery in arrival order.
    pending_child_errors: RefCell<VecDeque<TaskError>>,
    /// Erased terminal error; `None` after completion means Ok.
    terminal: RefCell<Option<TaskError>>,
    sched: Rc<Scheduler>,
}

impl Core {
    pub(crate) fn new(
        name: Option<String>,
        spawned_at: &'static Location<'static>,
        parent: Option<Rc<Core>>,
        sched: Rc<Scheduler>,
        body: BodyFuture,
    ) -> Rc<Core> {
        let core = Rc::new(Core {
            id: Id::next(),
            name,
            spawned_at,
            flags: Cell::new(Flags::empty()),
            drained: Cell::new(false),
            pending_children: Cell::new(0),
            parent: RefCell::new(parent.as_ref().map(Rc::downgrade).unwrap_or_default()),
            children: RefCell::new(SmallVec::new()),
            coroutine: RefCell::new(Some(body)),
            current_await: RefCell::new(None),
            awaiting_at: Cell::new(None),
            channel: RefCell::new(Channel::default()),
            notifiers: RefCell::new(Vec::new()),
            next_notifier_key: Cell::new(1),
            pending_child_errors: RefCell::new(VecDeque::new()),
            terminal: RefCell::new(None),
            sched,
        });
        if let Some(parent) = parent {
            parent.children.borrow_mut().push(core.clone());
            // Closing is monotone across the tree: a child born under a
            // closing parent starts closing.
            if parent.is_closing() {
                core.set_flag(Flags::CLOSING);
            }
        }
        tracing::debug!(
            id = core.id.as_u64(),
            name = core.name.as_deref().unwrap_or(""),
            at = %core.spawned_at,
            "task spawned"
        );
        core
    }

    // --- identity & introspection ---

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn spawned_at(&self) -> &'static Location<'static> {
        self.spawned_at
    }

    pub(crate) fn awaiting_at(&self) -> Option<&'static Location<'static>> {
        self.awaiting_at.get()
    }

    pub(crate) fn sched(&self) -> &Rc<Scheduler> {
        &self.sched
    }

    pub(crate) fn children_snapshot(&self) -> Vec<Rc<Core>> {
        self.children.borrow().iter().cloned().collect()
    }

    pub(crate) fn awaited_child(&self) -> Option<Rc<Core>> {
        match &*self.current_await.borrow() {
            Some(CurrentAwait::Child(child)) => Some(child.clone()),
            _ => None,
        }
    }

    pub(crate) fn status(&self) -> Status {
        let flags = self.flags.get();
        if flags.contains(Flags::COMPLETED) {
            return Status::Completed;
        }
        if flags.contains(Flags::COMPLETING) {
            return Status::Active;
        }
        if let Some(current) = context::current() {
            if std::ptr::eq(Rc::as_ptr(&current), self as *const Core) {
                return Status::Running;
            }
        }
        if self.current_await.borrow().is_some() {
            return Status::Awaiting;
        }
        Status::Active
    }

    // --- flags ---

    fn set_flag(&self, flag: Flags) {
        self.flags.set(self.flags.get() | flag);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.flags.get().contains(Flags::CLOSING)
    }

    pub(crate) fn is_completing(&self) -> bool {
        self.flags.get().contains(Flags::COMPLETING)
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.flags.get().contains(Flags::COMPLETED)
    }

    pub(crate) fn is_polling(&self) -> bool {
        self.flags.get().contains(Flags::POLLING)
    }

    pub(crate) fn set_polling(&self, on: bool) {
        let mut flags = self.flags.get();
        flags.set(Flags::POLLING, on);
        self.flags.set(flags);
    }

    pub(crate) fn is_stepping(&self) -> bool {
        self.flags.get().contains(Flags::STEPPING)
    }

    pub(crate) fn set_stepping(&self, on: bool) {
        let mut flags = self.flags.get();
        flags.set(Flags::STEPPING, on);
        self.flags.set(flags);
    }

    /// Terminal error, if the task completed with one. `None` on a completed
    /// task means Ok.
    pub(crate) fn terminal_err(&self) -> Option<TaskError> {
        self.terminal.borrow().clone()
    }

    // --- yield channel ---

    pub(crate) fn suspend_gate(&self) -> SuspendGate {
        if self.is_completing() {
            return SuspendGate::Defer;
        }
        if self.is_closing() {
            return SuspendGate::Fail(TaskError::Closed);
        }
        if let Some(err) = self.pending_child_errors.borrow_mut().pop_front() {
            return SuspendGate::Fail(TaskError::Child(Rc::new(err)));
        }
        SuspendGate::Proceed
    }

    pub(crate) fn push_deposit(&self, deposit: Deposit) {
        let mut ch = self.channel.borrow_mut();
        if ch.deposit.is_some() || ch.expected.is_some() {
            ch.double_deposit = true;
        } else {
            ch.deposit = Some(deposit);
        }
    }

    pub(crate) fn take_deposit(&self) -> Option<Deposit> {
        self.channel.borrow_mut().deposit.take()
    }

    pub(crate) fn take_double_deposit(&self) -> bool {
        let mut ch = self.channel.borrow_mut();
        std::mem::take(&mut ch.double_deposit)
    }

    pub(crate) fn is_expecting(&self, marker: u64) -> bool {
        self.channel.borrow().expected == Some(marker)
    }

    pub(crate) fn expected_marker(&self) -> Option<u64> {
        self.channel.borrow().expected
    }

    pub(crate) fn has_reply(&self) -> bool {
        self.channel.borrow().reply.is_some()
    }

    pub(crate) fn take_reply(&self) -> Option<(u64, Result<(), TaskError>)> {
        self.channel.borrow_mut().reply.take()
    }

    /// Install the outstanding suspension (marker + await slot).
    pub(crate) fn install_await(
        &self,
        marker: u64,
        at: &'static Location<'static>,
        current: CurrentAwait,
    ) {
        self.channel.borrow_mut().expected = Some(marker);
        *self.current_await.borrow_mut() = Some(current);
        self.awaiting_at.set(Some(at));
    }

    /// Replace the await slot, keeping the marker (builder returned a
    /// closable after the provisional install).
    pub(crate) fn set_current_await(&self, current: CurrentAwait) {
        *self.current_await.borrow_mut() = Some(current);
    }

    /// Clear the await slot, closing a closable that is not already closing.
    pub(crate) fn clear_current_await(&self) {
        let taken = self.current_await.borrow_mut().take();
        if let Some(CurrentAwait::Handle(handle)) = taken {
            if !handle.is_closing() {
                handle.close(Box::new(|| {}));
            }
        }
        self.awaiting_at.set(None);
    }

    /// Release an outstanding suspension whose future is being dropped, so a
    /// late callback is recognized as stale.
    pub(crate) fn forget_await(&self, marker: u64) {
        let mut ch = self.channel.borrow_mut();
        if ch.expected == Some(marker) {
            ch.expected = None;
            drop(ch);
            self.clear_current_await();
        }
    }

    /// Deliver a resume reply. Only the outstanding marker is honored; a
    /// success delivered to a closing task is rewritten to `closed`.
    pub(crate) fn push_reply(this: &Rc<Self>, marker: u64, mut reply: Result<(), TaskError>) {
        {
            let mut ch = this.channel.borrow_mut();
            if ch.expected != Some(marker) {
                return;
            }
            ch.expected = None;
            if this.is_closing() && reply.is_ok() {
                reply = Err(TaskError::Closed);
            }
            ch.reply = Some((marker, reply));
        }
        this.clear_current_await();
        // A reply landing while this task's own step is live on the stack is
        // consumed by that step's trampoline; re-queueing would double-poll.
        if !this.is_stepping() {
            Scheduler::enter(this.clone());
        }
    }

    // --- notifiers ---

    /// Register a completion notifier. Fires immediately (synchronously) if
    /// the task is already completed. `owner` is the task the registration
    /// acts for, if any. Returns a key for removal.
    pub(crate) fn add_notifier(&self, owner: Option<Id>, f: Box<dyn FnOnce()>) -> u64 {
        let key = self.next_notifier_key.get();
        self.next_notifier_key.set(key + 1);
        if self.is_completed() {
            f();
        } else {
            self.notifiers.borrow_mut().push(Notifier { key, owner, f });
        }
        key
    }

    pub(crate) fn remove_notifier(&self, key: u64) {
        self.notifiers.borrow_mut().retain(|n| n.key != key);
    }

    fn has_notifier_owned_by(&self, id: Id) -> bool {
        self.notifiers.borrow().iter().any(|n| n.owner == Some(id))
    }

    #[cfg(test)]
    pub(crate) fn notifier_count(&self) -> usize {
        self.notifiers.borrow().len()
    }

    // --- tree ---

    pub(crate) fn parent_core(&self) -> Option<Rc<Core>> {
        self.parent.borrow().upgrade()
    }

    /// Sever the parent→child link. This task becomes a propagation root.
    pub(crate) fn detach(&self) {
        if let Some(parent) = self.parent_core() {
            parent
                .children
                .borrow_mut()
                .retain(|c| !std::ptr::eq(Rc::as_ptr(c), self as *const Core));
        }
        *self.parent.borrow_mut() = Weak::new();
    }

    // --- cancellation ---

    /// Request cancellation. Idempotent; every supplied callback fires once
    /// the task (and all transitively closed descendants) completes, which is
    /// synchronous if it already has.
    pub(crate) fn close(this: &Rc<Self>, on_closed: Option<Box<dyn FnOnce()>>) {
        if this.is_completed() {
            if let Some(cb) = on_closed {
                cb();
            }
            return;
        }
        if let Some(cb) = on_closed {
            this.add_notifier(None, cb);
        }

        let first = !this.is_closing();
        this.set_flag(Flags::CLOSING);

        // Monotone propagation through the children list.
        for child in this.children_snapshot() {
            Core::close(&child, None);
        }

        if !first || this.is_completing() {
            return;
        }
        tracing::debug!(id = this.id.as_u64(), "task closing");

        // Interrupt the current suspension, if any.
        let current = this.current_await.borrow().clone();
        let marker = this.expected_marker();
        match (current, marker) {
            (Some(CurrentAwait::Handle(handle)), Some(m)) => {
                if !handle.is_closing() {
                    let raw = RawResume::new(this, m);
                    handle.close(Box::new(move || raw.resume_err(TaskError::Closed)));
                }
                // Already closing: the originally-scheduled callback will
                // arrive and the delivery rewrite turns it into `closed`.
            }
            (Some(CurrentAwait::Child(child)), Some(m)) => {
                // Same deferred-ack discipline as a closable: the awaited
                // task is closed, and the resume waits for its completion.
                let raw = RawResume::new(this, m);
                Core::close(
                    &child,
                    Some(Box::new(move || raw.resume_err(TaskError::Closed))),
                );
            }
            (Some(CurrentAwait::Bare), Some(m)) => {
                // Nothing to cancel: synthesize the acknowledgement.
                Core::push_reply(this, m, Err(TaskError::Closed));
            }
            _ => {
                // Not suspended: the flag raises at the next resume.
            }
        }
    }

    // --- completion ---

    /// Externally choose a successful terminal result. `fill` writes the
    /// typed slot; it runs only if this call wins the completion race.
    pub(crate) fn complete_with(
        this: &Rc<Self>,
        fill: impl FnOnce(),
    ) -> Result<(), TaskError> {
        if this
            .flags
            .get()
            .intersects(Flags::COMPLETING | Flags::COMPLETED)
        {
            return Err(TaskError::AlreadyCompleting);
        }
        fill();
        Core::begin_completing(this, None);
        Ok(())
    }

    /// Flip the edge guard and record the erased terminal. Destructive work
    /// is deferred while the task's poll frame is live on the stack.
    pub(crate) fn begin_completing(this: &Rc<Self>, terminal: Option<TaskError>) {
        if this
            .flags
            .get()
            .intersects(Flags::COMPLETING | Flags::COMPLETED)
        {
            return;
        }
        this.set_flag(Flags::COMPLETING);
        *this.terminal.borrow_mut() = terminal;
        tracing::debug!(id = this.id.as_u64(), "task completing");
        if this.is_polling() {
            return;
        }
        Core::seal_and_drain(this);
    }

    /// Retire the coroutine, pick the final terminal payload, then close and
    /// drain the remaining children before publishing.
    pub(crate) fn seal_and_drain(this: &Rc<Self>) {
        if this.drained.replace(true) {
            return;
        }
        debug_assert!(this.is_completing() && !this.is_polling());

        this.clear_current_await();
        {
            let mut ch = this.channel.borrow_mut();
            ch.deposit = None;
            ch.expected = None;
            ch.reply = None;
            ch.double_deposit = false;
        }
        *this.coroutine.borrow_mut() = None;

        // Terminal selection: a buffered child error beats a would-be Ok, and
        // a closed task that never raised publishes the closed sentinel. An
        // error the body raised itself was recorded first and stands.
        {
            let mut term = this.terminal.borrow_mut();
            if term.is_none() {
                if let Some(err) = this.pending_child_errors.borrow_mut().pop_front() {
                    *term = Some(TaskError::Child(Rc::new(err)));
                } else if this.is_closing() {
                    *term = Some(TaskError::Closed);
                }
            }
        }
        this.pending_child_errors.borrow_mut().clear();

        let live: Vec<Rc<Core>> = this
            .children_snapshot()
            .into_iter()
            .filter(|c| !c.is_completed())
            .collect();
        if live.is_empty() {
            Core::finish(this);
            return;
        }
        this.pending_children.set(live.len());
        for child in live {
            let me = Rc::downgrade(this);
            Core::close(
                &child,
                Some(Box::new(move || {
                    if let Some(me) = me.upgrade() {
                        Core::child_drained(&me);
                    }
                })),
            );
        }
    }

    fn child_drained(this: &Rc<Self>) {
        let n = this.pending_children.get();
        debug_assert!(n > 0);
        this.pending_children.set(n - 1);
        if n == 1 && !this.is_completed() {
            Core::finish(this);
        }
    }

    /// Publish: mark completed, tell the parent, fire notifiers in order.
    fn finish(this: &Rc<Self>) {
        debug_assert!(this.is_completing() && !this.is_completed());
        debug_assert!(this.children.borrow().iter().all(|c| c.is_completed()));
        this.set_flag(Flags::COMPLETED);

        let err = this.terminal_err();
        tracing::debug!(
            id = this.id.as_u64(),
            ok = err.is_none(),
            "task completed"
        );

        if let Some(parent) = this.parent_core() {
            let watched = this.has_notifier_owned_by(parent.id());
            Core::on_child_completed(&parent, this, err, watched);
        }

        // One at a time: a notifier may unregister others.
        loop {
            let next = {
                let mut notifiers = this.notifiers.borrow_mut();
                if notifiers.is_empty() {
                    None
                } else {
                    Some(notifiers.remove(0))
                }
            };
            match next {
                Some(n) => (n.f)(),
                None => break,
            }
        }
    }

    /// Child completion hook on the parent: unlink, and route a genuine
    /// error (not a `closed` we caused, not one the parent itself awaits).
    ///
    /// `watched` means the parent holds its own notifier on the child. A
    /// notifier registered by some other task does not count: that observer
    /// gets the raw error, and the parent is still owed delivery.
    fn on_child_completed(this: &Rc<Self>, child: &Core, err: Option<TaskError>, watched: bool) {
        this.children
            .borrow_mut()
            .retain(|c| !std::ptr::eq(Rc::as_ptr(c), child as *const Core));

        let Some(err) = err else { return };
        if err.is_closed() || this.is_completed() {
            return;
        }
        if this.is_completing() {
            // Drain phase: a genuine child failure replaces a pending Ok.
            let mut term = this.terminal.borrow_mut();
            if term.is_none() {
                *term = Some(TaskError::Child(Rc::new(err)));
            }
            return;
        }
        if watched {
            // The parent is awaiting this child; the error reaches it raw
            // through its own notifier and is not replayed here.
            return;
        }
        this.pending_child_errors.borrow_mut().push_back(err);
        Core::kick_pending_child_error(this);
    }

    /// Interrupt the parent's current suspension with a buffered child error.
    fn kick_pending_child_error(this: &Rc<Self>) {
        if this.is_closing() || this.is_completing() {
            return;
        }
        let Some(marker) = this.expected_marker() else {
            // Running, or a reply is already in flight: the error surfaces at
            // the next suspension gate.
            return;
        };
        let Some(err) = this.pending_child_errors.borrow_mut().pop_front() else {
            return;
        };
        Core::push_reply(this, marker, Err(TaskError::Child(Rc::new(err))));
    }

    pub(crate) fn take_coroutine_for_poll(&self) -> Option<BodyFuture> {
        self.coroutine.borrow_mut().take()
    }

    pub(crate) fn put_back_coroutine(&self, body: BodyFuture) {
        // Only restore if the task was not sealed while polling.
        if !self.is_completing() {
            *self.coroutine.borrow_mut() = Some(body);
        }
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}
