//! Shared helpers for the in-crate test suites.

use crate::closable::{Closable, ClosableHandle};
use crate::runtime::{Builder, Runtime, TickLoop, TimerId};
use crate::task::Result;
use crate::{suspend, yield_now, ResumeHandle};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Opt-in log output for test runs (`RUST_LOG=lariat=trace`).
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a runtime around an explicitly held [`TickLoop`], so tests can talk
/// to the host directly (timers, manual pumping).
pub(crate) fn runtime_with_host() -> (Runtime, Rc<TickLoop>) {
    init_tracing();
    let host = Rc::new(TickLoop::new());
    let runtime = Builder::new()
        .host(host.clone())
        .try_build()
        .expect("failed to build runtime");
    (runtime, host)
}

/// Cancelable timer await: the canonical closable-producing callback API.
pub(crate) fn sleep(host: &Rc<TickLoop>, delay: Duration) -> impl Future<Output = Result<()>> {
    let host = host.clone();
    suspend(move |resume: ResumeHandle<()>| {
        let id = host.schedule_after(delay, Box::new(move || resume.resume(())));
        Some(Rc::new(TimerGuard {
            host,
            id: Cell::new(Some(id)),
            closing: Cell::new(false),
        }) as ClosableHandle)
    })
}

/// Suspend forever: a bare suspension whose resume handle is dropped.
/// Only a `close` ends a task parked here.
pub(crate) async fn eternity() -> Result<()> {
    suspend(|_resume: ResumeHandle<()>| None).await?;
    Ok(())
}

/// Yield `n` times through the host loop.
pub(crate) async fn breathe(n: usize) -> Result<()> {
    for _ in 0..n {
        yield_now().await?;
    }
    Ok(())
}

struct TimerGuard {
    host: Rc<TickLoop>,
    id: Cell<Option<TimerId>>,
    closing: Cell<bool>,
}

impl Closable for TimerGuard {
    fn close(&self, on_closed: Box<dyn FnOnce()>) {
        self.closing.set(true);
        if let Some(id) = self.id.take() {
            self.host.cancel_timer(id);
        }
        on_closed();
    }

    fn is_closing(&self) -> bool {
        self.closing.get()
    }
}

/// Closable that records every `close` call; acknowledgement can be
/// synchronous or held for the test to fire manually.
pub(crate) struct SpyClosable {
    pub(crate) close_calls: Cell<usize>,
    closing: Cell<bool>,
    sync_ack: bool,
    pending_ack: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl SpyClosable {
    pub(crate) fn new(sync_ack: bool) -> Rc<Self> {
        Rc::new(Self {
            close_calls: Cell::new(0),
            closing: Cell::new(false),
            sync_ack,
            pending_ack: RefCell::new(None),
        })
    }

    /// Pretend the close was already in flight before the runtime saw it.
    pub(crate) fn mark_closing(&self) {
        self.closing.set(true);
    }

    /// Fire a deferred close acknowledgement.
    pub(crate) fn ack(&self) {
        if let Some(ack) = self.pending_ack.borrow_mut().take() {
            ack();
        }
    }
}

impl Closable for SpyClosable {
    fn close(&self, on_closed: Box<dyn FnOnce()>) {
        self.close_calls.set(self.close_calls.get() + 1);
        self.closing.set(true);
        if self.sync_ack {
            on_closed();
        } else {
            *self.pending_ack.borrow_mut() = Some(on_closed);
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.get()
    }
}
