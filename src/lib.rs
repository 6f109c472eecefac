//! A single-threaded structured-concurrency task runtime over an embeddable
//! host loop.
//!
//! Tasks form an ownership tree: a task spawned inside another is its child.
//! Errors propagate up the tree, cancellation propagates down it, and a task
//! does not publish its result until every child has completed. Suspension is
//! cooperative and explicit — a task only yields at the crate's await points
//! ([`suspend`], [`yield_now`], awaiting a [`TaskHandle`]) — and external
//! callback-style APIs integrate through [`suspend`], optionally handing the
//! runtime a [`Closable`] so cancellation reaches the resource they hold.
//!
//! The runtime owns no I/O and no threads. It asks its host for exactly two
//! things ([`HostLoop`]): defer a thunk to the next tick, and pump callbacks
//! until a condition holds. The bundled [`TickLoop`] covers standalone use;
//! embedders bridge to their own event loop.

pub mod closable;
pub use closable::{Closable, ClosableHandle};

mod context;
pub use context::is_closing;

pub mod future;
pub use future::suspend::suspend;
pub use future::{iter, join_all, yield_now, ResumeHandle};

pub mod runtime;
pub use runtime::{spawn, spawn_named, Builder, HostLoop, Runtime, TickLoop};

pub mod task;
pub use task::{Status, TaskError, TaskHandle, TaskRef};

#[cfg(test)]
pub(crate) mod test_utils;
