// Public API
pub mod runtime;
pub use runtime::{Builder, Runtime};

mod host;
pub use host::{HostLoop, TickLoop, TimerId};

mod spawn;
pub use spawn::{spawn, spawn_named};

// Exports
pub(crate) mod scheduler;

#[cfg(test)]
mod tests;
