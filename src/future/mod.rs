// Public API
pub(crate) mod suspend;
pub use self::suspend::{suspend, ResumeHandle, Suspend};

mod join;
pub use self::join::Join;

mod yield_now;
pub use self::yield_now::{yield_now, YieldNow};

mod join_all;
pub use self::join_all::join_all;

mod iter;
pub use self::iter::{iter, TaskIter};
