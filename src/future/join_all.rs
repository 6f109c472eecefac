use crate::context;
use crate::future::suspend::suspend;
use crate::task::{Result, TaskHandle};
use std::cell::Cell;
use std::rc::Rc;

/// Await every task in `handles`, returning their values in input order.
///
/// A single suspension covers the whole set: one completion notifier per
/// still-running task, resumed when the last one finishes. The first error in
/// input order wins and is returned raw (no extra framing); the remaining
/// tasks keep running.
pub async fn join_all<T: Clone + 'static>(handles: &[TaskHandle<T>]) -> Result<Vec<T>> {
    let owner = context::current().map(|core| core.id());
    let live: Vec<&TaskHandle<T>> = handles.iter().filter(|h| !h.completed()).collect();
    if !live.is_empty() {
        let cores: Vec<_> = live.iter().map(|h| h.core.clone()).collect();
        suspend(move |resume| {
            let remaining = Rc::new(Cell::new(cores.len()));
            for core in &cores {
                let remaining = remaining.clone();
                let resume = resume.clone();
                core.add_notifier(owner, Box::new(move || {
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        resume.resume(());
                    }
                }));
            }
            None
        })
        .await?;
    }
    handles.iter().map(|h| h.peek_result()).collect()
}
