//! Multi-task traceback: walks the current-await chain downward so an error
//! surfaced at the top of a chain of nested tasks still names the frame that
//! is actually blocked.

use crate::task::core::Core;
use std::fmt::Write;
use std::rc::Rc;

pub(crate) fn render(core: &Rc<Core>, msg: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(msg) = msg {
        let _ = writeln!(out, "{msg}");
    }
    let _ = writeln!(out, "task traceback:");

    let mut cursor = Some(core.clone());
    while let Some(task) = cursor {
        let name = task
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("#{}", task.id()));
        let _ = write!(
            out,
            "  task '{}' ({}) {}",
            name,
            task.spawned_at(),
            task.status()
        );
        if let Some(at) = task.awaiting_at() {
            let _ = write!(out, ", awaiting at {at}");
        }
        let _ = writeln!(out);
        cursor = task.awaited_child();
    }
    out
}
