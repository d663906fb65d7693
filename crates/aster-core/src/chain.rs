//! Per-thread record of the task that ran last.
//!
//! Zero-copy chaining is only sound when the producer of an input finished
//! immediately before its consumer starts, in the same control-flow step. Each
//! completed `exec` records its task here; an orchestrator that starts a new
//! step (or hands buffers to another worker) calls [`break_chain`] so the next
//! task copies its inputs.

use std::cell::Cell;

use crate::task::TaskId;

thread_local! {
    static LAST_EXECUTED: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// Returns the task that most recently completed `exec` on this thread.
pub fn last_executed() -> Option<TaskId> {
    LAST_EXECUTED.with(Cell::get)
}

/// Forgets the last executed task on this thread.
pub fn break_chain() {
    LAST_EXECUTED.with(|c| c.set(None));
}

pub(crate) fn mark_executed(id: TaskId) {
    LAST_EXECUTED.with(|c| c.set(Some(id)));
}
