//! Task Sequencer: the per-participant phase log.
//!
//! The log only grows. The one in-place edit is marking the currently open
//! phase as completed, which turns `"align"` into `"align completed"`.

use shared_types::StudyRecord;

pub const COMPLETED_SUFFIX: &str = " completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTransition {
    /// Same phase-start signal delivered again.
    Duplicate,
    /// The open phase was closed.
    Completed,
    /// A new phase was opened.
    Appended,
}

/// Apply one signal to a phase log.
///
/// A completion signal for anything but the last entry cannot be told apart
/// from a new phase named `"<x> completed"` and is appended as such.
pub fn advance(log: &mut Vec<String>, task: &str) -> TaskTransition {
    if let Some(last) = log.last_mut() {
        if last.as_str() == task {
            return TaskTransition::Duplicate;
        }
        if is_completion_of(last, task) {
            last.push_str(COMPLETED_SUFFIX);
            return TaskTransition::Completed;
        }
    }
    log.push(task.to_string());
    TaskTransition::Appended
}

fn is_completion_of(open: &str, task: &str) -> bool {
    task.strip_suffix(COMPLETED_SUFFIX) == Some(open)
}

/// Record mutation used inside the task transaction.
pub fn record_task(record: &mut StudyRecord, participant: &str, task: &str) -> TaskTransition {
    let log = record.tasks.entry(participant.to_string()).or_default();
    advance(log, task)
}
