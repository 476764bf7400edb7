//! Custom assertion helpers for testing.
//!
//! Provides specialized assertions for:
//! - Task equality with clear error messages
//! - Status transition validation
//! - Collection-based assertions

use orchestrator_core::models::{Task, TaskStatus};
use orchestrator_core::validation::Validator;

/// Assert tasks are equal ignoring timestamps and version.
pub fn assert_task_equals(actual: &Task, expected: &Task) {
    assert_eq!(actual.id, expected.id, "task ids don't match");
    assert_eq!(actual.title, expected.title, "task titles don't match");
    assert_eq!(actual.description, expected.description, "task descriptions don't match");
    assert_eq!(actual.assignee, expected.assignee, "task assignees don't match");
    assert_eq!(actual.status, expected.status, "task statuses don't match");
}

/// Assert tasks are equal including every field.
pub fn assert_task_equals_exact(actual: &Task, expected: &Task) {
    assert_eq!(actual, expected, "tasks are not exactly equal");
}

/// Assert a task matches partial criteria.
pub fn assert_task_matches(task: &Task, matcher: &TaskMatcher) {
    if let Some(expected_id) = &matcher.id {
        assert_eq!(&task.id, expected_id, "task id doesn't match expected");
    }
    if let Some(expected_title) = &matcher.title {
        assert_eq!(&task.title, expected_title, "task title doesn't match expected");
    }
    if let Some(expected_assignee) = &matcher.assignee {
        assert_eq!(task.assignee.as_ref(), Some(expected_assignee), "task assignee doesn't match expected");
    }
    if let Some(expected_status) = matcher.status {
        assert_eq!(task.status, expected_status, "task status doesn't match expected");
    }
}

/// Assert a status transition is valid per the validator's state machine.
pub fn assert_status_transition_valid(from: TaskStatus, to: TaskStatus) {
    assert!(
        Validator::validate_status_transition(from, to).is_ok(),
        "expected transition from {from} to {to} to be valid, but it's not"
    );
}

/// Assert a status transition is invalid per the validator's state machine.
pub fn assert_status_transition_invalid(from: TaskStatus, to: TaskStatus) {
    assert!(
        Validator::validate_status_transition(from, to).is_err(),
        "expected transition from {from} to {to} to be invalid, but it's valid"
    );
}

/// Assert a task list contains a task with the given title.
pub fn assert_contains_task_with_title(tasks: &[Task], title: &str) {
    assert!(
        tasks.iter().any(|t| t.title == title),
        "expected to find task titled '{}' in task list, but it wasn't found. Available titles: {:?}",
        title,
        tasks.iter().map(|t| &t.title).collect::<Vec<_>>()
    );
}

/// Assert tasks are ordered `(priority desc, created_at asc)`, the
/// order [`orchestrator_core::store::Store::list`] guarantees.
pub fn assert_tasks_sorted_by_priority_then_created_at(tasks: &[Task]) {
    for window in tasks.windows(2) {
        let ordered = window[0].priority > window[1].priority
            || (window[0].priority == window[1].priority && window[0].created_at <= window[1].created_at);
        assert!(
            ordered,
            "tasks are not sorted by (priority desc, created_at asc): '{}' ({:?}, {}) comes before '{}' ({:?}, {})",
            window[0].title,
            window[0].priority,
            window[0].created_at,
            window[1].title,
            window[1].priority,
            window[1].created_at
        );
    }
}

/// Flexible task matcher for partial assertions.
#[derive(Debug, Default)]
pub struct TaskMatcher {
    pub id: Option<String>,
    pub title: Option<String>,
    pub assignee: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_in_progress_is_valid() {
        assert_status_transition_valid(TaskStatus::Pending, TaskStatus::InProgress);
    }

    #[test]
    fn completed_to_in_progress_is_invalid() {
        assert_status_transition_invalid(TaskStatus::Completed, TaskStatus::InProgress);
    }
}
