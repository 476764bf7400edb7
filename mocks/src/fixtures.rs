//! Standard test fixtures for consistent testing.
//!
//! Provides pre-built test data including:
//! - Standard tasks in various states
//! - Edge case scenarios (title length boundaries, long dependency chains)
//! - Bulk task generators

use chrono::Utc;
use orchestrator_core::models::{NewTask, Task, TaskStatus, UpdateTask};

use crate::builders::TaskBuilder;

/// A basic task with sensible defaults.
pub fn create_test_task() -> Task {
    TaskBuilder::new().build()
}

/// A task in a specific status.
pub fn create_test_task_with_status(status: TaskStatus) -> Task {
    TaskBuilder::new().with_status(status).build()
}

/// A task assigned to the given agent.
pub fn create_test_task_with_assignee(assignee: &str) -> Task {
    TaskBuilder::new().with_assignee(assignee).build()
}

/// `count` distinct tasks, round-robined across three agents and four
/// statuses, each with a unique id and sequence.
pub fn create_test_tasks(count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| {
            let status = match i % 4 {
                0 => TaskStatus::Pending,
                1 => TaskStatus::InProgress,
                2 => TaskStatus::Blocked,
                _ => TaskStatus::Completed,
            };
            TaskBuilder::new()
                .with_id(format!("{i:08x}"))
                .with_title(format!("Test task {i}"))
                .with_description(format!("Test task number {i} for bulk testing"))
                .with_assignee(format!("agent-{}", i % 3 + 1))
                .with_status(status)
                .with_sequence(i as i64)
                .build()
        })
        .collect()
}

/// One task in each possible status.
pub fn create_tasks_in_all_statuses() -> Vec<Task> {
    [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ]
    .into_iter()
    .enumerate()
    .map(|(i, status)| {
        TaskBuilder::new()
            .with_id(format!("{i:08x}"))
            .with_title(format!("{status} task"))
            .with_status(status)
            .with_sequence(i as i64)
            .build()
    })
    .collect()
}

/// Title-length boundary cases from the boundary-behavior table: empty
/// (invalid), exactly 1 char, exactly 500 chars, and 501 chars
/// (invalid). Callers exercise validation against each.
pub fn title_boundary_cases() -> Vec<String> {
    vec![String::new(), "a".to_string(), "a".repeat(500), "a".repeat(501)]
}

/// A linear dependency chain `tasks[0] -> tasks[1] -> ... -> tasks[n-1]`
/// (each depends on the previous), of the requested length. Useful for
/// exercising cascading unblock and critical-path computation at
/// depth 1, 2, and 100.
pub fn dependency_chain(len: usize) -> Vec<NewTask> {
    (0..len)
        .map(|i| NewTask { title: format!("Step {i}"), ..Default::default() })
        .collect()
}

/// A standard `NewTask` for testing creation.
pub fn create_new_task() -> NewTask {
    NewTask { title: "New test task".to_string(), description: "A new task for testing creation".to_string(), ..Default::default() }
}

/// `NewTask` with a specific title.
pub fn create_new_task_with_title(title: &str) -> NewTask {
    NewTask { title: title.to_string(), ..create_new_task() }
}

/// A standard `UpdateTask` touching title and description only.
pub fn create_update_task() -> UpdateTask {
    UpdateTask {
        title: Some("Updated title".to_string()),
        description: Some("Updated description".to_string()),
        ..Default::default()
    }
}

/// `UpdateTask` that only changes the title.
pub fn create_update_task_with_title(title: &str) -> UpdateTask {
    UpdateTask { title: Some(title.to_string()), ..Default::default() }
}

/// A task whose deadline has already passed, for overdue-detection
/// tests.
pub fn overdue_task() -> Task {
    TaskBuilder::new().with_deadline(Utc::now() - chrono::Duration::days(1)).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_tasks_are_distinct() {
        let tasks = create_test_tasks(10);
        let ids: std::collections::HashSet<_> = tasks.iter().map(|t| &t.id).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn all_statuses_are_represented() {
        let tasks = create_tasks_in_all_statuses();
        assert_eq!(tasks.len(), 5);
    }

    #[test]
    fn title_boundary_cases_cover_the_500_char_limit() {
        let cases = title_boundary_cases();
        assert_eq!(cases[1].len(), 1);
        assert_eq!(cases[2].len(), 500);
        assert_eq!(cases[3].len(), 501);
    }

    #[test]
    fn dependency_chain_has_requested_length() {
        assert_eq!(dependency_chain(100).len(), 100);
    }

    #[test]
    fn overdue_task_has_a_past_deadline() {
        let task = overdue_task();
        assert!(task.deadline.unwrap() < Utc::now());
    }
}
