//! Builder pattern implementations for easy test data construction.
//!
//! Provides fluent builders for:
//! - Task construction with sensible defaults
//! - NewTask and UpdateTask variants
//! - Filter construction for query testing

use chrono::{DateTime, Utc};
use orchestrator_core::models::{
    Criterion, NewTask, Priority, Task, TaskFilter, TaskStatus, UpdateTask,
};

/// Builder for constructing [`Task`] instances in tests.
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: "a1b2c3d4".to_string(),
                title: "Test task".to_string(),
                description: "A test task".to_string(),
                status: TaskStatus::Pending,
                priority: Priority::Medium,
                assignee: None,
                created_by: "test-agent".to_string(),
                created_at: now,
                updated_at: now,
                completed_at: None,
                success_criteria: Vec::new(),
                deadline: None,
                estimated_hours: None,
                actual_hours: None,
                feedback_quality: None,
                feedback_timeliness: None,
                feedback_notes: None,
                completion_summary: None,
                tags: Vec::new(),
                version: 1,
                sequence: 0,
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.task.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.task.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.task.description = description.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        if status == TaskStatus::Completed && self.task.completed_at.is_none() {
            self.task.completed_at = Some(Utc::now());
        }
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.task.assignee = Some(assignee.into());
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.task.created_by = created_by.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self
    }

    pub fn with_completed_at(mut self, completed_at: Option<DateTime<Utc>>) -> Self {
        self.task.completed_at = completed_at;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.task.deadline = Some(deadline);
        self
    }

    pub fn with_success_criteria(mut self, criteria: Vec<Criterion>) -> Self {
        self.task.success_criteria = criteria;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.task.tags = tags;
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.task.version = version;
        self
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.task.sequence = sequence;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for constructing [`NewTask`] instances in tests.
pub struct NewTaskBuilder {
    new_task: NewTask,
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NewTaskBuilder {
    pub fn new() -> Self {
        Self {
            new_task: NewTask { title: "New test task".to_string(), ..Default::default() },
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.new_task.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.new_task.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.new_task.priority = priority;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.new_task.assignee = Some(assignee.into());
        self
    }

    pub fn with_success_criteria(mut self, criteria: Vec<Criterion>) -> Self {
        self.new_task.success_criteria = criteria;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.new_task.tags = tags;
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.new_task.depends_on.push(task_id.into());
        self
    }

    pub fn build(self) -> NewTask {
        self.new_task
    }
}

/// Builder for constructing [`UpdateTask`] instances in tests.
pub struct UpdateTaskBuilder {
    update: UpdateTask,
}

impl Default for UpdateTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateTaskBuilder {
    pub fn new() -> Self {
        Self { update: UpdateTask::default() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.update.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.update.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.update.priority = Some(priority);
        self
    }

    pub fn clear_assignee(mut self) -> Self {
        self.update.assignee = Some(None);
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.update.assignee = Some(Some(assignee.into()));
        self
    }

    pub fn expecting_version(mut self, version: i64) -> Self {
        self.update.expected_version = Some(version);
        self
    }

    pub fn build(self) -> UpdateTask {
        self.update
    }
}

/// Builder for constructing [`TaskFilter`] instances in tests.
pub struct TaskFilterBuilder {
    filter: TaskFilter,
}

impl Default for TaskFilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFilterBuilder {
    pub fn new() -> Self {
        Self { filter: TaskFilter::default() }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.filter.status = Some(status);
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.filter.assignee = Some(assignee.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.filter.priority = Some(priority);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.filter.tag = Some(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn build(self) -> TaskFilter {
        self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_builder_defaults_are_valid() {
        let task = TaskBuilder::new().build();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.version, 1);
    }

    #[test]
    fn task_builder_sets_completed_at_on_completed_status() {
        let task = TaskBuilder::new().with_status(TaskStatus::Completed).build();
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn new_task_builder_accumulates_dependencies() {
        let task = NewTaskBuilder::new().depends_on("aaaaaaaa").depends_on("bbbbbbbb").build();
        assert_eq!(task.depends_on, vec!["aaaaaaaa".to_string(), "bbbbbbbb".to_string()]);
    }

    #[test]
    fn update_task_builder_distinguishes_clear_from_untouched() {
        let untouched = UpdateTaskBuilder::new().build();
        assert!(untouched.assignee.is_none());

        let cleared = UpdateTaskBuilder::new().clear_assignee().build();
        assert_eq!(cleared.assignee, Some(None));
    }
}
