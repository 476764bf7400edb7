use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task identifier: an 8-character lowercase hex string, assigned by
/// the store on insertion and never reused.
pub type TaskId = String;

/// An agent identifier: `[A-Za-z0-9_-]{1,64}`, resolved by the
/// coordination layer and threaded through every mutating call.
pub type AgentId = String;

/// Lifecycle states a [`Task`] moves through.
///
/// `Blocked` is not chosen by callers directly: it is derived by the
/// dependency resolver from the completion state of a task's
/// dependencies and re-derived whenever a dependency completes (see
/// [`crate::resolver`]).
///
/// # Examples
///
/// ```rust
/// use orchestrator_core::models::TaskStatus;
///
/// assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
/// ```
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Task priority, ordered low to critical. Lists order by
/// `(priority desc, created_at asc)`.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// One success condition attached to a task.
///
/// `measurable` is either the literal string `"true"` (requires manual
/// confirmation at completion time) or a boolean expression over the
/// fixed symbol table described in [`crate::criteria`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criterion {
    pub text: String,
    pub measurable: String,
}

/// The central work-item entity.
///
/// # Examples
///
/// ```rust
/// use orchestrator_core::models::{Task, TaskStatus, Priority};
/// use chrono::Utc;
///
/// let task = Task {
///     id: "a1b2c3d4".to_string(),
///     title: "Implement user authentication".to_string(),
///     description: "Add JWT-based auth with role-based access control".to_string(),
///     status: TaskStatus::Pending,
///     priority: Priority::High,
///     assignee: None,
///     created_by: "backend-developer".to_string(),
///     created_at: Utc::now(),
///     updated_at: Utc::now(),
///     completed_at: None,
///     success_criteria: Vec::new(),
///     deadline: None,
///     estimated_hours: Some(4.0),
///     actual_hours: None,
///     feedback_quality: None,
///     feedback_timeliness: None,
///     feedback_notes: None,
///     completion_summary: None,
///     tags: vec!["auth".to_string()],
///     version: 1,
///     sequence: 0,
/// };
/// assert_eq!(task.status, TaskStatus::Pending);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee: Option<AgentId>,
    pub created_by: AgentId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success_criteria: Vec<Criterion>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub feedback_quality: Option<i32>,
    pub feedback_timeliness: Option<i32>,
    pub feedback_notes: Option<String>,
    pub completion_summary: Option<String>,
    pub tags: Vec<String>,
    /// Optimistic-concurrency version, incremented on every mutating
    /// update. Backs the `Conflict` check.
    pub version: i64,
    /// Internal monotonic insertion sequence; never exposed for
    /// filtering, only for tie-breaking `created_at`-ordered queries.
    pub sequence: i64,
}

/// Data required to create a new task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub assignee: Option<AgentId>,
    #[serde(default)]
    pub success_criteria: Vec<Criterion>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Dependency edges `this -> depends_on`, checked for cycles before
    /// the insert commits.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
}

/// Partial update applied to an existing task.
///
/// Outer `None` means "leave untouched"; fields whose value is itself
/// an `Option` (`assignee`, `deadline`, `estimated_hours`) use a nested
/// `Option<Option<T>>` so callers can distinguish "leave alone" from
/// "clear to null".
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assignee: Option<Option<AgentId>>,
    pub success_criteria: Option<Vec<Criterion>>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub estimated_hours: Option<Option<f64>>,
    pub actual_hours: Option<Option<f64>>,
    pub feedback_quality: Option<Option<i32>>,
    pub feedback_timeliness: Option<Option<i32>>,
    pub feedback_notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    /// The version the caller last observed. If set and it no longer
    /// matches the stored version, the update fails with `Conflict`.
    pub expected_version: Option<i64>,
}

/// Filter criteria for [`crate::store::Store::list`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee: Option<AgentId>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    pub has_dependencies: Option<bool>,
    pub is_blocked: Option<bool>,
    pub limit: Option<u32>,
}

/// A directed dependency edge: `task_id` depends on `depends_on`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub task_id: TaskId,
    pub depends_on: TaskId,
}

/// An agent that has explicitly joined a task's collaboration set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub joined_at: DateTime<Utc>,
}

/// Kind of a [`Notification`].
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Unblocked,
    Completed,
    Discovery,
    Assigned,
    Conflict,
}

/// A store-persisted, fan-out notification. `target_agent == None`
/// means broadcast to every agent watching the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub task_id: Option<TaskId>,
    pub kind: NotificationKind,
    pub target_agent: Option<AgentId>,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Kind of a shared [`ContextEntry`].
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Share,
    Discover,
    Sync,
}

/// A shared-visibility context update, readable by every participant
/// of the task it is attached to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextEntry {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub kind: ContextKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub sequence: i64,
}

/// A single-reader note, visible only to the agent that wrote it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrivateNote {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A reusable task-stub definition rendered through the template
/// engine (`engine::templates`). Variables are substituted with
/// `{{var}}` handlebars syntax; `{{#if var}}...{{/if}}` blocks are
/// included only when the variable is supplied and non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSpec {
    pub name: String,
    pub title_template: String,
    pub description_template: String,
    #[serde(default)]
    pub success_criteria_templates: Vec<String>,
    #[serde(default)]
    pub default_priority: Option<Priority>,
    #[serde(default)]
    pub required_variables: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_low_to_critical() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn task_status_display() {
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(TaskStatus::Blocked.to_string(), "blocked");
    }

    #[test]
    fn default_priority_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn update_task_defaults_leave_everything_untouched() {
        let update = UpdateTask::default();
        assert!(update.title.is_none());
        assert!(update.assignee.is_none());
        assert!(update.expected_version.is_none());
    }
}
