use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ContextEntry, ContextKind, Dependency, Notification, NotificationKind, Participant,
    PrivateNote, Task, TaskFilter, TaskId, UpdateTask,
};
use crate::models::{AgentId, NewTask};

/// Aggregate counters returned by [`Store::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub blocked: u64,
    pub cancelled: u64,
}

/// The transactional task store contract.
///
/// Implementations (`database::SqliteStore`, `mocks::InMemoryStore`)
/// are responsible for enforcing every invariant this trait documents;
/// callers above the store (the engine facade) only add coordination
/// (locking), enforcement, and hooks around these calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new task, validating `depends_on` edges and rejecting
    /// the insert with [`crate::error::EngineError::Cycle`] if any edge
    /// would create one. The new task starts `Blocked` if any
    /// dependency is not yet `Completed`, otherwise `Pending`.
    async fn create(&self, task: NewTask, created_by: &AgentId) -> Result<Task>;

    /// Fetch a task by id. `NotFound` if it does not exist.
    async fn get(&self, id: &TaskId) -> Result<Task>;

    /// Apply a partial update. If `update.expected_version` is set and
    /// does not match the stored version, returns `Conflict` without
    /// applying any field. Always increments `version` on success.
    async fn update(&self, id: &TaskId, update: UpdateTask) -> Result<Task>;

    /// Explicitly set a task's status, validating the transition per
    /// [`crate::validation::Validator::validate_status_transition`].
    /// Setting `Completed` requires every success criterion to already
    /// be satisfied (checked by the caller via the criteria validator
    /// before this is invoked; the store itself does not evaluate
    /// expressions).
    async fn set_status(&self, id: &TaskId, status: crate::models::TaskStatus) -> Result<Task>;

    /// Delete a task. Fails with `HasDependents` if any other task
    /// still depends on it.
    async fn delete(&self, id: &TaskId) -> Result<()>;

    /// List tasks matching `filter`, ordered `(priority desc,
    /// created_at asc, sequence asc)`.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Add a dependency edge `task_id -> depends_on`. Fails with
    /// `Cycle` if the edge would create one, `NotFound` if either task
    /// does not exist. Re-derives `task_id`'s `Blocked` status.
    async fn add_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<()>;

    /// Remove a dependency edge. Re-derives `task_id`'s status and, if
    /// it is now unblocked, emits an `Unblocked` notification.
    async fn remove_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<()>;

    /// List the direct dependency edges for a task (both directions:
    /// what it depends on and what depends on it, per `direction`).
    async fn list_dependencies(&self, task_id: &TaskId) -> Result<Vec<Dependency>>;

    /// Mark a task `Completed`, cascading unblock checks to every task
    /// that directly depended on it. Returns the completed task plus
    /// the ids of any tasks that transitioned out of `Blocked` as a
    /// result.
    async fn complete(&self, id: &TaskId, summary: Option<String>) -> Result<(Task, Vec<TaskId>)>;

    /// Join a task's participant set.
    async fn add_participant(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Participant>;

    /// List a task's participants.
    async fn list_participants(&self, task_id: &TaskId) -> Result<Vec<Participant>>;

    /// Append a shared context entry, visible to every participant.
    async fn add_context(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        kind: ContextKind,
        text: String,
    ) -> Result<ContextEntry>;

    /// Read back a task's shared context, in insertion order.
    async fn list_context(&self, task_id: &TaskId) -> Result<Vec<ContextEntry>>;

    /// Append a private note, readable only by its author.
    async fn add_note(&self, task_id: &TaskId, agent_id: &AgentId, text: String) -> Result<PrivateNote>;

    /// Read back an agent's own private notes on a task.
    async fn list_notes(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Vec<PrivateNote>>;

    /// Record a fan-out notification.
    async fn notify(
        &self,
        task_id: Option<&TaskId>,
        kind: NotificationKind,
        target_agent: Option<&AgentId>,
        payload: String,
    ) -> Result<Notification>;

    /// List unacknowledged notifications for an agent (or every
    /// broadcast plus targeted notification if `agent_id` is `None`).
    async fn list_notifications(&self, agent_id: Option<&AgentId>) -> Result<Vec<Notification>>;

    /// Mark a notification as acknowledged so it no longer surfaces in
    /// `list_notifications`.
    async fn acknowledge_notification(&self, id: &str) -> Result<()>;

    /// Aggregate counts by status, for the `metrics` operation.
    async fn stats(&self) -> Result<StoreStats>;

    /// Run the store's schema migrations, creating the backing file if
    /// it does not yet exist.
    async fn migrate(&self) -> Result<()>;

    /// Verify the schema version matches what this build expects,
    /// without attempting to migrate. Used by `validate_enforcement`
    /// and startup health checks.
    async fn health_check(&self) -> Result<()>;
}
