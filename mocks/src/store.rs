//! In-memory double for [`orchestrator_core::store::Store`].
//!
//! Mirrors `orchestrator_database::SqliteStore`'s contract exactly —
//! cycle checks before inserting an edge, cascading unblock on
//! completion, optimistic-version conflicts on `update` — but keeps
//! everything in a `Mutex`-guarded set of maps so tests that only
//! need `engine`/`core` behavior don't have to pull in SQLite.
//!
//! Also carries error-injection and call-history conveniences, keyed
//! by a single queue per operation name rather than per-method slots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use orchestrator_core::{
    error::EngineError,
    models::{
        AgentId, ContextEntry, ContextKind, Dependency, NewTask, Notification, NotificationKind,
        Participant, PrivateNote, Task, TaskFilter, TaskId, TaskStatus, UpdateTask,
    },
    resolver::Resolver,
    store::{Store, StoreStats},
    validation::Validator,
    Result,
};

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Task>,
    /// `task_id -> [depends_on]`, kept alongside `tasks` so the pure
    /// `Resolver` algorithms can run against a plain edge map.
    edges: HashMap<TaskId, Vec<TaskId>>,
    participants: HashMap<TaskId, Vec<Participant>>,
    context: HashMap<TaskId, Vec<ContextEntry>>,
    notes: HashMap<(TaskId, AgentId), Vec<PrivateNote>>,
    notifications: Vec<Notification>,
}

/// In-memory `Store` double. Thread-safe, cheap to clone (behind
/// `Arc` if a caller needs to share one across tasks), and exercises
/// exactly the same invariants the SQLite store enforces.
pub struct InMemoryStore {
    state: Mutex<State>,
    next_seq: AtomicI64,
    call_history: Mutex<Vec<String>>,
    error_injection: Mutex<HashMap<String, EngineError>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_seq: AtomicI64::new(1),
            call_history: Mutex::new(Vec::new()),
            error_injection: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the store with tasks already created elsewhere (e.g. a
    /// fixture), assigning each a fresh insertion sequence.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            for task in tasks {
                state.edges.entry(task.id.clone()).or_default();
                state.tasks.insert(task.id.clone(), task);
            }
        }
        store
    }

    /// Make the named operation fail with `error` the next time it is
    /// called, then resume normal behavior.
    pub fn inject_error(&self, operation: &str, error: EngineError) {
        self.error_injection.lock().insert(operation.to_string(), error);
    }

    pub fn clear_errors(&self) {
        self.error_injection.lock().clear();
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    fn record(&self, call: &str) {
        self.call_history.lock().push(call.to_string());
    }

    fn maybe_fail(&self, operation: &str) -> Result<()> {
        match self.error_injection.lock().remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_sequence(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn generate_task_id(state: &State) -> TaskId {
        loop {
            let candidate = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
            if !state.tasks.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn reverse_edges(state: &State) -> HashMap<TaskId, Vec<TaskId>> {
        let mut reverse: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for (task_id, deps) in &state.edges {
            for dep in deps {
                reverse.entry(dep.clone()).or_default().push(task_id.clone());
            }
        }
        reverse
    }

    fn incomplete_deps(state: &State, task_id: &TaskId) -> Vec<TaskId> {
        state
            .edges
            .get(task_id)
            .into_iter()
            .flatten()
            .filter(|dep| {
                state
                    .tasks
                    .get(*dep)
                    .map(|t| t.status != TaskStatus::Completed)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn touch(task: &mut Task) {
        task.version += 1;
        task.updated_at = Utc::now();
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create(&self, task: NewTask, created_by: &AgentId) -> Result<Task> {
        self.record("create");
        self.maybe_fail("create")?;
        Validator::validate_new_task(&task)?;
        Validator::validate_agent_id(created_by)?;

        let mut state = self.state.lock();

        for dep in &task.depends_on {
            if !state.tasks.contains_key(dep) {
                return Err(EngineError::not_found("task", dep.clone()));
            }
        }

        let id = Self::generate_task_id(&state);
        let now = Utc::now();
        let incomplete = task
            .depends_on
            .iter()
            .any(|d| state.tasks.get(d).map(|t| t.status != TaskStatus::Completed).unwrap_or(false));

        let created = Task {
            id: id.clone(),
            title: task.title,
            description: task.description,
            status: if incomplete { TaskStatus::Blocked } else { TaskStatus::Pending },
            priority: task.priority,
            assignee: task.assignee,
            created_by: created_by.clone(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            success_criteria: task.success_criteria,
            deadline: task.deadline,
            estimated_hours: task.estimated_hours,
            actual_hours: None,
            feedback_quality: None,
            feedback_timeliness: None,
            feedback_notes: None,
            completion_summary: None,
            tags: task.tags,
            version: 1,
            sequence: self.next_sequence(),
        };

        state.edges.insert(id.clone(), task.depends_on.clone());
        state.tasks.insert(id.clone(), created.clone());

        Ok(created)
    }

    async fn get(&self, id: &TaskId) -> Result<Task> {
        self.record("get");
        self.maybe_fail("get")?;
        self.state
            .lock()
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("task", id.clone()))
    }

    async fn update(&self, id: &TaskId, update: UpdateTask) -> Result<Task> {
        self.record("update");
        self.maybe_fail("update")?;

        if let Some(title) = &update.title {
            Validator::validate_title(title)?;
        }
        if let Some(description) = &update.description {
            Validator::validate_description(description)?;
        }
        if let Some(Some(assignee)) = &update.assignee {
            Validator::validate_agent_id(assignee)?;
        }
        if let Some(tags) = &update.tags {
            for tag in tags {
                Validator::validate_tag(tag)?;
            }
        }
        if let Some(Some(hours)) = update.estimated_hours {
            Validator::validate_hours("estimated_hours", hours)?;
        }
        if let Some(Some(hours)) = update.actual_hours {
            Validator::validate_hours("actual_hours", hours)?;
        }
        if let Some(Some(score)) = update.feedback_quality {
            Validator::validate_feedback_score("feedback_quality", score)?;
        }
        if let Some(Some(score)) = update.feedback_timeliness {
            Validator::validate_feedback_score("feedback_timeliness", score)?;
        }

        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("task", id.clone()))?;

        if let Some(expected) = update.expected_version {
            if expected != task.version {
                return Err(EngineError::conflict("task", id.clone(), expected, task.version));
            }
        }

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(assignee) = update.assignee {
            task.assignee = assignee;
        }
        if let Some(criteria) = update.success_criteria {
            task.success_criteria = criteria;
        }
        if let Some(deadline) = update.deadline {
            task.deadline = deadline;
        }
        if let Some(estimated_hours) = update.estimated_hours {
            task.estimated_hours = estimated_hours;
        }
        if let Some(actual_hours) = update.actual_hours {
            task.actual_hours = actual_hours;
        }
        if let Some(quality) = update.feedback_quality {
            task.feedback_quality = quality;
        }
        if let Some(timeliness) = update.feedback_timeliness {
            task.feedback_timeliness = timeliness;
        }
        if let Some(notes) = update.feedback_notes {
            task.feedback_notes = notes;
        }
        if let Some(tags) = update.tags {
            task.tags = tags;
        }

        Self::touch(task);
        Ok(task.clone())
    }

    async fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task> {
        self.record("set_status");
        self.maybe_fail("set_status")?;

        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("task", id.clone()))?;
        Validator::validate_status_transition(task.status, status)?;

        task.status = status;
        task.completed_at = if status == TaskStatus::Completed { Some(Utc::now()) } else { None };
        Self::touch(task);
        Ok(task.clone())
    }

    async fn delete(&self, id: &TaskId) -> Result<()> {
        self.record("delete");
        self.maybe_fail("delete")?;

        let mut state = self.state.lock();
        if !state.tasks.contains_key(id) {
            return Err(EngineError::not_found("task", id.clone()));
        }
        let has_dependents = state.edges.values().any(|deps| deps.contains(id));
        if has_dependents {
            return Err(EngineError::HasDependents(id.clone()));
        }

        state.tasks.remove(id);
        state.edges.remove(id);
        state.participants.remove(id);
        state.context.remove(id);
        state.notes.retain(|(task_id, _), _| task_id != id);
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.record("list");
        self.maybe_fail("list")?;

        let state = self.state.lock();
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.assignee.is_none() || t.assignee == filter.assignee)
            .filter(|t| filter.priority.map_or(true, |p| t.priority == p))
            .filter(|t| filter.tag.as_ref().map_or(true, |tag| t.tags.contains(tag)))
            .filter(|t| {
                filter.has_dependencies.map_or(true, |want| {
                    let has_deps = state.edges.get(&t.id).map_or(false, |d| !d.is_empty());
                    want == has_deps
                })
            })
            .filter(|t| filter.is_blocked.map_or(true, |want| want == (t.status == TaskStatus::Blocked)))
            .cloned()
            .collect();

        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.sequence.cmp(&b.sequence))
        });

        let limit = filter.limit.unwrap_or(100) as usize;
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn add_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<()> {
        self.record("add_dependency");
        self.maybe_fail("add_dependency")?;

        let mut state = self.state.lock();
        if !state.tasks.contains_key(task_id) {
            return Err(EngineError::not_found("task", task_id.clone()));
        }
        if !state.tasks.contains_key(depends_on) {
            return Err(EngineError::not_found("task", depends_on.clone()));
        }

        Resolver::check_edge(&state.edges, task_id, depends_on)?;

        state.edges.entry(task_id.clone()).or_default().push(depends_on.clone());

        let still_incomplete = !Self::incomplete_deps(&state, task_id).is_empty();
        if still_incomplete {
            if let Some(task) = state.tasks.get_mut(task_id) {
                if task.status != TaskStatus::Completed && task.status != TaskStatus::Cancelled {
                    task.status = TaskStatus::Blocked;
                    Self::touch(task);
                }
            }
        }

        Ok(())
    }

    async fn remove_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<()> {
        self.record("remove_dependency");
        self.maybe_fail("remove_dependency")?;

        let mut state = self.state.lock();
        if let Some(deps) = state.edges.get_mut(task_id) {
            deps.retain(|d| d != depends_on);
        }

        let now_unblocked = Self::incomplete_deps(&state, task_id).is_empty();
        if now_unblocked {
            if let Some(task) = state.tasks.get_mut(task_id) {
                if task.status == TaskStatus::Blocked {
                    task.status = TaskStatus::Pending;
                    Self::touch(task);
                }
            }
        }

        Ok(())
    }

    async fn list_dependencies(&self, task_id: &TaskId) -> Result<Vec<Dependency>> {
        self.record("list_dependencies");
        self.maybe_fail("list_dependencies")?;

        let state = self.state.lock();
        let mut deps: Vec<Dependency> = state
            .edges
            .get(task_id)
            .into_iter()
            .flatten()
            .map(|d| Dependency { task_id: task_id.clone(), depends_on: d.clone() })
            .collect();

        for (other, others_deps) in &state.edges {
            if other == task_id {
                continue;
            }
            if others_deps.contains(task_id) {
                deps.push(Dependency { task_id: other.clone(), depends_on: task_id.clone() });
            }
        }

        Ok(deps)
    }

    async fn complete(&self, id: &TaskId, summary: Option<String>) -> Result<(Task, Vec<TaskId>)> {
        self.record("complete");
        self.maybe_fail("complete")?;

        let mut state = self.state.lock();
        {
            let task = state
                .tasks
                .get(id)
                .ok_or_else(|| EngineError::not_found("task", id.clone()))?;
            if task.status == TaskStatus::Completed {
                return Err(EngineError::conflict("task", id.clone(), task.version, task.version));
            }
            Validator::validate_status_transition(task.status, TaskStatus::Completed)?;
        }

        let reverse = Self::reverse_edges(&state);
        let mut remaining_before: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        if let Some(dependents) = reverse.get(id) {
            for dependent in dependents {
                remaining_before.insert(dependent.clone(), Self::incomplete_deps(&state, dependent));
            }
        }

        {
            let task = state.tasks.get_mut(id).expect("checked above");
            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            task.completion_summary = summary;
            Self::touch(task);
        }

        let mut unblocked = Resolver::cascading_unblock(id, &reverse, &remaining_before);
        unblocked.sort_by_key(|dependent| {
            state.tasks.get(dependent).map(|t| (t.created_at, t.id.clone()))
        });

        for dependent in &unblocked {
            if let Some(task) = state.tasks.get_mut(dependent) {
                if task.status == TaskStatus::Blocked {
                    task.status = TaskStatus::Pending;
                    Self::touch(task);
                }
            }
        }

        let completed = state.tasks.get(id).expect("checked above").clone();
        Ok((completed, unblocked))
    }

    async fn add_participant(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Participant> {
        self.record("add_participant");
        self.maybe_fail("add_participant")?;

        let mut state = self.state.lock();
        if !state.tasks.contains_key(task_id) {
            return Err(EngineError::not_found("task", task_id.clone()));
        }

        let participants = state.participants.entry(task_id.clone()).or_default();
        if let Some(existing) = participants.iter().find(|p| &p.agent_id == agent_id) {
            return Ok(existing.clone());
        }

        let participant = Participant { task_id: task_id.clone(), agent_id: agent_id.clone(), joined_at: Utc::now() };
        participants.push(participant.clone());
        Ok(participant)
    }

    async fn list_participants(&self, task_id: &TaskId) -> Result<Vec<Participant>> {
        self.record("list_participants");
        self.maybe_fail("list_participants")?;
        Ok(self.state.lock().participants.get(task_id).cloned().unwrap_or_default())
    }

    async fn add_context(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        kind: ContextKind,
        text: String,
    ) -> Result<ContextEntry> {
        self.record("add_context");
        self.maybe_fail("add_context")?;

        let mut state = self.state.lock();
        if !state.tasks.contains_key(task_id) {
            return Err(EngineError::not_found("task", task_id.clone()));
        }

        let entry = ContextEntry {
            task_id: task_id.clone(),
            agent_id: agent_id.clone(),
            kind,
            text,
            created_at: Utc::now(),
            sequence: self.next_sequence(),
        };
        state.context.entry(task_id.clone()).or_default().push(entry.clone());
        Ok(entry)
    }

    async fn list_context(&self, task_id: &TaskId) -> Result<Vec<ContextEntry>> {
        self.record("list_context");
        self.maybe_fail("list_context")?;
        let mut entries = self.state.lock().context.get(task_id).cloned().unwrap_or_default();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    async fn add_note(&self, task_id: &TaskId, agent_id: &AgentId, text: String) -> Result<PrivateNote> {
        self.record("add_note");
        self.maybe_fail("add_note")?;

        let mut state = self.state.lock();
        if !state.tasks.contains_key(task_id) {
            return Err(EngineError::not_found("task", task_id.clone()));
        }

        let note = PrivateNote { task_id: task_id.clone(), agent_id: agent_id.clone(), text, created_at: Utc::now() };
        state.notes.entry((task_id.clone(), agent_id.clone())).or_default().push(note.clone());
        Ok(note)
    }

    async fn list_notes(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Vec<PrivateNote>> {
        self.record("list_notes");
        self.maybe_fail("list_notes")?;
        Ok(self
            .state
            .lock()
            .notes
            .get(&(task_id.clone(), agent_id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn notify(
        &self,
        task_id: Option<&TaskId>,
        kind: NotificationKind,
        target_agent: Option<&AgentId>,
        payload: String,
    ) -> Result<Notification> {
        self.record("notify");
        self.maybe_fail("notify")?;

        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.cloned(),
            kind,
            target_agent: target_agent.cloned(),
            payload,
            created_at: Utc::now(),
            acknowledged: false,
        };
        self.state.lock().notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self, agent_id: Option<&AgentId>) -> Result<Vec<Notification>> {
        self.record("list_notifications");
        self.maybe_fail("list_notifications")?;

        let state = self.state.lock();
        let mut results: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| !n.acknowledged)
            .filter(|n| match (agent_id, &n.target_agent) {
                (Some(agent), Some(target)) => agent == target,
                (Some(_), None) => true,
                (None, _) => true,
            })
            .cloned()
            .collect();
        results.sort_by_key(|n| n.created_at);
        Ok(results)
    }

    async fn acknowledge_notification(&self, id: &str) -> Result<()> {
        self.record("acknowledge_notification");
        self.maybe_fail("acknowledge_notification")?;

        let mut state = self.state.lock();
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| EngineError::not_found("notification", id.to_string()))?;
        notification.acknowledged = true;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.record("stats");
        self.maybe_fail("stats")?;

        let state = self.state.lock();
        let mut stats = StoreStats { total: state.tasks.len() as u64, ..Default::default() };
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Blocked => stats.blocked += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn migrate(&self) -> Result<()> {
        self.record("migrate");
        self.maybe_fail("migrate")
    }

    async fn health_check(&self) -> Result<()> {
        self.record("health_check");
        self.maybe_fail("health_check")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::models::Priority;

    fn new_task(title: &str) -> NewTask {
        NewTask { title: title.to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = InMemoryStore::new();
        let created = store.create(new_task("Design"), &"alice".to_string()).await.unwrap();
        let fetched = store.get(&created.id).await.unwrap();
        assert_eq!(fetched.title, "Design");
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn dependency_chain_blocks_and_cascades_unblock() {
        let store = InMemoryStore::new();
        let d1 = store.create(new_task("Design"), &"alice".to_string()).await.unwrap();
        let mut dependent = new_task("Build");
        dependent.depends_on.push(d1.id.clone());
        let b1 = store.create(dependent, &"alice".to_string()).await.unwrap();
        assert_eq!(b1.status, TaskStatus::Blocked);

        store.set_status(&d1.id, TaskStatus::InProgress).await.unwrap();
        let (_, unblocked) = store.complete(&d1.id, None).await.unwrap();
        assert_eq!(unblocked, vec![b1.id.clone()]);

        let refreshed = store.get(&b1.id).await.unwrap();
        assert_eq!(refreshed.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn cyclical_dependency_is_rejected() {
        let store = InMemoryStore::new();
        let a = store.create(new_task("A"), &"alice".to_string()).await.unwrap();
        let mut b_stub = new_task("B");
        b_stub.depends_on.push(a.id.clone());
        let b = store.create(b_stub, &"alice".to_string()).await.unwrap();

        let result = store.add_dependency(&a.id, &b.id).await;
        assert!(matches!(result, Err(EngineError::Cycle(_))));
    }

    #[tokio::test]
    async fn delete_with_dependents_is_refused() {
        let store = InMemoryStore::new();
        let a = store.create(new_task("A"), &"alice".to_string()).await.unwrap();
        let mut b_stub = new_task("B");
        b_stub.depends_on.push(a.id.clone());
        store.create(b_stub, &"alice".to_string()).await.unwrap();

        let result = store.delete(&a.id).await;
        assert!(matches!(result, Err(EngineError::HasDependents(_))));
    }

    #[tokio::test]
    async fn update_conflict_on_stale_version() {
        let store = InMemoryStore::new();
        let task = store.create(new_task("A"), &"alice".to_string()).await.unwrap();
        let stale_update = UpdateTask { expected_version: Some(task.version), title: Some("B".to_string()), ..Default::default() };
        store.update(&task.id, stale_update.clone()).await.unwrap();

        let result = store.update(&task.id, stale_update).await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
    }

    #[tokio::test]
    async fn completing_twice_fails_without_mutating_state() {
        let store = InMemoryStore::new();
        let task = store.create(new_task("A"), &"alice".to_string()).await.unwrap();
        store.set_status(&task.id, TaskStatus::InProgress).await.unwrap();
        store.complete(&task.id, None).await.unwrap();

        let result = store.complete(&task.id, None).await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
    }

    #[tokio::test]
    async fn private_note_is_not_visible_as_shared_context() {
        let store = InMemoryStore::new();
        let task = store.create(new_task("A"), &"alice".to_string()).await.unwrap();
        store.add_note(&task.id, &"alice".to_string(), "secret".to_string()).await.unwrap();
        store
            .add_context(&task.id, &"alice".to_string(), ContextKind::Share, "public".to_string())
            .await
            .unwrap();

        let context = store.list_context(&task.id).await.unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].text, "public");

        let bobs_notes = store.list_notes(&task.id, &"bob".to_string()).await.unwrap();
        assert!(bobs_notes.is_empty());
    }

    #[tokio::test]
    async fn list_orders_by_priority_then_created_at() {
        let store = InMemoryStore::new();
        store.create(NewTask { title: "low".to_string(), priority: Priority::Low, ..Default::default() }, &"a".to_string()).await.unwrap();
        store
            .create(NewTask { title: "critical".to_string(), priority: Priority::Critical, ..Default::default() }, &"a".to_string())
            .await
            .unwrap();

        let tasks = store.list(&TaskFilter::default()).await.unwrap();
        assert_eq!(tasks[0].title, "critical");
        assert_eq!(tasks[1].title, "low");
    }

    #[tokio::test]
    async fn injected_error_fires_once_then_clears() {
        let store = InMemoryStore::new();
        store.inject_error("create", EngineError::Busy("simulated".to_string()));

        let first = store.create(new_task("A"), &"alice".to_string()).await;
        assert!(matches!(first, Err(EngineError::Busy(_))));

        let second = store.create(new_task("A"), &"alice".to_string()).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn call_history_records_operation_names() {
        let store = InMemoryStore::new();
        store.create(new_task("A"), &"alice".to_string()).await.unwrap();
        store.stats().await.unwrap();
        assert_eq!(store.call_history(), vec!["create".to_string(), "stats".to_string()]);
    }
}
