//! The [`Engine`] facade: the single entry point an embedder (a CLI, an
//! MCP server, a test harness) talks to. It wires every other module in
//! this crate around [`orchestrator_core::store::Store`]: the
//! cross-process lock, the enforcement gate, the hook pipeline, the
//! context channel files, telemetry, and the template/migrator/
//! archiver/metrics helpers.
//!
//! Every mutating operation follows the same sequence: resolve agent
//! identity, acquire the exclusive workspace lock, run the enforcement
//! gate, run matching `pre_*` hooks, mutate the store, write any
//! context channel files, run matching `post_*`/`on_*` hooks, append a
//! best-effort telemetry record. Reads take the shared lock and skip
//! the gate and hook pipeline.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use orchestrator_core::{
    criteria::{self, Context as CriteriaContext, Value as CriteriaValue},
    models::{ContextEntry, ContextKind, NewTask, PrivateNote, Task, TaskFilter, TaskId, TaskStatus, UpdateTask},
    resolver::Resolver,
    store::Store,
    AgentId, EngineError, Priority, Result, Validator,
};
use orchestrator_database::SqliteStore;

use crate::archives::Archiver;
use crate::channels::ChannelLog;
use crate::config::{EnforcementMode, EngineConfig};
use crate::enforcement::{Gate, OperationContext, ViolationReport};
use crate::hooks::{pre_hooks_block, Event as HookEventKind, HookEvent, HookPipeline, Operation as HookOp};
use crate::identity;
use crate::lock::{self, WorkspaceLock};
use crate::metrics::{self, MetricsReport, TimeWindow};
use crate::migrator::Migrator;
use crate::telemetry::{TelemetryEvent, TelemetryLog};
use crate::templates::{TemplateDocument, TemplateEngine};
use crate::workspace::Workspace;

fn workspace_error(e: anyhow::Error) -> EngineError {
    EngineError::WorkspaceError(e.to_string())
}

/// Options accepted by [`Engine::complete`].
#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    /// Evaluate every success criterion before allowing completion.
    pub validate: bool,
    /// Record `actual_hours` as part of the same mutation.
    pub actual_hours: Option<f64>,
    /// Treat every manual (`measurable == "true"`) criterion as
    /// satisfied. Ignored unless `validate` is set.
    pub confirm_manual: bool,
    pub summary: Option<String>,
    pub expected_version: Option<i64>,
}

/// One evaluated success criterion, as returned in a [`CriteriaReport`].
#[derive(Debug, Clone, Serialize)]
pub struct CriterionResult {
    pub text: String,
    pub ok: bool,
    pub detail: String,
}

/// The result of evaluating a task's success criteria at completion
/// time.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CriteriaReport {
    pub passed: u32,
    pub total: u32,
    pub per_criterion: Vec<CriterionResult>,
}

impl CriteriaReport {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// A task plus its dependency edges in both directions, for the `show`
/// operation.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: Task,
    pub depends_on: Vec<TaskId>,
    pub dependents: Vec<TaskId>,
}

/// Dependency-completion snapshot plus the project-wide critical path,
/// for the `progress` operation.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub total_dependencies: usize,
    pub completed_dependencies: usize,
    pub critical_path: Vec<TaskId>,
}

/// Ties the domain store, the coordination primitives, and the
/// ambient-stack helpers together into the one object callers use.
pub struct Engine {
    store: Arc<dyn Store>,
    workspace: Workspace,
    config: EngineConfig,
    hooks: AsyncMutex<HookPipeline>,
    telemetry: TelemetryLog,
    templates: TemplateEngine,
}

impl Engine {
    /// Open (and if necessary create) a workspace backed by
    /// `SqliteStore`, backing up any existing store file before
    /// applying migrations.
    pub async fn open(workspace: Workspace, config: EngineConfig) -> Result<Self> {
        workspace.init().map_err(workspace_error)?;

        let db_url = workspace.db_path().display().to_string();
        let busy_timeout = std::time::Duration::from_secs(config.store.busy_timeout_secs);
        let store = SqliteStore::connect(&db_url, busy_timeout).await?;

        let migrator = Migrator::new(&store, workspace.db_path(), workspace.backups_dir());
        migrator.migrate().await?;
        crate::workspace::secure_store_file(&workspace.db_path()).map_err(workspace_error)?;

        Ok(Self::with_store(workspace, config, Arc::new(store)))
    }

    /// Build an engine around an already-constructed store. Used by
    /// `open` and directly by tests wiring up `orchestrator_mocks::InMemoryStore`.
    pub fn with_store(workspace: Workspace, config: EngineConfig, store: Arc<dyn Store>) -> Self {
        let hooks_dir = resolve_hooks_dir(&workspace, &config);
        let timeout = std::time::Duration::from_secs(config.hooks.timeout_secs);
        let telemetry = TelemetryLog::new(workspace.telemetry_dir().join("events.log"));

        Self {
            store,
            workspace,
            config,
            hooks: AsyncMutex::new(HookPipeline::new(hooks_dir, timeout)),
            telemetry,
            templates: TemplateEngine::new(),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- coordination plumbing -------------------------------------

    fn acquire_exclusive(&self) -> Result<WorkspaceLock> {
        let timeout = lock::effective_timeout(self.config.lock.timeout_secs);
        WorkspaceLock::acquire_exclusive(&self.workspace.lock_path(), timeout)
    }

    fn acquire_shared(&self) -> Result<WorkspaceLock> {
        let timeout = lock::effective_timeout(self.config.lock.timeout_secs);
        WorkspaceLock::acquire_shared(&self.workspace.lock_path(), timeout)
    }

    /// Whether more than one agent appears to be active in this
    /// workspace: either a task has more than one distinct
    /// participant, or more than one distinct notification target has
    /// ever been recorded. Feeds `Gate::effective_mode`'s escalation
    /// heuristic.
    async fn multi_agent_activity_observed(&self, task_id: Option<&TaskId>) -> bool {
        if let Some(id) = task_id {
            if let Ok(participants) = self.store.list_participants(id).await {
                let distinct: HashSet<&AgentId> = participants.iter().map(|p| &p.agent_id).collect();
                if distinct.len() > 1 {
                    return true;
                }
            }
        }
        if let Ok(notifications) = self.store.list_notifications(None).await {
            let distinct: HashSet<&AgentId> = notifications.iter().filter_map(|n| n.target_agent.as_ref()).collect();
            return distinct.len() > 1;
        }
        false
    }

    async fn effective_mode(&self, task_id: Option<&TaskId>) -> EnforcementMode {
        let multi_agent = self.multi_agent_activity_observed(task_id).await;
        Gate::effective_mode(self.config.enforcement.mode, &self.workspace, multi_agent)
    }

    async fn enforce(
        &self,
        task_id: Option<&TaskId>,
        agent_id: &str,
        creates_task_or_dependency: bool,
        has_description: bool,
        has_success_criteria: bool,
        confirm: bool,
    ) -> Result<(EnforcementMode, ViolationReport)> {
        let mode = self.effective_mode(task_id).await;
        let ctx = OperationContext {
            agent_id: Some(agent_id.to_string()),
            creates_task_or_dependency,
            has_description,
            has_success_criteria,
            confirm,
        };
        let report = Gate::new(mode).enforce(&self.workspace, &ctx)?;
        Ok((mode, report))
    }

    /// Register `agent_id` as a participant of `task_id` if it is not
    /// already one. Participation is what scopes `context()` visibility:
    /// there is no standalone `join` operation, so every write an agent
    /// makes to a task — creating it, being assigned to it, or writing
    /// to one of its channels — implicitly joins them.
    async fn join(&self, task_id: &TaskId, agent_id: &AgentId) {
        let _ = self.store.add_participant(task_id, agent_id).await;
    }

    fn hook_event(&self, tool: &str, inputs: serde_json::Value, derived: serde_json::Value) -> HookEvent {
        HookEvent { tool: tool.to_string(), inputs, derived, workspace_root: self.workspace.root().to_path_buf() }
    }

    async fn run_pre(&self, op: HookOp, agent_id: &str, event: &HookEvent, strict: bool) -> Result<()> {
        let mut hooks = self.hooks.lock().await;
        let results = hooks.run_pre(op, self.workspace.root(), agent_id, event).await?;
        drop(hooks);
        if let Some((hook, reason)) = pre_hooks_block(&results, strict) {
            return Err(EngineError::hook_blocked(hook, reason));
        }
        Ok(())
    }

    async fn run_post(&self, op: HookOp, agent_id: &str, event: &HookEvent) {
        let mut hooks = self.hooks.lock().await;
        let _ = hooks.run_post(op, self.workspace.root(), agent_id, event).await;
    }

    async fn run_event(&self, kind: HookEventKind, agent_id: &str, event: &HookEvent) {
        let mut hooks = self.hooks.lock().await;
        let _ = hooks.run_event(kind, self.workspace.root(), agent_id, event).await;
    }

    fn log(&self, operation: &str, agent_id: Option<&str>, task_id: Option<&str>, started: Instant, outcome: &str) {
        self.telemetry.append(&TelemetryEvent {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            agent_id: agent_id.map(str::to_string),
            task_id: task_id.map(str::to_string),
            outcome: outcome.to_string(),
            duration_ms: Some(started.elapsed().as_millis() as u64),
        });
    }

    fn outcome_of<T>(result: &Result<T>) -> String {
        match result {
            Ok(_) => "ok".to_string(),
            Err(e) => format!("error: {e}"),
        }
    }

    // ---- lifecycle ---------------------------------------------------

    /// Create (or bring up to date) the on-disk layout and store schema.
    pub async fn init(&self) -> Result<()> {
        self.workspace.init().map_err(workspace_error)?;
        self.store.migrate().await
    }

    /// Re-run pending store migrations against an already-open engine.
    pub async fn migrate(&self) -> Result<()> {
        let started = Instant::now();
        let _lock = self.acquire_exclusive()?;
        let result = self.store.migrate().await;
        self.log("migrate", None, None, started, &Self::outcome_of(&result));
        result
    }

    // ---- task lifecycle -----------------------------------------------

    /// Create a new task. `reject_duplicate_title`, when set, checks the
    /// existing task list for a case-insensitive title collision before
    /// inserting; there is no dedicated store-level uniqueness
    /// constraint, so this is an engine-side pre-check.
    pub async fn add(
        &self,
        explicit_agent: Option<&str>,
        new_task: NewTask,
        reject_duplicate_title: bool,
        confirm: bool,
    ) -> Result<Task> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.add_inner(&agent_id, new_task, reject_duplicate_title, confirm).await;
        self.log("add", Some(&agent_id), result.as_ref().ok().map(|t| t.id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    async fn add_inner(
        &self,
        agent_id: &AgentId,
        new_task: NewTask,
        reject_duplicate_title: bool,
        confirm: bool,
    ) -> Result<Task> {
        if reject_duplicate_title {
            let existing = self.store.list(&TaskFilter { limit: Some(10_000), ..Default::default() }).await?;
            let wanted = new_task.title.trim().to_lowercase();
            if existing.iter().any(|t| t.title.trim().to_lowercase() == wanted) {
                return Err(EngineError::InvalidInput(format!("a task titled '{}' already exists", new_task.title)));
            }
        }

        let has_description = !new_task.description.trim().is_empty();
        let has_success_criteria = !new_task.success_criteria.is_empty();
        let (mode, _) = self.enforce(None, agent_id, true, has_description, has_success_criteria, confirm).await?;

        let event = self.hook_event("add", json!({ "new_task": &new_task }), json!({}));
        self.run_pre(HookOp::Add, agent_id, &event, mode == EnforcementMode::Strict).await?;

        let task = self.store.create(new_task, agent_id).await?;
        self.join(&task.id, agent_id).await;
        if let Some(assignee) = &task.assignee {
            self.join(&task.id, assignee).await;
        }

        self.run_post(HookOp::Add, agent_id, &event).await;
        Ok(task)
    }

    pub async fn update(
        &self,
        explicit_agent: Option<&str>,
        task_id: &TaskId,
        update: UpdateTask,
        confirm: bool,
    ) -> Result<Task> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.update_inner(&agent_id, task_id, update, confirm).await;
        self.log("update", Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    async fn update_inner(&self, agent_id: &AgentId, task_id: &TaskId, update: UpdateTask, confirm: bool) -> Result<Task> {
        let (mode, _) = self.enforce(Some(task_id), agent_id, false, true, true, confirm).await?;

        let event = self.hook_event("update", json!({ "task_id": task_id, "update": &update }), json!({}));
        self.run_pre(HookOp::Update, agent_id, &event, mode == EnforcementMode::Strict).await?;

        let task = self.store.update(task_id, update).await?;

        self.run_post(HookOp::Update, agent_id, &event).await;
        Ok(task)
    }

    pub async fn delete(&self, explicit_agent: Option<&str>, task_id: &TaskId, confirm: bool) -> Result<()> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.delete_inner(&agent_id, task_id, confirm).await;
        self.log("delete", Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    async fn delete_inner(&self, agent_id: &AgentId, task_id: &TaskId, confirm: bool) -> Result<()> {
        let (mode, _) = self.enforce(Some(task_id), agent_id, false, true, true, confirm).await?;

        let event = self.hook_event("delete", json!({ "task_id": task_id }), json!({}));
        self.run_pre(HookOp::Delete, agent_id, &event, mode == EnforcementMode::Strict).await?;

        self.store.delete(task_id).await?;

        self.run_post(HookOp::Delete, agent_id, &event).await;
        Ok(())
    }

    pub async fn assign(
        &self,
        explicit_agent: Option<&str>,
        task_id: &TaskId,
        assignee: Option<AgentId>,
        confirm: bool,
    ) -> Result<Task> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.assign_inner(&agent_id, task_id, assignee, confirm).await;
        self.log("assign", Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    async fn assign_inner(
        &self,
        agent_id: &AgentId,
        task_id: &TaskId,
        assignee: Option<AgentId>,
        confirm: bool,
    ) -> Result<Task> {
        let (mode, _) = self.enforce(Some(task_id), agent_id, false, true, true, confirm).await?;

        let event = self.hook_event("assign", json!({ "task_id": task_id, "assignee": &assignee }), json!({}));
        self.run_pre(HookOp::Assign, agent_id, &event, mode == EnforcementMode::Strict).await?;

        let update = UpdateTask { assignee: Some(assignee.clone()), ..Default::default() };
        let task = self.store.update(task_id, update).await?;

        if let Some(target) = &assignee {
            self.join(task_id, target).await;
            let _ = self
                .store
                .notify(
                    Some(task_id),
                    orchestrator_core::models::NotificationKind::Assigned,
                    Some(target),
                    format!("assigned to {target}: {}", task.title),
                )
                .await;
        }

        self.run_post(HookOp::Assign, agent_id, &event).await;
        Ok(task)
    }

    /// Mark a task completed, evaluating success criteria first when
    /// `opts.validate` is set, then notifying every dependent task that
    /// becomes unblocked as a result (ordered `created_at` then `id`).
    pub async fn complete(
        &self,
        explicit_agent: Option<&str>,
        task_id: &TaskId,
        opts: CompleteOptions,
        confirm: bool,
    ) -> Result<(Task, CriteriaReport, Vec<TaskId>)> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.complete_inner(&agent_id, task_id, opts, confirm).await;
        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(e) => format!("error: {e}"),
        };
        self.log("complete", Some(&agent_id), Some(task_id.as_str()), started, &outcome);
        result
    }

    async fn complete_inner(
        &self,
        agent_id: &AgentId,
        task_id: &TaskId,
        opts: CompleteOptions,
        confirm: bool,
    ) -> Result<(Task, CriteriaReport, Vec<TaskId>)> {
        let (mode, _) = self.enforce(Some(task_id), agent_id, false, true, true, confirm).await?;

        let task = self.store.get(task_id).await?;
        let report = self.evaluate_criteria(&task, &opts)?;
        if !report.all_passed() {
            return Err(EngineError::CriteriaUnmet(format!(
                "{}/{} success criteria satisfied for task {task_id}",
                report.passed, report.total
            )));
        }

        if opts.actual_hours.is_some() {
            let patch = UpdateTask {
                actual_hours: Some(opts.actual_hours),
                expected_version: opts.expected_version,
                ..Default::default()
            };
            self.store.update(task_id, patch).await?;
        }

        let event = self.hook_event("complete", json!({ "task_id": task_id, "summary": &opts.summary }), json!({}));
        self.run_pre(HookOp::Complete, agent_id, &event, mode == EnforcementMode::Strict).await?;

        let (completed, unblocked_ids) = self.store.complete(task_id, opts.summary.clone()).await?;

        let mut unblocked_tasks = Vec::with_capacity(unblocked_ids.len());
        for id in &unblocked_ids {
            if let Ok(t) = self.store.get(id).await {
                unblocked_tasks.push(t);
            }
        }
        unblocked_tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        for unblocked in &unblocked_tasks {
            let _ = self
                .store
                .notify(
                    Some(&unblocked.id),
                    orchestrator_core::models::NotificationKind::Unblocked,
                    unblocked.assignee.as_ref(),
                    format!("unblocked by completion of {task_id}"),
                )
                .await;
            let unblock_event =
                self.hook_event("task_unblocked", json!({ "task_id": &unblocked.id }), json!({ "cause": task_id }));
            self.run_event(HookEventKind::TaskUnblocked, agent_id, &unblock_event).await;
        }

        let _ = self
            .store
            .notify(
                Some(task_id),
                orchestrator_core::models::NotificationKind::Completed,
                None,
                format!("task {task_id} completed"),
            )
            .await;
        let completed_event = self.hook_event("task_completed", json!({ "task_id": task_id }), json!({}));
        self.run_event(HookEventKind::TaskCompleted, agent_id, &completed_event).await;

        self.run_post(HookOp::Complete, agent_id, &event).await;

        Ok((completed, report, unblocked_tasks.into_iter().map(|t| t.id).collect()))
    }

    /// Evaluate every success criterion against the fixed symbol table:
    /// `actual_hours`, `estimated_hours`, `deadline_missed`,
    /// `feedback_quality`, `feedback_timeliness`.
    /// Manual (`measurable == "true"`) criteria pass only if
    /// `opts.confirm_manual` is set; skipped entirely (treated as
    /// satisfied) when `opts.validate` is false.
    fn evaluate_criteria(&self, task: &Task, opts: &CompleteOptions) -> Result<CriteriaReport> {
        if !opts.validate {
            let total = task.success_criteria.len() as u32;
            return Ok(CriteriaReport { passed: total, total, per_criterion: Vec::new() });
        }

        let actual_hours = opts.actual_hours.or(task.actual_hours).unwrap_or(0.0);
        let estimated_hours = task.estimated_hours.unwrap_or(0.0);
        let deadline_missed = task.deadline.map(|d| Utc::now() > d).unwrap_or(false);
        let ctx = CriteriaContext::new()
            .with("actual_hours", CriteriaValue::Number(actual_hours))
            .with("estimated_hours", CriteriaValue::Number(estimated_hours))
            .with("deadline_missed", CriteriaValue::Bool(deadline_missed))
            .with("feedback_quality", CriteriaValue::Number(task.feedback_quality.unwrap_or(0) as f64))
            .with("feedback_timeliness", CriteriaValue::Number(task.feedback_timeliness.unwrap_or(0) as f64));

        let mut per_criterion = Vec::with_capacity(task.success_criteria.len());
        for criterion in &task.success_criteria {
            let (ok, detail) = if criterion.measurable.trim() == "true" {
                if opts.confirm_manual {
                    (true, "manually confirmed".to_string())
                } else {
                    (false, "requires manual confirmation".to_string())
                }
            } else {
                match criteria::evaluate(&criterion.measurable, &ctx) {
                    Ok(result) => (result, if result { "satisfied".to_string() } else { "not satisfied".to_string() }),
                    Err(e) => (false, e.to_string()),
                }
            };
            per_criterion.push(CriterionResult { text: criterion.text.clone(), ok, detail });
        }

        let passed = per_criterion.iter().filter(|c| c.ok).count() as u32;
        Ok(CriteriaReport { passed, total: per_criterion.len() as u32, per_criterion })
    }

    // ---- reads ---------------------------------------------------------

    pub async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let _lock = self.acquire_shared()?;
        self.store.list(&filter).await
    }

    pub async fn show(&self, task_id: &TaskId) -> Result<TaskDetail> {
        let _lock = self.acquire_shared()?;
        let task = self.store.get(task_id).await?;
        let edges = self.store.list_dependencies(task_id).await?;

        let mut depends_on = Vec::new();
        let mut dependents = Vec::new();
        for edge in edges {
            if &edge.task_id == task_id {
                depends_on.push(edge.depends_on);
            } else if &edge.depends_on == task_id {
                dependents.push(edge.task_id);
            }
        }

        Ok(TaskDetail { task, depends_on, dependents })
    }

    /// Dependency-completion snapshot for one task plus the project-wide
    /// critical path query, not limited to `task_id`'s own subtree.
    pub async fn progress(&self, task_id: &TaskId) -> Result<TaskProgress> {
        let _lock = self.acquire_shared()?;
        let task = self.store.get(task_id).await?;
        let own_edges = self.store.list_dependencies(task_id).await?;
        let depends_on: Vec<TaskId> =
            own_edges.iter().filter(|e| &e.task_id == task_id).map(|e| e.depends_on.clone()).collect();

        let mut completed_dependencies = 0usize;
        for dep in &depends_on {
            if let Ok(dep_task) = self.store.get(dep).await {
                if dep_task.status == TaskStatus::Completed {
                    completed_dependencies += 1;
                }
            }
        }

        let all_tasks = self.store.list(&TaskFilter { limit: Some(10_000), ..Default::default() }).await?;
        let mut edges = std::collections::HashMap::new();
        let mut weights = std::collections::HashMap::new();
        let mut priorities = std::collections::HashMap::new();
        for t in &all_tasks {
            let t_edges = self.store.list_dependencies(&t.id).await?;
            let deps: Vec<TaskId> = t_edges.iter().filter(|e| &e.task_id == &t.id).map(|e| e.depends_on.clone()).collect();
            edges.insert(t.id.clone(), deps);
            weights.insert(t.id.clone(), t.estimated_hours.unwrap_or(1.0));
            priorities.insert(t.id.clone(), t.priority);
        }
        let critical_path = Resolver::critical_path(&edges, &weights, &priorities);

        Ok(TaskProgress {
            task_id: task_id.clone(),
            status: task.status,
            total_dependencies: depends_on.len(),
            completed_dependencies,
            critical_path,
        })
    }

    // ---- context channels -----------------------------------------------

    pub async fn note(&self, explicit_agent: Option<&str>, task_id: &TaskId, text: String) -> Result<PrivateNote> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let cleaned = crate::channels::sanitize_and_validate(&text)?;
        let result = self.store.add_note(task_id, &agent_id, cleaned.clone()).await;
        if let Ok(note) = &result {
            self.join(task_id, &agent_id).await;
            let log = ChannelLog::private_note(&self.workspace, task_id, &agent_id);
            let _ = log.append(&format!("{} {}", note.created_at.to_rfc3339(), cleaned));
        }
        self.log("note", Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    pub async fn share(&self, explicit_agent: Option<&str>, task_id: &TaskId, text: String) -> Result<ContextEntry> {
        self.write_context(explicit_agent, task_id, text, ContextKind::Share, "share").await
    }

    /// Shares context and additionally raises a high-priority broadcast
    /// notification plus an `on_discovery` hook event.
    pub async fn discover(&self, explicit_agent: Option<&str>, task_id: &TaskId, text: String) -> Result<ContextEntry> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.discover_inner(&agent_id, task_id, text).await;
        self.log("discover", Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    async fn discover_inner(&self, agent_id: &AgentId, task_id: &TaskId, text: String) -> Result<ContextEntry> {
        let cleaned = crate::channels::sanitize_and_validate(&text)?;
        let entry = self.store.add_context(task_id, agent_id, ContextKind::Discover, cleaned.clone()).await?;
        self.join(task_id, agent_id).await;

        let shared_log = ChannelLog::shared_context(&self.workspace, task_id);
        let _ = shared_log.append(&format!("{} [discover:{agent_id}] {cleaned}", entry.created_at.to_rfc3339()));

        let _ = self
            .store
            .notify(
                Some(task_id),
                orchestrator_core::models::NotificationKind::Discovery,
                None,
                cleaned.clone(),
            )
            .await;
        let broadcast_log = ChannelLog::broadcast(&self.workspace);
        let _ = broadcast_log.append(&format!("{} [discovery:{agent_id}] {cleaned}", entry.created_at.to_rfc3339()));

        let event = self.hook_event("discover", json!({ "task_id": task_id, "text": &cleaned }), json!({}));
        self.run_event(HookEventKind::Discovery, agent_id, &event).await;

        Ok(entry)
    }

    /// Writes to both the shared-context channel and the broadcast
    /// channel file, without raising a separate notification row —
    /// `ContextKind::Sync` already marks the entry's visibility intent
    /// for readers of `context`.
    pub async fn sync(&self, explicit_agent: Option<&str>, task_id: &TaskId, text: String) -> Result<ContextEntry> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.sync_inner(&agent_id, task_id, text).await;
        self.log("sync", Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    async fn sync_inner(&self, agent_id: &AgentId, task_id: &TaskId, text: String) -> Result<ContextEntry> {
        let cleaned = crate::channels::sanitize_and_validate(&text)?;
        let entry = self.store.add_context(task_id, agent_id, ContextKind::Sync, cleaned.clone()).await?;
        self.join(task_id, agent_id).await;

        let shared_log = ChannelLog::shared_context(&self.workspace, task_id);
        let _ = shared_log.append(&format!("{} [sync:{agent_id}] {cleaned}", entry.created_at.to_rfc3339()));

        let broadcast_log = ChannelLog::broadcast(&self.workspace);
        let _ = broadcast_log.append(&format!("{} [sync:{agent_id}:{task_id}] {cleaned}", entry.created_at.to_rfc3339()));

        Ok(entry)
    }

    async fn write_context(
        &self,
        explicit_agent: Option<&str>,
        task_id: &TaskId,
        text: String,
        kind: ContextKind,
        operation: &str,
    ) -> Result<ContextEntry> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let cleaned = crate::channels::sanitize_and_validate(&text)?;
        let result = self.store.add_context(task_id, &agent_id, kind, cleaned.clone()).await;
        if let Ok(entry) = &result {
            self.join(task_id, &agent_id).await;
            let log = ChannelLog::shared_context(&self.workspace, task_id);
            let _ = log.append(&format!("{} [{operation}:{agent_id}] {cleaned}", entry.created_at.to_rfc3339()));
        }
        self.log(operation, Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    /// Every shared-context entry the reading agent is entitled to see,
    /// in insertion order. A non-participant reader sees nothing — only
    /// agents that have written to, been assigned to, or created the
    /// task (see [`Engine::join`]) are participants.
    pub async fn context(&self, explicit_agent: Option<&str>, task_id: &TaskId) -> Result<Vec<ContextEntry>> {
        let _lock = self.acquire_shared()?;
        let agent_id = identity::resolve(explicit_agent)?;
        let participants = self.store.list_participants(task_id).await?;
        if !participants.iter().any(|p| p.agent_id == agent_id) {
            return Ok(Vec::new());
        }
        self.store.list_context(task_id).await
    }

    /// Unacknowledged notifications targeted at `agent_id` (or every
    /// broadcast/targeted notification when `agent_id` is `None`).
    pub async fn watch(&self, agent_id: Option<&str>) -> Result<Vec<orchestrator_core::models::Notification>> {
        let _lock = self.acquire_shared()?;
        let id = agent_id.map(str::to_string);
        self.store.list_notifications(id.as_ref()).await
    }

    pub async fn feedback(
        &self,
        explicit_agent: Option<&str>,
        task_id: &TaskId,
        quality: i32,
        timeliness: i32,
        notes: Option<String>,
        confirm: bool,
    ) -> Result<Task> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        Validator::validate_feedback_score("feedback_quality", quality)?;
        Validator::validate_feedback_score("feedback_timeliness", timeliness)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.feedback_inner(&agent_id, task_id, quality, timeliness, notes, confirm).await;
        self.log("feedback", Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    async fn feedback_inner(
        &self,
        agent_id: &AgentId,
        task_id: &TaskId,
        quality: i32,
        timeliness: i32,
        notes: Option<String>,
        confirm: bool,
    ) -> Result<Task> {
        self.enforce(Some(task_id), agent_id, false, true, true, confirm).await?;

        let update = UpdateTask {
            feedback_quality: Some(Some(quality)),
            feedback_timeliness: Some(Some(timeliness)),
            feedback_notes: Some(notes),
            ..Default::default()
        };
        self.store.update(task_id, update).await
    }

    // ---- templates -------------------------------------------------------

    /// Instantiate a template document, resolving each stub's
    /// `depends_on` indices against a topological ordering (a stub may
    /// legally reference a later index in the document) so that every
    /// dependency points at an id already generated at insertion time.
    /// If any insertion fails partway through, already-inserted tasks
    /// are deleted as a best-effort compensation: the `Store` trait has
    /// no cross-call transaction primitive, so this cannot be a single
    /// atomic database transaction the way a single `create` call is.
    pub async fn template_apply(
        &self,
        explicit_agent: Option<&str>,
        doc: TemplateDocument,
        supplied: std::collections::HashMap<String, String>,
        confirm: bool,
    ) -> Result<Vec<TaskId>> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_exclusive()?;

        let result = self.template_apply_inner(&agent_id, doc, supplied, confirm).await;
        self.log("template_apply", Some(&agent_id), None, started, &Self::outcome_of(&result));
        result
    }

    async fn template_apply_inner(
        &self,
        agent_id: &AgentId,
        doc: TemplateDocument,
        supplied: std::collections::HashMap<String, String>,
        confirm: bool,
    ) -> Result<Vec<TaskId>> {
        let plan = self.templates.instantiate(&doc, supplied)?;
        let order = topological_order(&plan.edges)?;

        let has_description = plan.new_tasks.iter().any(|t| !t.description.trim().is_empty());
        let has_success_criteria = plan.new_tasks.iter().any(|t| !t.success_criteria.is_empty());
        let (mode, _) = self.enforce(None, agent_id, true, has_description, has_success_criteria, confirm).await?;

        let event = self.hook_event("template_apply", json!({ "template": &doc.metadata.name }), json!({}));
        self.run_pre(HookOp::Add, agent_id, &event, mode == EnforcementMode::Strict).await?;

        let mut generated: Vec<Option<TaskId>> = vec![None; plan.new_tasks.len()];
        let mut inserted_in_order = Vec::with_capacity(plan.new_tasks.len());

        for &index in &order {
            let mut stub = plan.new_tasks[index].clone();
            stub.depends_on = plan.edges[index]
                .iter()
                .map(|&dep| generated[dep].clone().expect("topological order guarantees dependency already inserted"))
                .collect();

            match self.store.create(stub, agent_id).await {
                Ok(task) => {
                    generated[index] = Some(task.id.clone());
                    inserted_in_order.push(task.id);
                }
                Err(e) => {
                    for id in inserted_in_order.iter().rev() {
                        let _ = self.store.delete(id).await;
                    }
                    return Err(e);
                }
            }
        }

        self.run_post(HookOp::Add, agent_id, &event).await;

        Ok(generated.into_iter().map(|id| id.expect("every stub was inserted")).collect())
    }

    // ---- enforcement / export / metrics -----------------------------------

    /// Report policy violations for the current workspace and an
    /// optional explicit agent id, without enforcing or mutating
    /// anything. Used by an interactive "fix my setup" flow.
    pub async fn validate_enforcement(&self, explicit_agent: Option<&str>) -> Result<ViolationReport> {
        let agent_id = identity::resolve(explicit_agent).ok();
        let multi_agent = self.multi_agent_activity_observed(None).await;
        let mode = Gate::effective_mode(self.config.enforcement.mode, &self.workspace, multi_agent);
        let ctx = OperationContext { agent_id, ..Default::default() };
        Ok(Gate::new(mode).validate(&self.workspace, &ctx))
    }

    /// Bundle a task's record, shared context, and the calling agent's
    /// own private notes into a `tar.gz` archive. Other agents' private
    /// notes are never included: exporting everyone's notes would break
    /// the single-reader visibility invariant private notes are built
    /// on.
    pub async fn export(&self, explicit_agent: Option<&str>, task_id: &TaskId) -> Result<PathBuf> {
        let started = Instant::now();
        let agent_id = identity::resolve(explicit_agent)?;
        let _lock = self.acquire_shared()?;

        let result = self.export_inner(&agent_id, task_id).await;
        self.log("export", Some(&agent_id), Some(task_id.as_str()), started, &Self::outcome_of(&result));
        result
    }

    async fn export_inner(&self, agent_id: &AgentId, task_id: &TaskId) -> Result<PathBuf> {
        let task = self.store.get(task_id).await?;
        let context = self.store.list_context(task_id).await?;
        let notes = self.store.list_notes(task_id, agent_id).await?;

        let archiver = Archiver::new(&self.workspace);
        archiver.export_task(&task, &context, &notes)
    }

    pub async fn metrics(&self, window: TimeWindow) -> Result<MetricsReport> {
        let _lock = self.acquire_shared()?;
        metrics::compute(self.store.as_ref(), &self.telemetry, window).await
    }
}

/// Resolve the hooks directory: an absolute `config.hooks.dir` is used
/// verbatim, the default name resolves to the workspace's canonical
/// `.task-orchestrator/hooks`, and any other relative name is resolved
/// against the workspace root (matching `TM_HOOKS_DIR`'s override
/// contract).
fn resolve_hooks_dir(workspace: &Workspace, config: &EngineConfig) -> PathBuf {
    let configured = Path::new(&config.hooks.dir);
    if configured.is_absolute() {
        configured.to_path_buf()
    } else if config.hooks.dir == "hooks" {
        workspace.hooks_dir()
    } else {
        workspace.root().join(configured)
    }
}

/// Kahn's algorithm over a template's by-index `depends_on` edges, so a
/// stub may reference a dependency defined later in the document.
fn topological_order(edges: &[Vec<usize>]) -> Result<Vec<usize>> {
    let n = edges.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, deps) in edges.iter().enumerate() {
        indegree[i] = deps.len();
        for &dep in deps {
            dependents[dep].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dep in &dependents[i] {
            indegree[dep] -= 1;
            if indegree[dep] == 0 {
                queue.push_back(dep);
            }
        }
    }

    if order.len() != n {
        return Err(EngineError::TemplateError("template task graph has a dependency cycle".to_string()));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{TaskStub, TemplateMetadata, VariableDef, VariableType};
    use orchestrator_core::models::Criterion;
    use orchestrator_mocks::InMemoryStore;
    use tempfile::tempdir;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempdir().unwrap();
        let workspace = Workspace::at(dir.path());
        workspace.init().unwrap();
        std::fs::write(workspace.db_path(), b"").unwrap();
        let engine = Engine::with_store(workspace, EngineConfig::default(), Arc::new(InMemoryStore::new()));
        (dir, engine)
    }

    fn sample_task(title: &str) -> NewTask {
        NewTask { title: title.to_string(), description: "do the thing".to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn add_then_list_round_trip() {
        let (_dir, engine) = engine();
        let task = engine.add(Some("alice"), sample_task("write the docs"), false, true).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let listed = engine.list(TaskFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, task.id);
    }

    #[tokio::test]
    async fn duplicate_title_is_rejected_when_requested() {
        let (_dir, engine) = engine();
        engine.add(Some("alice"), sample_task("ship it"), true, true).await.unwrap();
        let result = engine.add(Some("alice"), sample_task("Ship It"), true, true).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn completing_a_task_unblocks_its_dependent() {
        let (_dir, engine) = engine();
        let base = engine.add(Some("alice"), sample_task("base"), false, true).await.unwrap();
        let mut dependent_spec = sample_task("dependent");
        dependent_spec.depends_on = vec![base.id.clone()];
        let dependent = engine.add(Some("alice"), dependent_spec, false, true).await.unwrap();
        assert_eq!(dependent.status, TaskStatus::Blocked);

        let (_completed, report, unblocked) =
            engine.complete(Some("alice"), &base.id, CompleteOptions::default(), true).await.unwrap();
        assert!(report.all_passed());
        assert_eq!(unblocked, vec![dependent.id.clone()]);

        let refreshed = engine.show(&dependent.id).await.unwrap();
        assert_eq!(refreshed.task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn manual_criterion_requires_explicit_confirmation() {
        let (_dir, engine) = engine();
        let mut spec = sample_task("review the design");
        spec.success_criteria = vec![Criterion { text: "reviewer signed off".to_string(), measurable: "true".to_string() }];
        let task = engine.add(Some("alice"), spec, false, true).await.unwrap();

        let unconfirmed = engine
            .complete(Some("alice"), &task.id, CompleteOptions { validate: true, ..Default::default() }, true)
            .await;
        assert!(matches!(unconfirmed, Err(EngineError::CriteriaUnmet(_))));

        let confirmed = engine
            .complete(
                Some("alice"),
                &task.id,
                CompleteOptions { validate: true, confirm_manual: true, ..Default::default() },
                true,
            )
            .await;
        assert!(confirmed.is_ok());
    }

    #[tokio::test]
    async fn share_and_context_round_trip() {
        let (_dir, engine) = engine();
        let task = engine.add(Some("alice"), sample_task("pair on the schema"), false, true).await.unwrap();
        engine.share(Some("alice"), &task.id, "drafted v1 of the schema".to_string()).await.unwrap();

        let entries = engine.context(Some("alice"), &task.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ContextKind::Share);
    }

    #[tokio::test]
    async fn non_participant_sees_no_shared_context() {
        let (_dir, engine) = engine();
        let task = engine.add(Some("alice"), sample_task("pair on the schema"), false, true).await.unwrap();
        engine.share(Some("alice"), &task.id, "drafted v1 of the schema".to_string()).await.unwrap();

        let entries = engine.context(Some("mallory"), &task.id).await.unwrap();
        assert!(entries.is_empty());

        engine.note(Some("bob"), &task.id, "just poking around".to_string()).await.unwrap();
        let bobs_view = engine.context(Some("bob"), &task.id).await.unwrap();
        assert_eq!(bobs_view.len(), 1);
    }

    #[tokio::test]
    async fn discover_raises_a_broadcast_notification() {
        let (_dir, engine) = engine();
        let task = engine.add(Some("alice"), sample_task("investigate the outage"), false, true).await.unwrap();
        engine.discover(Some("alice"), &task.id, "found a leaked connection pool".to_string()).await.unwrap();

        let broadcasts = engine.watch(None).await.unwrap();
        assert!(broadcasts
            .iter()
            .any(|n| n.kind == orchestrator_core::models::NotificationKind::Discovery));
    }

    #[tokio::test]
    async fn template_apply_resolves_forward_references() {
        let (_dir, engine) = engine();
        let doc = TemplateDocument {
            metadata: TemplateMetadata { name: "rollout".to_string(), version: "1".to_string(), description: String::new() },
            variables: vec![VariableDef {
                name: "service".to_string(),
                var_type: VariableType::String,
                required: true,
                default: None,
                options: vec![],
            }],
            tasks: vec![
                TaskStub {
                    title: "Deploy {{service}}".to_string(),
                    description: "final rollout step".to_string(),
                    priority: Priority::Medium,
                    depends_on: vec![1],
                    success_criteria: vec![],
                    estimated_hours: Some(1.0),
                    tags: vec![],
                },
                TaskStub {
                    title: "Provision {{service}}".to_string(),
                    description: "set up infra first".to_string(),
                    priority: Priority::Medium,
                    depends_on: vec![],
                    success_criteria: vec![],
                    estimated_hours: Some(2.0),
                    tags: vec![],
                },
            ],
        };
        let mut supplied = std::collections::HashMap::new();
        supplied.insert("service".to_string(), "billing".to_string());

        let ids = engine.template_apply(Some("alice"), doc, supplied, true).await.unwrap();
        assert_eq!(ids.len(), 2);

        let deploy = engine.show(&ids[0]).await.unwrap();
        assert_eq!(deploy.depends_on, vec![ids[1].clone()]);
    }

    #[tokio::test]
    async fn validate_enforcement_reports_without_mutating() {
        let (_dir, engine) = engine();
        let report = engine.validate_enforcement(Some("alice")).await.unwrap();
        assert!(report.is_clean() || !report.is_clean());
    }

    #[tokio::test]
    async fn export_bundles_task_and_callers_own_notes() {
        let (_dir, engine) = engine();
        let task = engine.add(Some("alice"), sample_task("write the postmortem"), false, true).await.unwrap();
        engine.note(Some("alice"), &task.id, "remember to loop in SRE".to_string()).await.unwrap();
        engine.complete(Some("alice"), &task.id, CompleteOptions::default(), true).await.unwrap();

        let archive_path = engine.export(Some("alice"), &task.id).await.unwrap();
        assert!(archive_path.exists());
    }
}
