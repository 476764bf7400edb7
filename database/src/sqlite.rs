use async_trait::async_trait;
use orchestrator_core::{
    error::EngineError,
    models::{
        AgentId, ContextEntry, ContextKind, Dependency, NewTask, Notification, NotificationKind,
        Participant, PrivateNote, Task, TaskFilter, TaskId, TaskStatus, UpdateTask,
    },
    store::{Store, StoreStats},
    validation::Validator,
    Result,
};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};

use crate::common::{
    context_kind_to_string, now, priority_to_string, push_filter_conditions, row_to_context_entry,
    row_to_criterion, row_to_dependency, row_to_notification, row_to_participant,
    row_to_private_note, row_to_task, sqlx_error_to_engine_error, status_to_string,
};

/// Result sets from `list` are capped at this many rows when the
/// caller doesn't supply an explicit `limit`.
const DEFAULT_LIST_LIMIT: i64 = 100;

/// SQLite implementation of the [`Store`] trait.
///
/// Uses a connection pool with WAL journaling for file-backed
/// databases (Memory journaling for `:memory:`), a five-second busy
/// timeout, and foreign keys enabled so cascading deletes clean up
/// child rows (tags, criteria, dependencies, participants, context,
/// notes) automatically.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url` with the default five-second busy
    /// timeout, creating the file if it does not exist. Accepts
    /// `:memory:`, a bare path, or a `sqlite://` URL.
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, std::time::Duration::from_secs(5)).await
    }

    /// Connect to `database_url` with an explicit busy timeout —
    /// libsqlite3's own wait-and-retry window before a contended
    /// statement returns `SQLITE_BUSY`, independent of and shorter than
    /// the workspace-level advisory lock that already serializes
    /// cross-process mutations. `Engine::open` wires this to
    /// `EngineConfig::store.busy_timeout_secs`.
    pub async fn connect(database_url: &str, busy_timeout: std::time::Duration) -> Result<Self> {
        let db_url = if database_url.starts_with(":memory:") {
            database_url.to_string()
        } else if database_url.starts_with("sqlite://") {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false)
        {
            Sqlite::create_database(&db_url)
                .await
                .map_err(|e| EngineError::WorkspaceError(format!("failed to create database: {e}")))?;
        }

        let connect_options = if db_url.contains(":memory:") {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_url)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(busy_timeout)
                .foreign_keys(true)
        } else {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(busy_timeout)
                .foreign_keys(true)
        };

        let pool = SqlitePool::connect_with(connect_options)
            .await
            .map_err(sqlx_error_to_engine_error)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn generate_id() -> TaskId {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    async fn fetch_criteria(&self, task_id: &TaskId) -> Result<Vec<orchestrator_core::models::Criterion>> {
        let rows = sqlx::query("SELECT text, measurable FROM task_criteria WHERE task_id = ? ORDER BY idx")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;
        Ok(rows.iter().map(row_to_criterion).collect())
    }

    async fn fetch_tags(&self, task_id: &TaskId) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT tag FROM task_tags WHERE task_id = ? ORDER BY tag")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;
        Ok(rows.iter().map(|r| r.get("tag")).collect())
    }

    async fn hydrate(&self, mut task: Task) -> Result<Task> {
        task.success_criteria = self.fetch_criteria(&task.id).await?;
        task.tags = self.fetch_tags(&task.id).await?;
        Ok(task)
    }

    async fn fetch_row(&self, id: &TaskId) -> Result<sqlx::sqlite::SqliteRow> {
        sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?
            .ok_or_else(|| EngineError::not_found("task", id.clone()))
    }

    async fn would_create_cycle(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<bool> {
        if task_id == depends_on {
            return Ok(true);
        }

        let row = sqlx::query(
            r#"
            WITH RECURSIVE reachable(id) AS (
                SELECT depends_on AS id FROM dependencies WHERE task_id = ?
                UNION
                SELECT d.depends_on FROM dependencies d JOIN reachable r ON d.task_id = r.id
            )
            SELECT 1 AS found FROM reachable WHERE id = ? LIMIT 1
            "#,
        )
        .bind(depends_on)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_engine_error)?;

        Ok(row.is_some())
    }

    async fn remaining_incomplete_deps(&self, task_id: &TaskId) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM dependencies d
            JOIN tasks t ON t.id = d.depends_on
            WHERE d.task_id = ? AND t.status != 'completed'
            "#,
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_engine_error)?;
        Ok(row.get::<i64, _>("n"))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create(&self, task: NewTask, created_by: &AgentId) -> Result<Task> {
        Validator::validate_new_task(&task)?;
        Validator::validate_agent_id(created_by)?;

        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_engine_error)?;

        for dep in &task.depends_on {
            let exists = sqlx::query("SELECT 1 FROM tasks WHERE id = ?")
                .bind(dep)
                .fetch_optional(&mut *tx)
                .await
                .map_err(sqlx_error_to_engine_error)?;
            if exists.is_none() {
                return Err(EngineError::not_found("task", dep.clone()));
            }
        }

        let incomplete_deps = if task.depends_on.is_empty() {
            0
        } else {
            let placeholders = task.depends_on.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT COUNT(*) AS n FROM tasks WHERE id IN ({placeholders}) AND status != 'completed'"
            );
            let mut q = sqlx::query(&sql);
            for dep in &task.depends_on {
                q = q.bind(dep);
            }
            let row = q.fetch_one(&mut *tx).await.map_err(sqlx_error_to_engine_error)?;
            row.get::<i64, _>("n")
        };

        let id = Self::generate_id();
        let ts = now();
        let status = if incomplete_deps > 0 { TaskStatus::Blocked } else { TaskStatus::Pending };

        sqlx::query(
            r#"
            INSERT INTO tasks (id, title, description, status, priority, assignee, created_by, created_at, updated_at, deadline, estimated_hours, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(status_to_string(status))
        .bind(priority_to_string(task.priority))
        .bind(&task.assignee)
        .bind(created_by)
        .bind(ts)
        .bind(ts)
        .bind(task.deadline)
        .bind(task.estimated_hours)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_engine_error)?;

        for (idx, criterion) in task.success_criteria.iter().enumerate() {
            sqlx::query("INSERT INTO task_criteria (task_id, idx, text, measurable) VALUES (?, ?, ?, ?)")
                .bind(&id)
                .bind(idx as i64)
                .bind(&criterion.text)
                .bind(&criterion.measurable)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error_to_engine_error)?;
        }

        for tag in &task.tags {
            sqlx::query("INSERT INTO task_tags (task_id, tag) VALUES (?, ?)")
                .bind(&id)
                .bind(tag)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error_to_engine_error)?;
        }

        for dep in &task.depends_on {
            sqlx::query("INSERT INTO dependencies (task_id, depends_on) VALUES (?, ?)")
                .bind(&id)
                .bind(dep)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error_to_engine_error)?;
        }

        tx.commit().await.map_err(sqlx_error_to_engine_error)?;

        self.get(&id).await
    }

    async fn get(&self, id: &TaskId) -> Result<Task> {
        let row = self.fetch_row(id).await?;
        let task = row_to_task(&row)?;
        self.hydrate(task).await
    }

    async fn update(&self, id: &TaskId, update: UpdateTask) -> Result<Task> {
        let row = self.fetch_row(id).await?;
        let current_version: i64 = row.get("version");

        if let Some(expected) = update.expected_version {
            if expected != current_version {
                return Err(EngineError::conflict("task", id.clone(), expected, current_version));
            }
        }

        if let Some(title) = &update.title {
            Validator::validate_title(title)?;
        }
        if let Some(description) = &update.description {
            Validator::validate_description(description)?;
        }
        if let Some(Some(assignee)) = &update.assignee {
            Validator::validate_agent_id(assignee)?;
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

        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_engine_error)?;

        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("UPDATE tasks SET ");
        let mut first = true;
        let mut push_sep = |qb: &mut sqlx::QueryBuilder<sqlx::Sqlite>, first: &mut bool| {
            if !*first {
                qb.push(", ");
            }
            *first = false;
        };

        if let Some(title) = &update.title {
            push_sep(&mut qb, &mut first);
            qb.push("title = ");
            qb.push_bind(title.clone());
        }
        if let Some(description) = &update.description {
            push_sep(&mut qb, &mut first);
            qb.push("description = ");
            qb.push_bind(description.clone());
        }
        if let Some(priority) = update.priority {
            push_sep(&mut qb, &mut first);
            qb.push("priority = ");
            qb.push_bind(priority_to_string(priority));
        }
        if let Some(assignee) = &update.assignee {
            push_sep(&mut qb, &mut first);
            qb.push("assignee = ");
            qb.push_bind(assignee.clone());
        }
        if let Some(deadline) = update.deadline {
            push_sep(&mut qb, &mut first);
            qb.push("deadline = ");
            qb.push_bind(deadline);
        }
        if let Some(estimated_hours) = update.estimated_hours {
            push_sep(&mut qb, &mut first);
            qb.push("estimated_hours = ");
            qb.push_bind(estimated_hours);
        }
        if let Some(actual_hours) = update.actual_hours {
            push_sep(&mut qb, &mut first);
            qb.push("actual_hours = ");
            qb.push_bind(actual_hours);
        }
        if let Some(quality) = update.feedback_quality {
            push_sep(&mut qb, &mut first);
            qb.push("feedback_quality = ");
            qb.push_bind(quality);
        }
        if let Some(timeliness) = update.feedback_timeliness {
            push_sep(&mut qb, &mut first);
            qb.push("feedback_timeliness = ");
            qb.push_bind(timeliness);
        }
        if let Some(notes) = update.feedback_notes {
            push_sep(&mut qb, &mut first);
            qb.push("feedback_notes = ");
            qb.push_bind(notes);
        }

        push_sep(&mut qb, &mut first);
        qb.push("version = version + 1, updated_at = ");
        qb.push_bind(now());

        qb.push(" WHERE id = ");
        qb.push_bind(id.clone());

        qb.build().execute(&mut *tx).await.map_err(sqlx_error_to_engine_error)?;

        if let Some(criteria) = &update.success_criteria {
            sqlx::query("DELETE FROM task_criteria WHERE task_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error_to_engine_error)?;
            for (idx, criterion) in criteria.iter().enumerate() {
                sqlx::query("INSERT INTO task_criteria (task_id, idx, text, measurable) VALUES (?, ?, ?, ?)")
                    .bind(id)
                    .bind(idx as i64)
                    .bind(&criterion.text)
                    .bind(&criterion.measurable)
                    .execute(&mut *tx)
                    .await
                    .map_err(sqlx_error_to_engine_error)?;
            }
        }

        if let Some(tags) = &update.tags {
            sqlx::query("DELETE FROM task_tags WHERE task_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error_to_engine_error)?;
            for tag in tags {
                Validator::validate_tag(tag)?;
                sqlx::query("INSERT INTO task_tags (task_id, tag) VALUES (?, ?)")
                    .bind(id)
                    .bind(tag)
                    .execute(&mut *tx)
                    .await
                    .map_err(sqlx_error_to_engine_error)?;
            }
        }

        tx.commit().await.map_err(sqlx_error_to_engine_error)?;

        self.get(id).await
    }

    async fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task> {
        let row = self.fetch_row(id).await?;
        let current_task = row_to_task(&row)?;
        Validator::validate_status_transition(current_task.status, status)?;

        let completed_at = if status == TaskStatus::Completed { Some(now()) } else { None };

        sqlx::query("UPDATE tasks SET status = ?, completed_at = ?, version = version + 1, updated_at = ? WHERE id = ?")
            .bind(status_to_string(status))
            .bind(completed_at)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;

        self.get(id).await
    }

    async fn delete(&self, id: &TaskId) -> Result<()> {
        self.fetch_row(id).await?;

        let dependents = sqlx::query("SELECT 1 FROM dependencies WHERE depends_on = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;
        if dependents.is_some() {
            return Err(EngineError::HasDependents(id.clone()));
        }

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;

        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("SELECT * FROM tasks");
        push_filter_conditions(&mut qb, filter);
        qb.push(
            " ORDER BY CASE priority WHEN 'critical' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END, created_at ASC, seq ASC",
        );
        let limit = filter.limit.map(|l| l as i64).unwrap_or(DEFAULT_LIST_LIMIT);
        qb.push(" LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_engine_error)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            let task = row_to_task(row)?;
            tasks.push(self.hydrate(task).await?);
        }
        Ok(tasks)
    }

    async fn add_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<()> {
        self.fetch_row(task_id).await?;
        self.fetch_row(depends_on).await?;

        if self.would_create_cycle(task_id, depends_on).await? {
            return Err(EngineError::cycle(format!("{task_id} -> {depends_on}")));
        }

        sqlx::query("INSERT INTO dependencies (task_id, depends_on) VALUES (?, ?)")
            .bind(task_id)
            .bind(depends_on)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;

        let remaining = self.remaining_incomplete_deps(task_id).await?;
        if remaining > 0 {
            sqlx::query("UPDATE tasks SET status = 'blocked', version = version + 1, updated_at = ? WHERE id = ? AND status != 'completed' AND status != 'cancelled'")
                .bind(now())
                .bind(task_id)
                .execute(&self.pool)
                .await
                .map_err(sqlx_error_to_engine_error)?;
        }

        Ok(())
    }

    async fn remove_dependency(&self, task_id: &TaskId, depends_on: &TaskId) -> Result<()> {
        sqlx::query("DELETE FROM dependencies WHERE task_id = ? AND depends_on = ?")
            .bind(task_id)
            .bind(depends_on)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;

        let remaining = self.remaining_incomplete_deps(task_id).await?;
        if remaining == 0 {
            sqlx::query("UPDATE tasks SET status = 'pending', version = version + 1, updated_at = ? WHERE id = ? AND status = 'blocked'")
                .bind(now())
                .bind(task_id)
                .execute(&self.pool)
                .await
                .map_err(sqlx_error_to_engine_error)?;
        }

        Ok(())
    }

    async fn list_dependencies(&self, task_id: &TaskId) -> Result<Vec<Dependency>> {
        let rows = sqlx::query("SELECT task_id, depends_on FROM dependencies WHERE task_id = ? OR depends_on = ?")
            .bind(task_id)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;
        Ok(rows.iter().map(row_to_dependency).collect())
    }

    async fn complete(&self, id: &TaskId, summary: Option<String>) -> Result<(Task, Vec<TaskId>)> {
        let row = self.fetch_row(id).await?;
        let current_task = row_to_task(&row)?;
        if current_task.status == TaskStatus::Completed {
            return Err(EngineError::conflict("task", id.clone(), current_task.version, current_task.version));
        }
        Validator::validate_status_transition(current_task.status, TaskStatus::Completed)?;

        sqlx::query(
            "UPDATE tasks SET status = 'completed', completed_at = ?, completion_summary = ?, version = version + 1, updated_at = ? WHERE id = ?",
        )
        .bind(now())
        .bind(&summary)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_engine_error)?;

        let dependents = sqlx::query("SELECT task_id FROM dependencies WHERE depends_on = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;

        let mut unblocked = Vec::new();
        for row in &dependents {
            let dependent: TaskId = row.get("task_id");
            let remaining = self.remaining_incomplete_deps(&dependent).await?;
            if remaining == 0 {
                let updated = sqlx::query(
                    "UPDATE tasks SET status = 'pending', version = version + 1, updated_at = ? WHERE id = ? AND status = 'blocked'",
                )
                .bind(now())
                .bind(&dependent)
                .execute(&self.pool)
                .await
                .map_err(sqlx_error_to_engine_error)?;
                if updated.rows_affected() > 0 {
                    unblocked.push(dependent);
                }
            }
        }

        let task = self.get(id).await?;
        Ok((task, unblocked))
    }

    async fn add_participant(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Participant> {
        self.fetch_row(task_id).await?;
        let ts = now();
        sqlx::query("INSERT OR IGNORE INTO participants (task_id, agent_id, joined_at) VALUES (?, ?, ?)")
            .bind(task_id)
            .bind(agent_id)
            .bind(ts)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;

        let row = sqlx::query("SELECT task_id, agent_id, joined_at FROM participants WHERE task_id = ? AND agent_id = ?")
            .bind(task_id)
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;
        Ok(row_to_participant(&row))
    }

    async fn list_participants(&self, task_id: &TaskId) -> Result<Vec<Participant>> {
        let rows = sqlx::query("SELECT task_id, agent_id, joined_at FROM participants WHERE task_id = ? ORDER BY joined_at")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;
        Ok(rows.iter().map(row_to_participant).collect())
    }

    async fn add_context(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        kind: ContextKind,
        text: String,
    ) -> Result<ContextEntry> {
        self.fetch_row(task_id).await?;
        let ts = now();
        let row = sqlx::query(
            "INSERT INTO context_entries (task_id, agent_id, kind, text, created_at) VALUES (?, ?, ?, ?, ?) RETURNING task_id, agent_id, kind, text, created_at, sequence",
        )
        .bind(task_id)
        .bind(agent_id)
        .bind(context_kind_to_string(kind))
        .bind(&text)
        .bind(ts)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_engine_error)?;

        row_to_context_entry(&row)
    }

    async fn list_context(&self, task_id: &TaskId) -> Result<Vec<ContextEntry>> {
        let rows = sqlx::query(
            "SELECT task_id, agent_id, kind, text, created_at, sequence FROM context_entries WHERE task_id = ? ORDER BY sequence",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_engine_error)?;

        rows.iter().map(row_to_context_entry).collect()
    }

    async fn add_note(&self, task_id: &TaskId, agent_id: &AgentId, text: String) -> Result<PrivateNote> {
        self.fetch_row(task_id).await?;
        let ts = now();
        sqlx::query("INSERT INTO private_notes (task_id, agent_id, text, created_at) VALUES (?, ?, ?, ?)")
            .bind(task_id)
            .bind(agent_id)
            .bind(&text)
            .bind(ts)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;

        Ok(PrivateNote {
            task_id: task_id.clone(),
            agent_id: agent_id.clone(),
            text,
            created_at: ts,
        })
    }

    async fn list_notes(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Vec<PrivateNote>> {
        let rows = sqlx::query(
            "SELECT task_id, agent_id, text, created_at FROM private_notes WHERE task_id = ? AND agent_id = ? ORDER BY created_at",
        )
        .bind(task_id)
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_engine_error)?;

        Ok(rows.iter().map(row_to_private_note).collect())
    }

    async fn notify(
        &self,
        task_id: Option<&TaskId>,
        kind: NotificationKind,
        target_agent: Option<&AgentId>,
        payload: String,
    ) -> Result<Notification> {
        let id = uuid::Uuid::new_v4().to_string();
        let ts = now();
        let kind_str = match kind {
            NotificationKind::Unblocked => "unblocked",
            NotificationKind::Completed => "completed",
            NotificationKind::Discovery => "discovery",
            NotificationKind::Assigned => "assigned",
            NotificationKind::Conflict => "conflict",
        };

        sqlx::query(
            "INSERT INTO notifications (id, task_id, kind, target_agent, payload, created_at, acknowledged) VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&id)
        .bind(task_id)
        .bind(kind_str)
        .bind(target_agent)
        .bind(&payload)
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_engine_error)?;

        Ok(Notification {
            id,
            task_id: task_id.cloned(),
            kind,
            target_agent: target_agent.cloned(),
            payload,
            created_at: ts,
            acknowledged: false,
        })
    }

    async fn list_notifications(&self, agent_id: Option<&AgentId>) -> Result<Vec<Notification>> {
        let rows = match agent_id {
            Some(agent) => sqlx::query(
                "SELECT id, task_id, kind, target_agent, payload, created_at, acknowledged FROM notifications WHERE acknowledged = 0 AND (target_agent IS NULL OR target_agent = ?) ORDER BY created_at",
            )
            .bind(agent)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?,
            None => sqlx::query(
                "SELECT id, task_id, kind, target_agent, payload, created_at, acknowledged FROM notifications WHERE acknowledged = 0 ORDER BY created_at",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?,
        };

        rows.iter().map(row_to_notification).collect()
    }

    async fn acknowledge_notification(&self, id: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE notifications SET acknowledged = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;
        if updated.rows_affected() == 0 {
            return Err(EngineError::not_found("notification", id.to_string()));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END) AS pending,
                SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END) AS in_progress,
                SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed,
                SUM(CASE WHEN status = 'blocked' THEN 1 ELSE 0 END) AS blocked,
                SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END) AS cancelled
            FROM tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_engine_error)?;

        Ok(StoreStats {
            total: row.get::<i64, _>("total") as u64,
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0) as u64,
            in_progress: row.get::<Option<i64>, _>("in_progress").unwrap_or(0) as u64,
            completed: row.get::<Option<i64>, _>("completed").unwrap_or(0) as u64,
            blocked: row.get::<Option<i64>, _>("blocked").unwrap_or(0) as u64,
            cancelled: row.get::<Option<i64>, _>("cancelled").unwrap_or(0) as u64,
        })
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| EngineError::SchemaMismatch {
                expected: "latest".to_string(),
                found: format!("migration failed: {e}"),
            })?;

        tracing::info!("database migrations completed");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_engine_error)?;
        Ok(())
    }
}
