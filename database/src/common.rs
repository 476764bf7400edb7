use chrono::{DateTime, Utc};
use orchestrator_core::{
    error::EngineError,
    models::{
        ContextEntry, ContextKind, Criterion, Dependency, Notification, NotificationKind,
        Participant, Priority, PrivateNote, Task, TaskFilter, TaskStatus,
    },
    Result,
};
use sqlx::{sqlite::SqliteRow, Row};

pub fn status_to_string(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Cancelled => "cancelled",
    }
}

pub fn string_to_status(s: &str) -> Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        "blocked" => Ok(TaskStatus::Blocked),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(EngineError::Corrupt(format!("invalid task status in database: {other}"))),
    }
}

pub fn priority_to_string(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}

pub fn string_to_priority(s: &str) -> Result<Priority> {
    match s {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "critical" => Ok(Priority::Critical),
        other => Err(EngineError::Corrupt(format!("invalid priority in database: {other}"))),
    }
}

fn notification_kind_to_string(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Unblocked => "unblocked",
        NotificationKind::Completed => "completed",
        NotificationKind::Discovery => "discovery",
        NotificationKind::Assigned => "assigned",
        NotificationKind::Conflict => "conflict",
    }
}

fn string_to_notification_kind(s: &str) -> Result<NotificationKind> {
    match s {
        "unblocked" => Ok(NotificationKind::Unblocked),
        "completed" => Ok(NotificationKind::Completed),
        "discovery" => Ok(NotificationKind::Discovery),
        "assigned" => Ok(NotificationKind::Assigned),
        "conflict" => Ok(NotificationKind::Conflict),
        other => Err(EngineError::Corrupt(format!("invalid notification kind in database: {other}"))),
    }
}

pub fn context_kind_to_string(kind: ContextKind) -> &'static str {
    match kind {
        ContextKind::Share => "share",
        ContextKind::Discover => "discover",
        ContextKind::Sync => "sync",
    }
}

fn string_to_context_kind(s: &str) -> Result<ContextKind> {
    match s {
        "share" => Ok(ContextKind::Share),
        "discover" => Ok(ContextKind::Discover),
        "sync" => Ok(ContextKind::Sync),
        other => Err(EngineError::Corrupt(format!("invalid context kind in database: {other}"))),
    }
}

/// Build a [`Task`] from a `tasks` row. Does not populate
/// `success_criteria` or `tags`; callers join those in separately
/// since they live in child tables.
pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status_str: String = row.get("status");
    let priority_str: String = row.get("priority");

    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: string_to_status(&status_str)?,
        priority: string_to_priority(&priority_str)?,
        assignee: row.get("assignee"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
        success_criteria: Vec::new(),
        deadline: row.get("deadline"),
        estimated_hours: row.get("estimated_hours"),
        actual_hours: row.get("actual_hours"),
        feedback_quality: row.get("feedback_quality"),
        feedback_timeliness: row.get("feedback_timeliness"),
        feedback_notes: row.get("feedback_notes"),
        completion_summary: row.get("completion_summary"),
        tags: Vec::new(),
        version: row.get("version"),
        sequence: row.get("seq"),
    })
}

pub fn row_to_criterion(row: &SqliteRow) -> Criterion {
    Criterion {
        text: row.get("text"),
        measurable: row.get("measurable"),
    }
}

pub fn row_to_dependency(row: &SqliteRow) -> Dependency {
    Dependency {
        task_id: row.get("task_id"),
        depends_on: row.get("depends_on"),
    }
}

pub fn row_to_participant(row: &SqliteRow) -> Participant {
    Participant {
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        joined_at: row.get("joined_at"),
    }
}

pub fn row_to_context_entry(row: &SqliteRow) -> Result<ContextEntry> {
    let kind_str: String = row.get("kind");
    Ok(ContextEntry {
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        kind: string_to_context_kind(&kind_str)?,
        text: row.get("text"),
        created_at: row.get("created_at"),
        sequence: row.get("sequence"),
    })
}

pub fn row_to_private_note(row: &SqliteRow) -> PrivateNote {
    PrivateNote {
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        text: row.get("text"),
        created_at: row.get("created_at"),
    }
}

pub fn row_to_notification(row: &SqliteRow) -> Result<Notification> {
    let kind_str: String = row.get("kind");
    let acknowledged: i64 = row.get("acknowledged");
    Ok(Notification {
        id: row.get("id"),
        task_id: row.get("task_id"),
        kind: string_to_notification_kind(&kind_str)?,
        target_agent: row.get("target_agent"),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
        acknowledged: acknowledged != 0,
    })
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a `sqlx::Error` into the engine's error taxonomy.
pub fn sqlx_error_to_engine_error(err: sqlx::Error) -> EngineError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                EngineError::Conflict {
                    kind: "row".to_string(),
                    id: message.to_string(),
                    expected: 0,
                    actual: 0,
                }
            } else if message.contains("FOREIGN KEY constraint failed") {
                EngineError::InvalidInput(format!("referenced row does not exist: {message}"))
            } else {
                EngineError::Corrupt(format!("database constraint error: {message}"))
            }
        }
        sqlx::Error::RowNotFound => EngineError::NotFound {
            kind: "row".to_string(),
            id: "unknown".to_string(),
        },
        sqlx::Error::PoolTimedOut => EngineError::Busy("connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => EngineError::Corrupt(format!("database I/O error: {io_err}")),
        other => EngineError::Corrupt(format!("database operation failed: {other}")),
    }
}

/// Build the WHERE clause for [`TaskFilter`] using `QueryBuilder` for
/// proper parameter binding.
pub fn push_filter_conditions<'a>(
    qb: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>,
    filter: &'a TaskFilter,
) {
    let mut has_conditions = false;
    let mut and_or_where = |qb: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>, has: &mut bool| {
        qb.push(if *has { " AND " } else { " WHERE " });
        *has = true;
    };

    if let Some(status) = filter.status {
        and_or_where(qb, &mut has_conditions);
        qb.push("status = ");
        qb.push_bind(status_to_string(status));
    }

    if let Some(ref assignee) = filter.assignee {
        and_or_where(qb, &mut has_conditions);
        qb.push("assignee = ");
        qb.push_bind(assignee);
    }

    if let Some(priority) = filter.priority {
        and_or_where(qb, &mut has_conditions);
        qb.push("priority = ");
        qb.push_bind(priority_to_string(priority));
    }

    if let Some(ref tag) = filter.tag {
        and_or_where(qb, &mut has_conditions);
        qb.push("id IN (SELECT task_id FROM task_tags WHERE tag = ");
        qb.push_bind(tag);
        qb.push(")");
    }

    if let Some(has_deps) = filter.has_dependencies {
        and_or_where(qb, &mut has_conditions);
        if has_deps {
            qb.push("id IN (SELECT task_id FROM dependencies)");
        } else {
            qb.push("id NOT IN (SELECT task_id FROM dependencies)");
        }
    }

    if let Some(is_blocked) = filter.is_blocked {
        and_or_where(qb, &mut has_conditions);
        if is_blocked {
            qb.push("status = 'blocked'");
        } else {
            qb.push("status != 'blocked'");
        }
    }
}
