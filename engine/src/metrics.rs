use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchestrator_core::{
    models::{Task, TaskFilter, TaskStatus},
    store::Store,
    Result,
};

use crate::telemetry::TelemetryLog;

/// A result set may be capped server-side; a scan this wide is
/// effectively "all tasks" for any workspace this engine is sized for.
const METRICS_SCAN_LIMIT: u32 = 10_000;

/// An optional `[since, until]` bound applied to `created_at` (for
/// tasks) and `timestamp` (for telemetry events) before aggregating.
/// Both bounds are inclusive; either or both may be omitted to leave
/// that side of the window open.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let after_since = match self.since {
            Some(s) => ts >= s,
            None => true,
        };
        let before_until = match self.until {
            Some(u) => ts <= u,
            None => true,
        };
        after_since && before_until
    }
}

/// Per-assignee rollup of task counts and completion statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssigneeMetrics {
    pub assignee: String,
    pub assigned: u64,
    pub completed: u64,
    pub avg_feedback_quality: Option<f64>,
    pub avg_feedback_timeliness: Option<f64>,
}

/// The aggregate report returned by the `metrics` operation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsReport {
    pub tasks_considered: u64,
    pub completed: u64,
    pub completion_rate: f64,
    pub on_time_eligible: u64,
    pub on_time_delivered: u64,
    pub on_time_rate: f64,
    pub avg_feedback_quality: Option<f64>,
    pub avg_feedback_timeliness: Option<f64>,
    pub per_assignee: Vec<AssigneeMetrics>,
    pub operation_count: u64,
    pub operation_failure_count: u64,
}

#[derive(Default)]
struct Accumulator {
    assigned: u64,
    completed: u64,
    quality_sum: i64,
    quality_n: u64,
    timeliness_sum: i64,
    timeliness_n: u64,
}

/// Aggregate completion rate, feedback averages, on-time delivery, and
/// per-assignee statistics over `window`, drawing on the task store for
/// task-level facts and `telemetry` for operation counts. Telemetry
/// reads are best-effort: a missing or unreadable log yields zero
/// operation counts rather than failing the whole report.
pub async fn compute(store: &dyn Store, telemetry: &TelemetryLog, window: TimeWindow) -> Result<MetricsReport> {
    let tasks = store.list(&TaskFilter { limit: Some(METRICS_SCAN_LIMIT), ..Default::default() }).await?;
    let in_window: Vec<&Task> = tasks.iter().filter(|t| window.contains(t.created_at)).collect();

    let tasks_considered = in_window.len() as u64;
    let completed = in_window.iter().filter(|t| t.status == TaskStatus::Completed).count() as u64;
    let completion_rate = if tasks_considered == 0 { 0.0 } else { completed as f64 / tasks_considered as f64 };

    let mut on_time_eligible = 0u64;
    let mut on_time_delivered = 0u64;
    let mut quality_sum = 0i64;
    let mut quality_n = 0u64;
    let mut timeliness_sum = 0i64;
    let mut timeliness_n = 0u64;
    let mut by_assignee: HashMap<String, Accumulator> = HashMap::new();

    for task in &in_window {
        if let (Some(deadline), Some(completed_at)) = (task.deadline, task.completed_at) {
            on_time_eligible += 1;
            if completed_at <= deadline {
                on_time_delivered += 1;
            }
        }
        if let Some(q) = task.feedback_quality {
            quality_sum += q as i64;
            quality_n += 1;
        }
        if let Some(t) = task.feedback_timeliness {
            timeliness_sum += t as i64;
            timeliness_n += 1;
        }

        if let Some(assignee) = &task.assignee {
            let entry = by_assignee.entry(assignee.clone()).or_default();
            entry.assigned += 1;
            if task.status == TaskStatus::Completed {
                entry.completed += 1;
            }
            if let Some(q) = task.feedback_quality {
                entry.quality_sum += q as i64;
                entry.quality_n += 1;
            }
            if let Some(t) = task.feedback_timeliness {
                entry.timeliness_sum += t as i64;
                entry.timeliness_n += 1;
            }
        }
    }

    let mut per_assignee: Vec<AssigneeMetrics> = by_assignee
        .into_iter()
        .map(|(assignee, acc)| AssigneeMetrics {
            assignee,
            assigned: acc.assigned,
            completed: acc.completed,
            avg_feedback_quality: average(acc.quality_sum, acc.quality_n),
            avg_feedback_timeliness: average(acc.timeliness_sum, acc.timeliness_n),
        })
        .collect();
    per_assignee.sort_by(|a, b| a.assignee.cmp(&b.assignee));

    let events = telemetry.read_all().unwrap_or_default();
    let events_in_window: Vec<_> = events.into_iter().filter(|e| window.contains(e.timestamp)).collect();
    let operation_count = events_in_window.len() as u64;
    let operation_failure_count = events_in_window.iter().filter(|e| e.outcome != "ok").count() as u64;

    Ok(MetricsReport {
        tasks_considered,
        completed,
        completion_rate,
        on_time_eligible,
        on_time_delivered,
        on_time_rate: if on_time_eligible == 0 { 0.0 } else { on_time_delivered as f64 / on_time_eligible as f64 },
        avg_feedback_quality: average(quality_sum, quality_n),
        avg_feedback_timeliness: average(timeliness_sum, timeliness_n),
        per_assignee,
        operation_count,
        operation_failure_count,
    })
}

fn average(sum: i64, n: u64) -> Option<f64> {
    if n == 0 {
        None
    } else {
        Some(sum as f64 / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryEvent;
    use orchestrator_core::models::NewTask;
    use tempfile::tempdir;

    async fn store_with(tasks: Vec<(NewTask, Option<&str>)>) -> orchestrator_mocks::InMemoryStore {
        let store = orchestrator_mocks::InMemoryStore::new();
        for (task, completed_by_feedback) in tasks {
            let created = store.create(task, &"alice".to_string()).await.unwrap();
            if completed_by_feedback.is_some() {
                store.complete(&created.id, None).await.unwrap();
            }
        }
        store
    }

    fn sample_task(title: &str, assignee: Option<&str>) -> NewTask {
        NewTask { title: title.to_string(), assignee: assignee.map(str::to_string), ..Default::default() }
    }

    #[tokio::test]
    async fn completion_rate_over_all_tasks() {
        let store = store_with(vec![
            (sample_task("a", Some("alice")), Some("done")),
            (sample_task("b", Some("alice")), None),
        ])
        .await;
        let dir = tempdir().unwrap();
        let telemetry = TelemetryLog::new(dir.path().join("events.log"));

        let report = compute(&store, &telemetry, TimeWindow::default()).await.unwrap();
        assert_eq!(report.tasks_considered, 2);
        assert_eq!(report.completed, 1);
        assert!((report.completion_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn per_assignee_rollup_groups_correctly() {
        let store = store_with(vec![
            (sample_task("a", Some("alice")), Some("done")),
            (sample_task("b", Some("bob")), None),
        ])
        .await;
        let dir = tempdir().unwrap();
        let telemetry = TelemetryLog::new(dir.path().join("events.log"));

        let report = compute(&store, &telemetry, TimeWindow::default()).await.unwrap();
        assert_eq!(report.per_assignee.len(), 2);
        let alice = report.per_assignee.iter().find(|a| a.assignee == "alice").unwrap();
        assert_eq!(alice.assigned, 1);
        assert_eq!(alice.completed, 1);
    }

    #[tokio::test]
    async fn operation_count_reflects_telemetry_log() {
        let store = store_with(vec![]).await;
        let dir = tempdir().unwrap();
        let telemetry = TelemetryLog::new(dir.path().join("events.log"));
        telemetry.append(&TelemetryEvent {
            timestamp: Utc::now(),
            operation: "add".to_string(),
            agent_id: Some("alice".to_string()),
            task_id: None,
            outcome: "ok".to_string(),
            duration_ms: Some(5),
        });
        telemetry.append(&TelemetryEvent {
            timestamp: Utc::now(),
            operation: "add".to_string(),
            agent_id: Some("alice".to_string()),
            task_id: None,
            outcome: "error".to_string(),
            duration_ms: Some(5),
        });

        let report = compute(&store, &telemetry, TimeWindow::default()).await.unwrap();
        assert_eq!(report.operation_count, 2);
        assert_eq!(report.operation_failure_count, 1);
    }

    #[tokio::test]
    async fn missing_telemetry_log_yields_zero_counts_not_an_error() {
        let store = store_with(vec![]).await;
        let dir = tempdir().unwrap();
        let telemetry = TelemetryLog::new(dir.path().join("missing.log"));

        let report = compute(&store, &telemetry, TimeWindow::default()).await.unwrap();
        assert_eq!(report.operation_count, 0);
    }
}
