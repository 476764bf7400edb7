//! Integration tests for the mocks crate.
//!
//! Exercises the builders, fixtures, assertions, and `InMemoryStore`
//! together the way a consumer crate (`engine`) would, rather than
//! unit-testing each module in isolation.

use orchestrator_core::error::EngineError;
use orchestrator_core::models::{ContextKind, NewTask, Priority, TaskFilter, TaskStatus};
use orchestrator_core::store::Store;
use orchestrator_mocks::*;

#[tokio::test]
async fn store_create_and_get_round_trip() {
    let store = InMemoryStore::new();

    let new_task = create_new_task();
    let task = store.create(new_task, &"alice".to_string()).await.unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.title, "New test task");

    let retrieved = store.get(&task.id).await.unwrap();
    assert_eq!(retrieved.id, task.id);

    assert_eq!(store.call_history(), vec!["create".to_string(), "get".to_string()]);
}

#[tokio::test]
async fn store_error_injection_fires_once() {
    let store = InMemoryStore::new();

    store.inject_error("get", EngineError::not_found("task", "ffffffff".to_string()));

    let result = store.get(&"ffffffff".to_string()).await;
    assert!(result.is_err());
    assert!(matches!(result.unwrap_err(), EngineError::NotFound { .. }));

    // the injected error only fires once; the retry hits the real store.
    let task = store.create(create_new_task(), &"alice".to_string()).await.unwrap();
    let retried = store.get(&task.id).await;
    assert!(retried.is_ok());
}

#[tokio::test]
async fn store_status_transitions_are_validated() {
    let store = InMemoryStore::new();
    let task = store.create(create_new_task(), &"alice".to_string()).await.unwrap();

    let in_progress = store.set_status(&task.id, TaskStatus::InProgress).await.unwrap();
    assert_eq!(in_progress.status, TaskStatus::InProgress);

    let result = store.set_status(&task.id, TaskStatus::Blocked).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn fixtures_cover_every_status() {
    let tasks = create_tasks_in_all_statuses();

    assert_eq!(tasks.len(), 5);
    let statuses: Vec<_> = tasks.iter().map(|t| t.status).collect();
    assert!(statuses.contains(&TaskStatus::Pending));
    assert!(statuses.contains(&TaskStatus::InProgress));
    assert!(statuses.contains(&TaskStatus::Blocked));
    assert!(statuses.contains(&TaskStatus::Completed));
    assert!(statuses.contains(&TaskStatus::Cancelled));

    let completed: Vec<_> = tasks.iter().filter(|t| t.status == TaskStatus::Completed).collect();
    assert!(completed[0].completed_at.is_some());
}

#[tokio::test]
async fn builders_construct_a_task_with_overrides() {
    let task = TaskBuilder::new()
        .with_id("deadbeef")
        .with_title("Built task")
        .with_status(TaskStatus::InProgress)
        .with_assignee("builder-agent")
        .build();

    assert_eq!(task.id, "deadbeef");
    assert_eq!(task.title, "Built task");
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.assignee.as_deref(), Some("builder-agent"));
}

#[tokio::test]
async fn assertions_task_matcher_checks_partial_fields() {
    let task = create_test_task_with_assignee("carol");

    let matcher = TaskMatcher::new().with_assignee("carol").with_status(TaskStatus::Pending);
    assert_task_matches(&task, &matcher);
}

#[tokio::test]
#[should_panic(expected = "task titles don't match")]
async fn assertions_task_equals_panics_on_mismatch() {
    let mut a = create_test_task();
    let b = a.clone();
    a.title = "a different title".to_string();
    assert_task_equals(&a, &b);
}

#[tokio::test]
async fn assertions_status_transitions() {
    assert_status_transition_valid(TaskStatus::Pending, TaskStatus::InProgress);
    assert_status_transition_valid(TaskStatus::InProgress, TaskStatus::Completed);
    assert_status_transition_invalid(TaskStatus::Completed, TaskStatus::InProgress);
    assert_status_transition_invalid(TaskStatus::Cancelled, TaskStatus::InProgress);
}

#[tokio::test]
async fn store_concurrent_creates_all_succeed_with_unique_ids() {
    use std::sync::Arc;
    use tokio::task::JoinSet;

    let store = Arc::new(InMemoryStore::new());
    let mut set = JoinSet::new();

    for i in 0..10 {
        let store = store.clone();
        set.spawn(async move {
            let task = create_new_task_with_title(&format!("concurrent-{i}"));
            store.create(task, &"alice".to_string()).await.unwrap()
        });
    }

    let mut tasks = Vec::new();
    while let Some(result) = set.join_next().await {
        tasks.push(result.unwrap());
    }

    assert_eq!(tasks.len(), 10);
    let mut ids: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn store_stats_reflect_seeded_fixture_statuses() {
    let tasks = create_tasks_in_all_statuses();
    let store = InMemoryStore::with_tasks(tasks);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.cancelled, 1);
}

#[tokio::test]
async fn dependency_chain_fixture_blocks_and_cascades_through_the_store() {
    let store = InMemoryStore::new();
    let stubs = dependency_chain(5);

    let mut ids = Vec::with_capacity(stubs.len());
    let mut previous: Option<String> = None;
    for mut stub in stubs {
        if let Some(prev) = &previous {
            stub.depends_on.push(prev.clone());
        }
        let created = store.create(stub, &"alice".to_string()).await.unwrap();
        previous = Some(created.id.clone());
        ids.push(created.id);
    }

    // every task but the first starts blocked on its predecessor.
    for id in &ids[1..] {
        assert_eq!(store.get(id).await.unwrap().status, TaskStatus::Blocked);
    }

    for id in &ids[..ids.len() - 1] {
        store.set_status(id, TaskStatus::InProgress).await.unwrap();
        store.complete(id, None).await.unwrap();
    }

    assert_eq!(store.get(ids.last().unwrap()).await.unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn private_notes_stay_invisible_to_other_agents_through_the_store() {
    let store = InMemoryStore::new();
    let task = store.create(create_new_task(), &"alice".to_string()).await.unwrap();

    store.add_note(&task.id, &"alice".to_string(), "scratch reasoning".to_string()).await.unwrap();
    store
        .add_context(&task.id, &"alice".to_string(), ContextKind::Share, "handoff notes".to_string())
        .await
        .unwrap();

    let shared = store.list_context(&task.id).await.unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].text, "handoff notes");

    let bobs_notes = store.list_notes(&task.id, &"bob".to_string()).await.unwrap();
    assert!(bobs_notes.is_empty());
}

#[tokio::test]
async fn list_filter_respects_priority_then_created_at_ordering() {
    let store = InMemoryStore::new();
    store
        .create(NewTask { title: "low priority".to_string(), ..create_new_task() }, &"alice".to_string())
        .await
        .unwrap();
    let urgent = store
        .create(
            NewTask { title: "urgent".to_string(), priority: Priority::Critical, ..create_new_task() },
            &"alice".to_string(),
        )
        .await
        .unwrap();

    let listed = store.list(&TaskFilter::default()).await.unwrap();
    assert_eq!(listed[0].id, urgent.id);
    assert_tasks_sorted_by_priority_then_created_at(&listed);
}
