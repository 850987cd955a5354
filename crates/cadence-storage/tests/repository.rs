//! End-to-end repository behaviour over the file-backed stores.

use cadence_core::enums::{ScheduleEventKind, TaskStatus};
use cadence_core::payload::{AcceptanceUpdate, ChecklistInput, NewTask, QaUpdate, TaskUpdates};
use cadence_core::task::Task;
use cadence_storage::{JsonlStore, RecordStore, SqliteStore, StorageError, TaskRepository};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn jsonl_repo(dir: &TempDir) -> TaskRepository<JsonlStore<Task>> {
    TaskRepository::new(JsonlStore::in_dir(dir.path()))
}

fn sqlite_repo(dir: &TempDir) -> TaskRepository<SqliteStore<Task>> {
    TaskRepository::new(SqliteStore::open(dir.path().join("cadence.db")).unwrap())
}

/// Root with two todo children.
fn ship_feature<S: RecordStore<Task>>(repo: &TaskRepository<S>) -> (String, String, String) {
    let root = repo.create_task(NewTask::titled("Ship feature"), "alice").unwrap();
    let a = repo
        .create_task(NewTask::titled("Write code").under(&root.task_id), "alice")
        .unwrap();
    let b = repo
        .create_task(NewTask::titled("Write docs").under(&root.task_id), "alice")
        .unwrap();
    (root.task_id, a.task_id, b.task_id)
}

fn finish_child<S: RecordStore<Task>>(repo: &TaskRepository<S>, id: &str) {
    repo.update_task(id, TaskUpdates::status(TaskStatus::Done), "alice")
        .unwrap();
    let child = repo
        .set_acceptance(id, AcceptanceUpdate::approval(true), "qa")
        .unwrap();
    assert_eq!(child.status, TaskStatus::Done);
}

fn mark_done_approved() -> TaskUpdates {
    TaskUpdates {
        status: Some(TaskStatus::Done),
        qa: Some(QaUpdate::approval(true)),
        ..TaskUpdates::default()
    }
}

fn run_scenarios<S: RecordStore<Task>>(repo: &TaskRepository<S>) {
    // Scenario A: children still todo.
    let (root, a, b) = ship_feature(repo);
    let err = repo
        .update_task(&root, TaskUpdates::status(TaskStatus::Done), "alice")
        .unwrap_err();
    match &err {
        StorageError::InvalidTransition { id, reason } => {
            assert_eq!(id, &root);
            assert!(reason.contains("subtasks incomplete"), "reason: {reason}");
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    // The refused request left nothing behind.
    let tree = repo.get_task(&root, None).unwrap().unwrap();
    assert_eq!(tree.task.status, TaskStatus::Todo);
    assert_eq!(tree.children.len(), 2);

    // Scenario B: children done and approved, root approved in the same call.
    finish_child(repo, &a);
    finish_child(repo, &b);
    let done = repo.update_task(&root, mark_done_approved(), "alice").unwrap();
    assert_eq!(done.status, TaskStatus::Done);
    assert_eq!(done.progress, 100);
    let completed_at = done.audit.completed_at;
    assert!(completed_at.is_some());

    // Scenario C: revoke one child's QA; root degrades on the next read.
    repo.set_acceptance(&a, AcceptanceUpdate::approval(false), "qa")
        .unwrap();
    let tree = repo.get_task(&root, None).unwrap().unwrap();
    assert_eq!(tree.task.status, TaskStatus::InProgress);
    assert_eq!(tree.task.audit.completed_at, completed_at);
    assert!(tree.task.progress < 100);
}

#[test]
fn scenarios_on_jsonl() {
    let dir = TempDir::new().unwrap();
    run_scenarios(&jsonl_repo(&dir));
}

#[test]
fn scenarios_on_sqlite() {
    let dir = TempDir::new().unwrap();
    run_scenarios(&sqlite_repo(&dir));
}

#[test]
fn done_gate_requires_own_qa() {
    let dir = TempDir::new().unwrap();
    let repo = jsonl_repo(&dir);
    let (root, a, b) = ship_feature(&repo);
    finish_child(&repo, &a);
    finish_child(&repo, &b);

    let err = repo
        .update_task(&root, TaskUpdates::status(TaskStatus::Done), "alice")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("invalid transition for {root}: QA not approved")
    );

    // Approval stored beforehand satisfies the gate.
    repo.set_acceptance(&root, AcceptanceUpdate::approval(true), "qa")
        .unwrap();
    let done = repo
        .update_task(&root, TaskUpdates::status(TaskStatus::Done), "alice")
        .unwrap();
    assert_eq!(done.status, TaskStatus::Done);
}

#[test]
fn done_gate_rejects_child_done_without_qa() {
    let dir = TempDir::new().unwrap();
    let repo = jsonl_repo(&dir);
    let (root, a, b) = ship_feature(&repo);
    finish_child(&repo, &a);
    repo.update_task(&b, TaskUpdates::status(TaskStatus::Done), "alice")
        .unwrap();

    let err = repo.update_task(&root, mark_done_approved(), "alice").unwrap_err();
    assert!(err.is_invalid_transition());
    assert!(err.to_string().contains(&b));
}

#[test]
fn blocked_leaf_blocks_every_ancestor() {
    let dir = TempDir::new().unwrap();
    let repo = sqlite_repo(&dir);
    let root = repo.create_task(NewTask::titled("root"), "alice").unwrap();
    let mid = repo
        .create_task(NewTask::titled("mid").under(&root.task_id), "alice")
        .unwrap();
    let leaf = repo
        .create_task(NewTask::titled("leaf").under(&mid.task_id), "alice")
        .unwrap();

    repo.update_task(&leaf.task_id, TaskUpdates::status(TaskStatus::Blocked), "alice")
        .unwrap();

    let tree = repo.get_task(&root.task_id, Some(5)).unwrap().unwrap();
    assert_eq!(tree.task.status, TaskStatus::Blocked);
    assert_eq!(tree.children[0].task.status, TaskStatus::Blocked);
    assert_eq!(tree.children[0].children[0].task.status, TaskStatus::Blocked);
}

#[test]
fn schedule_changes_append_exactly_one_entry() {
    let dir = TempDir::new().unwrap();
    let repo = jsonl_repo(&dir);
    let task = repo.create_task(NewTask::titled("call"), "alice").unwrap();

    repo.update_task(
        &task.task_id,
        TaskUpdates {
            title: Some("call supplier".into()),
            ..TaskUpdates::default()
        },
        "alice",
    )
    .unwrap();

    let moved = repo
        .update_task(
            &task.task_id,
            TaskUpdates {
                scheduled_date: Some(Some("2025-06-02".into())),
                timezone: Some(Some("Europe/Madrid".into())),
                schedule_note: Some("supplier asked for Monday".into()),
                ..TaskUpdates::default()
            },
            "bob",
        )
        .unwrap();

    assert_eq!(moved.schedule_log.len(), 1);
    let entry = &moved.schedule_log[0];
    assert_eq!(entry.kind, ScheduleEventKind::ScheduleUpdate);
    assert_eq!(entry.from.scheduled_date, None);
    assert_eq!(entry.to.scheduled_date.as_deref(), Some("2025-06-02"));
    assert_eq!(entry.to.timezone.as_deref(), Some("Europe/Madrid"));
    assert_eq!(entry.updated_by.as_deref(), Some("bob"));
    assert_eq!(moved.audit.updated_by.as_deref(), Some("bob"));

    // Reloaded from disk, the entry is intact.
    let reloaded = JsonlStore::<Task>::in_dir(dir.path()).load().unwrap();
    assert_eq!(reloaded[0].schedule_log, moved.schedule_log);
}

#[test]
fn checklist_shorthand_drives_progress() {
    let dir = TempDir::new().unwrap();
    let repo = jsonl_repo(&dir);
    let mut payload = NewTask::titled("release");
    payload.checklist = vec![
        ChecklistInput::from("tag"),
        ChecklistInput::from("build"),
        ChecklistInput::Item {
            id: None,
            label: "announce".into(),
            checked: true,
            order: None,
        },
        ChecklistInput::from("publish"),
    ];
    let task = repo.create_task(payload, "alice").unwrap();
    assert_eq!(task.checklist.len(), 4);
    assert_eq!(task.progress, 25);

    let started = repo
        .update_task(&task.task_id, TaskUpdates::status(TaskStatus::InProgress), "alice")
        .unwrap();
    assert_eq!(started.progress, 25);
}

#[test]
fn list_truncates_at_max_depth() {
    let dir = TempDir::new().unwrap();
    let repo = jsonl_repo(&dir);
    let root = repo.create_task(NewTask::titled("root"), "alice").unwrap();
    let child = repo
        .create_task(NewTask::titled("child").under(&root.task_id), "alice")
        .unwrap();
    repo.create_task(NewTask::titled("grandchild").under(&child.task_id), "alice")
        .unwrap();

    let one = repo.list_tasks(None, Some(1)).unwrap();
    assert_eq!(one.len(), 1);
    assert!(one[0].children.is_empty());

    let full = repo.list_tasks(None, None).unwrap();
    assert_eq!(full[0].children[0].children.len(), 1);

    let under = repo.list_tasks(Some(&root.task_id), Some(1)).unwrap();
    assert_eq!(under.len(), 1);
    assert_eq!(under[0].task.task_id, child.task_id);
    assert!(under[0].children.is_empty());
}

#[test]
fn repositories_share_state_through_the_store() {
    let dir = TempDir::new().unwrap();
    let first = jsonl_repo(&dir);
    let second = jsonl_repo(&dir);

    let task = first.create_task(NewTask::titled("shared"), "alice").unwrap();
    let seen = second.get_task(&task.task_id, None).unwrap();
    assert_eq!(seen.map(|t| t.task.title), Some("shared".to_string()));
}

#[test]
fn unknown_status_is_refused_and_stored_status_kept() {
    let dir = TempDir::new().unwrap();
    let repo = jsonl_repo(&dir);
    let task = repo.create_task(NewTask::titled("deploy"), "alice").unwrap();
    repo.update_task(&task.task_id, TaskUpdates::status(TaskStatus::InProgress), "alice")
        .unwrap();

    assert!("finished".parse::<TaskStatus>().is_err());
    let payload = serde_json::from_str::<TaskUpdates>(r#"{"status": "finished"}"#);
    assert!(payload.is_err());

    let stored = repo.get_task(&task.task_id, None).unwrap().unwrap();
    assert_eq!(stored.task.status, TaskStatus::InProgress);
}
