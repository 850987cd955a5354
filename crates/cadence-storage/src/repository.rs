//! [`TaskRepository`] -- task CRUD over any [`RecordStore<Task>`].
//!
//! Every write runs as one read-recompute-validate-write unit inside the
//! store's `transact`, so the done-gate is checked against the latest
//! persisted children. Every read recomputes derived fields before returning.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use cadence_core::enums::TaskStatus;
use cadence_core::idgen::{self, TASK_ID_MAX_LENGTH, TASK_ID_MIN_LENGTH};
use cadence_core::payload::{
    AcceptanceUpdate, NewTask, TaskUpdates, apply_updates, merge_acceptance, replace_dependencies,
};
use cadence_core::propagation::{
    RecomputeReport, build_children, build_subtree, build_trees, done_gate, recompute,
};
use cadence_core::task::{Task, TaskTree};

use crate::error::{Result, StorageError};
use crate::staged::StagedStore;
use crate::traits::RecordStore;

/// Number of nonces tried per id length before growing the id.
const ID_ATTEMPTS_PER_LENGTH: u32 = 10;

/// Tunables for [`TaskRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Prefix for generated task ids.
    pub id_prefix: String,
    /// Tree depth used when the caller does not give one.
    pub default_max_depth: usize,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            id_prefix: "task".into(),
            default_max_depth: 3,
        }
    }
}

/// Persistent collection of tasks with transparent recomputation.
pub struct TaskRepository<S> {
    staged: StagedStore<S, Task>,
    options: RepositoryOptions,
}

impl<S: RecordStore<Task>> TaskRepository<S> {
    /// Creates a repository with default options.
    pub fn new(store: S) -> Self {
        Self::with_options(store, RepositoryOptions::default())
    }

    /// Creates a repository with explicit options.
    pub fn with_options(store: S, options: RepositoryOptions) -> Self {
        Self {
            staged: StagedStore::new(store),
            options,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        self.staged.store()
    }

    /// Returns `true` while writes are held in memory because the store is
    /// read-only.
    pub fn is_degraded(&self) -> bool {
        self.staged.is_degraded()
    }

    // -- Mutations -----------------------------------------------------------

    /// Creates a task and returns it after recomputation.
    ///
    /// A supplied `task_id` that already exists replaces the stored record.
    pub fn create_task(&self, payload: NewTask, actor: &str) -> Result<Task> {
        let prefix = self.options.id_prefix.clone();
        let id = self.mutate(|tasks, now| {
            let requested_id = payload.task_id.clone().filter(|id| !id.is_empty());
            let id = match requested_id {
                Some(id) => id,
                None => generate_task_id(tasks, &prefix, &payload, actor, now),
            };
            let task = payload.clone().into_task(id.clone(), actor, now);
            match tasks.iter().position(|t| t.task_id == id) {
                Some(i) => {
                    warn!(task_id = %id, "task id already exists, replacing record");
                    tasks[i] = task;
                }
                None => tasks.push(task),
            }
            debug!(task_id = %id, actor, "created task");
            Ok(id)
        })?;
        self.cached_task(&id)
    }

    /// Applies a partial update, enforcing the done-gate.
    pub fn update_task(&self, task_id: &str, updates: TaskUpdates, actor: &str) -> Result<Task> {
        self.mutate(|tasks, now| {
            let idx = position_of(tasks, task_id)?;

            let wants_done = updates
                .status
                .as_ref()
                .is_some_and(|s| *s == TaskStatus::Done);
            if wants_done {
                let approved = updates
                    .requested_approval()
                    .unwrap_or(tasks[idx].qa.approved);
                let children: Vec<&Task> = tasks
                    .iter()
                    .filter(|t| t.parent_task_id.as_deref() == Some(task_id) && t.task_id != task_id)
                    .collect();
                done_gate(&children, approved)
                    .map_err(|v| StorageError::invalid_transition(task_id, v.to_string()))?;
            }

            apply_updates(&mut tasks[idx], &updates, actor, now);
            debug!(task_id, actor, "updated task");
            Ok(())
        })?;
        self.cached_task(task_id)
    }

    /// Merges acceptance flags and QA fields.
    pub fn set_acceptance(
        &self,
        task_id: &str,
        update: AcceptanceUpdate,
        actor: &str,
    ) -> Result<Task> {
        self.mutate(|tasks, now| {
            let idx = position_of(tasks, task_id)?;
            merge_acceptance(&mut tasks[idx], &update, actor, now);
            debug!(task_id, actor, approved = tasks[idx].qa.approved, "set acceptance");
            Ok(())
        })?;
        self.cached_task(task_id)
    }

    /// Replaces the dependency list. Ids are neither validated nor checked
    /// for cycles.
    pub fn set_dependencies(
        &self,
        task_id: &str,
        dependency_ids: Vec<String>,
        actor: &str,
    ) -> Result<Task> {
        self.mutate(|tasks, now| {
            let idx = position_of(tasks, task_id)?;
            replace_dependencies(&mut tasks[idx], dependency_ids.clone(), actor, now);
            Ok(())
        })?;
        self.cached_task(task_id)
    }

    // -- Reads ---------------------------------------------------------------

    /// Returns root trees, or the children of `parent_task_id`, truncated at
    /// `max_depth` (default from options).
    pub fn list_tasks(
        &self,
        parent_task_id: Option<&str>,
        max_depth: Option<usize>,
    ) -> Result<Vec<TaskTree>> {
        let tasks = self.snapshot()?;
        let depth = max_depth.unwrap_or(self.options.default_max_depth);
        Ok(match parent_task_id {
            Some(parent) => build_children(&tasks, parent, depth),
            None => build_trees(&tasks, depth),
        })
    }

    /// Returns a single recomputed subtree, or `None` if absent.
    pub fn get_task(&self, task_id: &str, max_depth: Option<usize>) -> Result<Option<TaskTree>> {
        let tasks = self.snapshot()?;
        let depth = max_depth.unwrap_or(self.options.default_max_depth);
        Ok(build_subtree(&tasks, task_id, depth))
    }

    /// Returns every task, recomputed, in storage order.
    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        self.snapshot()
    }

    // -- Internals -----------------------------------------------------------

    /// Runs `op` between two recomputation passes inside one store
    /// transaction.
    fn mutate<R>(
        &self,
        op: impl FnOnce(&mut Vec<Task>, DateTime<Utc>) -> Result<R>,
    ) -> Result<R> {
        let now = Utc::now();
        self.staged
            .mutate(|records| {
                log_report(&recompute(records, now));
                let output = op(records, now)?;
                log_report(&recompute(records, now));
                Ok(output)
            })
            .map_err(into_unavailable)
    }

    /// Loads the current collection and recomputes it.
    fn snapshot(&self) -> Result<Vec<Task>> {
        let mut tasks = self.staged.load().map_err(into_unavailable)?;
        log_report(&recompute(&mut tasks, Utc::now()));
        Ok(tasks)
    }

    fn cached_task(&self, task_id: &str) -> Result<Task> {
        self.staged
            .with_staged(|tasks| tasks.iter().find(|t| t.task_id == task_id).cloned())?
            .ok_or_else(|| StorageError::not_found("task", task_id))
    }
}

/// Caller errors pass through; anything the store raised becomes
/// [`StorageError::Unavailable`].
fn into_unavailable(e: StorageError) -> StorageError {
    match e {
        e if e.is_domain() => e,
        e @ StorageError::Unavailable(_) => e,
        e => StorageError::unavailable(e),
    }
}

impl<S> std::fmt::Debug for TaskRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRepository")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn position_of(tasks: &[Task], task_id: &str) -> Result<usize> {
    tasks
        .iter()
        .position(|t| t.task_id == task_id)
        .ok_or_else(|| StorageError::not_found("task", task_id))
}

/// First unused hash id, starting short and growing one character each
/// time a length's nonces all collide.
fn generate_task_id(
    tasks: &[Task],
    prefix: &str,
    payload: &NewTask,
    actor: &str,
    now: DateTime<Utc>,
) -> String {
    let taken = |id: &str| tasks.iter().any(|t| t.task_id == id);
    for length in TASK_ID_MIN_LENGTH..=TASK_ID_MAX_LENGTH {
        for nonce in 0..ID_ATTEMPTS_PER_LENGTH {
            let candidate = idgen::task_id(
                prefix,
                &payload.title,
                &payload.description,
                actor,
                now,
                length,
                nonce,
            );
            if !taken(&candidate) {
                return candidate;
            }
        }
    }
    let key = format!("{}|{}|{}", payload.title, now.to_rfc3339(), tasks.len());
    idgen::stable_id(prefix, &key, 15)
}

fn log_report(report: &RecomputeReport) {
    for id in &report.cycles_broken {
        warn!(task_id = %id, "parent cycle detected, treating task as root");
    }
    for id in &report.orphans {
        debug!(task_id = %id, "parent missing, treating task as root");
    }
    for id in &report.degraded {
        info!(task_id = %id, "done no longer holds, showing in_progress");
    }
    for id in &report.newly_completed {
        debug!(task_id = %id, "task completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use pretty_assertions::assert_eq;

    /// Refuses every write as read-only, like a store on a read-only mount.
    struct ReadOnlyStore {
        inner: MemoryStore<Task>,
        read_only: std::sync::atomic::AtomicBool,
    }

    impl RecordStore<Task> for ReadOnlyStore {
        fn load(&self) -> Result<Vec<Task>> {
            self.inner.load()
        }

        fn save(&self, records: &[Task]) -> Result<()> {
            if self.read_only.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StorageError::ReadOnly {
                    path: "/ro/tasks.jsonl".into(),
                });
            }
            self.inner.save(records)
        }
    }

    fn repo() -> TaskRepository<MemoryStore<Task>> {
        TaskRepository::new(MemoryStore::new())
    }

    #[test]
    fn create_assigns_prefixed_id() {
        let repo = repo();
        let task = repo.create_task(NewTask::titled("Ship feature"), "alice").unwrap();
        assert!(task.task_id.starts_with("task-"));
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.progress, 0);
        assert_eq!(repo.store().load().unwrap().len(), 1);
    }

    #[test]
    fn identical_payloads_get_distinct_ids() {
        let repo = repo();
        let a = repo.create_task(NewTask::titled("same"), "alice").unwrap();
        let b = repo.create_task(NewTask::titled("same"), "alice").unwrap();
        assert_ne!(a.task_id, b.task_id);
    }

    #[test]
    fn supplied_existing_id_replaces() {
        let repo = repo();
        let mut payload = NewTask::titled("first");
        payload.task_id = Some("task-fixed".into());
        repo.create_task(payload.clone(), "alice").unwrap();
        payload.title = "second".into();
        repo.create_task(payload, "alice").unwrap();

        let all = repo.all_tasks().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "second");
    }

    #[test]
    fn update_unknown_is_not_found() {
        let repo = repo();
        let err = repo
            .update_task("task-nope", TaskUpdates::default(), "alice")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn leaf_done_is_not_gated_but_waits_for_qa() {
        let repo = repo();
        let task = repo.create_task(NewTask::titled("leaf"), "alice").unwrap();
        let task = repo
            .update_task(&task.task_id, TaskUpdates::status(TaskStatus::Done), "alice")
            .unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);

        let task = repo
            .set_acceptance(&task.task_id, AcceptanceUpdate::approval(true), "qa")
            .unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn dependencies_are_stored_without_validation() {
        let repo = repo();
        let task = repo.create_task(NewTask::titled("a"), "alice").unwrap();
        let task = repo
            .set_dependencies(
                &task.task_id,
                vec!["task-missing".into(), task.task_id.clone()],
                "alice",
            )
            .unwrap();
        assert_eq!(task.dependencies.len(), 2);
        assert_eq!(task.status, TaskStatus::Todo);
    }

    #[test]
    fn list_unknown_parent_is_empty() {
        let repo = repo();
        repo.create_task(NewTask::titled("root"), "alice").unwrap();
        assert!(repo.list_tasks(Some("task-nope"), None).unwrap().is_empty());
        assert_eq!(repo.list_tasks(None, None).unwrap().len(), 1);
        assert!(repo.get_task("task-nope", None).unwrap().is_none());
    }

    #[test]
    fn generated_ids_grow_past_taken_short_ids() {
        let now = Utc::now();
        let payload = NewTask {
            title: "Write docs".into(),
            ..NewTask::default()
        };
        let first = generate_task_id(&[], "t", &payload, "alice", now);
        assert_eq!(first.len(), "t-".len() + TASK_ID_MIN_LENGTH);

        let taken: Vec<Task> = (0..ID_ATTEMPTS_PER_LENGTH)
            .map(|nonce| {
                let id = idgen::task_id("t", "Write docs", "", "alice", now, TASK_ID_MIN_LENGTH, nonce);
                payload.clone().into_task(id, "alice", now)
            })
            .collect();
        let next = generate_task_id(&taken, "t", &payload, "alice", now);
        assert_eq!(next.len(), "t-".len() + TASK_ID_MIN_LENGTH + 1);
        assert!(taken.iter().all(|t| t.task_id != next));
    }

    #[test]
    fn read_only_store_keeps_state_in_memory() {
        let store = ReadOnlyStore {
            inner: MemoryStore::new(),
            read_only: std::sync::atomic::AtomicBool::new(true),
        };
        let repo = TaskRepository::new(store);

        let a = repo.create_task(NewTask::titled("a"), "alice").unwrap();
        assert!(repo.is_degraded());
        let b = repo.create_task(NewTask::titled("b"), "alice").unwrap();
        assert!(repo.store().inner.load().unwrap().is_empty());

        let listed = repo.list_tasks(None, None).unwrap();
        assert_eq!(listed.len(), 2);

        // Writable again: the next mutation persists everything held in memory.
        repo.store()
            .read_only
            .store(false, std::sync::atomic::Ordering::SeqCst);
        repo.update_task(&a.task_id, TaskUpdates::status(TaskStatus::InProgress), "alice")
            .unwrap();
        assert!(!repo.is_degraded());
        let persisted = repo.store().inner.load().unwrap();
        let ids: Vec<&str> = persisted.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec![a.task_id.as_str(), b.task_id.as_str()]);
    }
}
