//! Status propagation: derives `status`, `progress` and `completed_at` for
//! every task from its children, checklist and QA state.
//!
//! [`recompute`] is a pure function over the whole task set. It never fails;
//! structural anomalies (cycles in `parent_task_id`, orphans, degraded `done`
//! nodes) are reported in a [`RecomputeReport`] for the caller to log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::enums::TaskStatus;
use crate::task::{Task, TaskTree, percent};

/// Minimum progress shown for a leaf that is in progress.
pub const IN_PROGRESS_FLOOR: u8 = 25;

/// Anomalies and transitions observed during one recomputation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    /// Tasks promoted to roots to break a `parent_task_id` cycle.
    pub cycles_broken: Vec<String>,
    /// Tasks whose parent does not exist.
    pub orphans: Vec<String>,
    /// Tasks that were `done` before this pass and no longer are.
    pub degraded: Vec<String>,
    /// Tasks whose `completed_at` was stamped in this pass.
    pub newly_completed: Vec<String>,
}

impl RecomputeReport {
    /// Returns `true` when nothing noteworthy happened.
    pub fn is_clean(&self) -> bool {
        self.cycles_broken.is_empty()
            && self.orphans.is_empty()
            && self.degraded.is_empty()
            && self.newly_completed.is_empty()
    }
}

/// Parent/child structure of a task slice, with cycles already broken.
///
/// Indices refer to positions in the slice the forest was built from.
#[derive(Debug, Clone)]
pub struct TaskForest {
    /// Root indices in slice order: true roots, orphans, then cycle breakers.
    pub roots: Vec<usize>,
    /// Tree children per task, in slice order.
    pub children: Vec<Vec<usize>>,
    /// Every index exactly once, children before parents.
    pub post_order: Vec<usize>,
    cycles_broken: Vec<usize>,
    orphans: Vec<usize>,
}

impl TaskForest {
    /// Builds the forest for `tasks`.
    pub fn build(tasks: &[Task]) -> Self {
        let index: std::collections::HashMap<&str, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.task_id.as_str(), i))
            .collect();

        let mut links: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
        let mut roots = Vec::new();
        let mut orphans = Vec::new();
        for (i, task) in tasks.iter().enumerate() {
            match task.parent_task_id.as_deref().filter(|p| !p.is_empty()) {
                None => roots.push(i),
                Some(parent) => match index.get(parent) {
                    Some(&p) => links[p].push(i),
                    None => {
                        orphans.push(i);
                        roots.push(i);
                    }
                },
            }
        }

        let mut forest = Self {
            roots: Vec::new(),
            children: vec![Vec::new(); tasks.len()],
            post_order: Vec::with_capacity(tasks.len()),
            cycles_broken: Vec::new(),
            orphans,
        };
        let mut visited = vec![false; tasks.len()];

        for root in roots {
            forest.walk(root, &links, &mut visited);
            forest.roots.push(root);
        }

        // Whatever is left is only reachable through a cycle. Promote the
        // first unvisited node of each cycle to a root.
        for i in 0..tasks.len() {
            if !visited[i] {
                forest.cycles_broken.push(i);
                forest.walk(i, &links, &mut visited);
                forest.roots.push(i);
            }
        }

        forest
    }

    /// Iterative post-order DFS from `root`, recording tree edges.
    fn walk(&mut self, root: usize, links: &[Vec<usize>], visited: &mut [bool]) {
        visited[root] = true;
        let mut stack = vec![(root, 0usize)];
        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            if next < links[node].len() {
                top.1 += 1;
                let child = links[node][next];
                if !visited[child] {
                    visited[child] = true;
                    self.children[node].push(child);
                    stack.push((child, 0));
                }
            } else {
                self.post_order.push(node);
                stack.pop();
            }
        }
    }
}

/// Recomputes derived fields of every task in place.
///
/// Records that have never had a requested status adopt their stored status
/// as the request first, so repeated passes are stable.
pub fn recompute(tasks: &mut [Task], now: DateTime<Utc>) -> RecomputeReport {
    let forest = TaskForest::build(tasks);
    let mut report = RecomputeReport {
        cycles_broken: forest
            .cycles_broken
            .iter()
            .map(|&i| tasks[i].task_id.clone())
            .collect(),
        orphans: forest
            .orphans
            .iter()
            .map(|&i| tasks[i].task_id.clone())
            .collect(),
        ..RecomputeReport::default()
    };

    for &i in &forest.post_order {
        let requested = tasks[i].requested();
        if tasks[i].requested_status.is_none() {
            tasks[i].requested_status = Some(requested.clone());
        }

        let kids = &forest.children[i];
        let (status, progress) = if kids.is_empty() {
            derive_leaf(&tasks[i], &requested)
        } else {
            let states: Vec<(&TaskStatus, u8)> = kids
                .iter()
                .map(|&c| (&tasks[c].status, tasks[c].progress))
                .collect();
            derive_parent(&tasks[i], &requested, &states)
        };

        let task = &mut tasks[i];
        if task.status == TaskStatus::Done && status != TaskStatus::Done {
            report.degraded.push(task.task_id.clone());
        }
        if status == TaskStatus::Done && task.audit.completed_at.is_none() {
            task.audit.completed_at = Some(now);
            report.newly_completed.push(task.task_id.clone());
        }
        task.status = status;
        task.progress = progress;
    }

    report
}

fn derive_leaf(task: &Task, requested: &TaskStatus) -> (TaskStatus, u8) {
    let status = match requested {
        TaskStatus::Done if task.qa.approved => TaskStatus::Done,
        TaskStatus::Done => TaskStatus::InProgress,
        other => other.clone(),
    };
    let progress = match status {
        TaskStatus::Done => 100,
        TaskStatus::InProgress => task
            .checklist_progress()
            .unwrap_or(0)
            .max(IN_PROGRESS_FLOOR),
        _ => task.checklist_progress().unwrap_or(0),
    };
    (status, progress)
}

fn derive_parent(
    task: &Task,
    requested: &TaskStatus,
    children: &[(&TaskStatus, u8)],
) -> (TaskStatus, u8) {
    let all_done = children.iter().all(|(s, _)| **s == TaskStatus::Done);
    let any_blocked = children.iter().any(|(s, _)| **s == TaskStatus::Blocked);
    let any_started = children.iter().any(|(s, _)| s.is_started());

    let status = if *requested == TaskStatus::Done && all_done && task.qa.approved {
        TaskStatus::Done
    } else if any_blocked {
        TaskStatus::Blocked
    } else {
        match requested {
            TaskStatus::Done | TaskStatus::InProgress => TaskStatus::InProgress,
            TaskStatus::Blocked => TaskStatus::Blocked,
            _ if any_started => TaskStatus::InProgress,
            _ => TaskStatus::Todo,
        }
    };

    let progress = if status == TaskStatus::Done {
        100
    } else {
        let sum: usize = children.iter().map(|(_, p)| *p as usize).sum();
        let average = percent(sum, children.len() * 100);
        average.max(task.checklist_progress().unwrap_or(0))
    };
    (status, progress)
}

// ---------------------------------------------------------------------------
// Done-gate
// ---------------------------------------------------------------------------

/// Reason a requested `done` transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateViolation {
    #[error("subtasks incomplete: {}", .pending.join(", "))]
    SubtasksIncomplete { pending: Vec<String> },

    #[error("QA not approved")]
    QaNotApproved,
}

/// Validates a requested transition to `done` for a task with `children`.
///
/// `children` must carry freshly derived status. Tasks without children are
/// not gated. `approved` is the task's QA approval after the update applies.
pub fn done_gate(children: &[&Task], approved: bool) -> Result<(), GateViolation> {
    if children.is_empty() {
        return Ok(());
    }
    let pending: Vec<String> = children
        .iter()
        .filter(|c| c.status != TaskStatus::Done || !c.qa.approved)
        .map(|c| c.task_id.clone())
        .collect();
    if !pending.is_empty() {
        return Err(GateViolation::SubtasksIncomplete { pending });
    }
    if !approved {
        return Err(GateViolation::QaNotApproved);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tree views
// ---------------------------------------------------------------------------

/// Returns the top-level trees, truncated at `max_depth` levels.
///
/// Top-level nodes are level 1; a `max_depth` of 0 is treated as 1.
pub fn build_trees(tasks: &[Task], max_depth: usize) -> Vec<TaskTree> {
    let forest = TaskForest::build(tasks);
    forest
        .roots
        .iter()
        .map(|&r| tree_node(tasks, &forest, r, 1, max_depth.max(1)))
        .collect()
}

/// Returns the subtree rooted at `task_id`, or `None` if it does not exist.
pub fn build_subtree(tasks: &[Task], task_id: &str, max_depth: usize) -> Option<TaskTree> {
    let idx = tasks.iter().position(|t| t.task_id == task_id)?;
    let forest = TaskForest::build(tasks);
    Some(tree_node(tasks, &forest, idx, 1, max_depth.max(1)))
}

/// Returns the children of `parent_id` as top-level trees.
///
/// An unknown parent yields an empty list.
pub fn build_children(tasks: &[Task], parent_id: &str, max_depth: usize) -> Vec<TaskTree> {
    let Some(idx) = tasks.iter().position(|t| t.task_id == parent_id) else {
        return Vec::new();
    };
    let forest = TaskForest::build(tasks);
    forest.children[idx]
        .iter()
        .map(|&c| tree_node(tasks, &forest, c, 1, max_depth.max(1)))
        .collect()
}

fn tree_node(
    tasks: &[Task],
    forest: &TaskForest,
    idx: usize,
    level: usize,
    max_depth: usize,
) -> TaskTree {
    let children = if level < max_depth {
        forest.children[idx]
            .iter()
            .map(|&c| tree_node(tasks, forest, c, level + 1, max_depth))
            .collect()
    } else {
        Vec::new()
    };
    TaskTree {
        task: tasks[idx].clone(),
        children,
    }
}
