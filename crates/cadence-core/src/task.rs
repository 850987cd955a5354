//! Task struct -- the central domain model for the cadence tracker.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ScheduleEventKind, TaskStatus};

/// A single checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub order: u32,
}

/// A single acceptance criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub satisfied: bool,
    #[serde(default)]
    pub order: u32,
}

/// Review state of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaState {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub qa_user: Option<String>,
    #[serde(default)]
    pub qa_at: Option<DateTime<Utc>>,
}

/// The five scheduling fields. Also used as the before/after snapshot in
/// [`ScheduleLogEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub scheduled_with_time: bool,
    #[serde(default)]
    pub next_schedule_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// One immutable entry in a task's schedule audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ScheduleEventKind,
    #[serde(default)]
    pub note: Option<String>,
    pub from: Schedule,
    pub to: Schedule,
    #[serde(default)]
    pub updated_by: Option<String>,
    pub at: DateTime<Utc>,
}

/// Creation/update bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Set the first time the task is derived `done`; never cleared.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl Default for Audit {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            completed_at: None,
            updated_by: None,
        }
    }
}

/// Represents a node in the forest of work items.
///
/// `status` and `progress` are derived by
/// [`recompute`](crate::propagation::recompute); `requested_status` holds
/// the last status a caller asked for and is the input to that derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    // ===== Identity =====
    pub task_id: String,

    #[serde(default)]
    pub parent_task_id: Option<String>,

    // ===== Content =====
    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<String>,

    #[serde(default)]
    pub labels: BTreeSet<String>,

    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub task_type: String,

    // ===== Derived workflow state =====
    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_status: Option<TaskStatus>,

    #[serde(default)]
    pub progress: u8,

    // ===== Work breakdown =====
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,

    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,

    #[serde(default)]
    pub qa: QaState,

    /// Informational only; never consulted by status derivation.
    #[serde(default)]
    pub dependencies: Vec<String>,

    // ===== Scheduling =====
    #[serde(flatten)]
    pub schedule: Schedule,

    #[serde(default)]
    pub schedule_log: Vec<ScheduleLogEntry>,

    #[serde(default)]
    pub audit: Audit,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            task_id: String::new(),
            parent_task_id: None,
            title: String::new(),
            description: String::new(),
            owner: String::new(),
            estimate: None,
            labels: BTreeSet::new(),
            task_type: String::new(),
            status: TaskStatus::Todo,
            requested_status: None,
            progress: 0,
            checklist: Vec::new(),
            acceptance_criteria: Vec::new(),
            qa: QaState::default(),
            dependencies: Vec::new(),
            schedule: Schedule::default(),
            schedule_log: Vec::new(),
            audit: Audit::default(),
        }
    }
}

impl Task {
    /// The status the caller last asked for.
    ///
    /// Records persisted before `requested_status` existed fall back to
    /// their stored `status`.
    pub fn requested(&self) -> TaskStatus {
        self.requested_status
            .clone()
            .unwrap_or_else(|| self.status.clone())
    }

    /// Percentage of checked checklist items, or `None` without a checklist.
    pub fn checklist_progress(&self) -> Option<u8> {
        if self.checklist.is_empty() {
            return None;
        }
        let checked = self.checklist.iter().filter(|c| c.checked).count();
        Some(percent(checked, self.checklist.len()))
    }

    /// Returns `true` when there is at least one criterion and all are satisfied.
    pub fn all_criteria_satisfied(&self) -> bool {
        !self.acceptance_criteria.is_empty()
            && self.acceptance_criteria.iter().all(|c| c.satisfied)
    }

    /// Returns `true` if the parent reference is set.
    pub fn has_parent(&self) -> bool {
        self.parent_task_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Rounded integer percentage of `part / whole`, clamped to 100.
pub(crate) fn percent(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let value = (part as f64 * 100.0 / whole as f64).round();
    value.clamp(0.0, 100.0) as u8
}

/// A recomputed task together with its (possibly truncated) subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTree {
    #[serde(flatten)]
    pub task: Task,
    pub children: Vec<TaskTree>,
}

/// Builder for constructing a [`Task`] with a fluent API.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    /// Creates a new builder with the given id and title.
    pub fn new(task_id: impl Into<String>, title: impl Into<String>) -> Self {
        let mut task = Task::default();
        task.task_id = task_id.into();
        task.title = title.into();
        Self { task }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.task.parent_task_id = Some(parent.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.task.description = description.into();
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.task.owner = owner.into();
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.task.labels.insert(label.into());
        self
    }

    /// Sets the requested status; the derived status is left to recomputation.
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.requested_status = Some(status);
        self
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.task.qa.approved = approved;
        self
    }

    pub fn checklist(mut self, items: &[(&str, bool)]) -> Self {
        self.task.checklist = items
            .iter()
            .enumerate()
            .map(|(i, (label, checked))| ChecklistItem {
                id: format!("{}-c{}", self.task.task_id, i),
                label: (*label).to_string(),
                checked: *checked,
                order: i as u32,
            })
            .collect();
        self
    }

    pub fn criteria(mut self, items: &[(&str, bool)]) -> Self {
        self.task.acceptance_criteria = items
            .iter()
            .enumerate()
            .map(|(i, (label, satisfied))| AcceptanceCriterion {
                id: format!("{}-a{}", self.task.task_id, i),
                label: (*label).to_string(),
                satisfied: *satisfied,
                order: i as u32,
            })
            .collect();
        self
    }

    pub fn created_at(mut self, t: DateTime<Utc>) -> Self {
        self.task.audit.created_at = t;
        self.task.audit.updated_at = t;
        self
    }

    /// Consumes the builder and returns the constructed [`Task`].
    pub fn build(self) -> Task {
        self.task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_task() {
        let task = Task::default();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.progress, 0);
        assert!(!task.qa.approved);
        assert!(task.audit.completed_at.is_none());
    }

    #[test]
    fn requested_falls_back_to_stored_status() {
        let mut task = TaskBuilder::new("t-1", "legacy").build();
        task.status = TaskStatus::InProgress;
        assert_eq!(task.requested(), TaskStatus::InProgress);

        task.requested_status = Some(TaskStatus::Blocked);
        assert_eq!(task.requested(), TaskStatus::Blocked);
    }

    #[test]
    fn checklist_progress_rounds() {
        let task = TaskBuilder::new("t-1", "x")
            .checklist(&[("a", true), ("b", false), ("c", false)])
            .build();
        assert_eq!(task.checklist_progress(), Some(33));
        assert_eq!(TaskBuilder::new("t-2", "y").build().checklist_progress(), None);
    }

    #[test]
    fn criteria_satisfaction_requires_non_empty() {
        let empty = TaskBuilder::new("t-1", "x").build();
        assert!(!empty.all_criteria_satisfied());

        let done = TaskBuilder::new("t-2", "y")
            .criteria(&[("works", true), ("tested", true)])
            .build();
        assert!(done.all_criteria_satisfied());
    }

    #[test]
    fn schedule_fields_serialize_flat() {
        let mut task = TaskBuilder::new("t-1", "call").build();
        task.schedule.scheduled_date = Some("2025-03-01".into());
        task.schedule.scheduled_with_time = true;

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["scheduled_date"], "2025-03-01");
        assert_eq!(json["scheduled_with_time"], true);
        assert!(json.get("schedule").is_none());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back.schedule, task.schedule);
    }

    #[test]
    fn minimal_record_deserializes() {
        let task: Task = serde_json::from_str(r#"{"task_id":"t-9","title":"hello"}"#).unwrap();
        assert_eq!(task.title, "hello");
        assert_eq!(task.status, TaskStatus::Todo);
        assert!(task.parent_task_id.is_none());
    }
}
