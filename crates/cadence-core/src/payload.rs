//! Caller-facing payloads and their normalisation into [`Task`] fields.
//!
//! Checklist and criteria accept either a bare string or a structured item at
//! the boundary; both are normalised immediately into [`ChecklistItem`] /
//! [`AcceptanceCriterion`] and the union never travels further.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::enums::{ScheduleEventKind, TaskStatus};
use crate::idgen;
use crate::task::{AcceptanceCriterion, ChecklistItem, QaState, Schedule, ScheduleLogEntry, Task};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Shorthand inputs
// ---------------------------------------------------------------------------

/// A checklist entry as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChecklistInput {
    Label(String),
    Item {
        #[serde(default)]
        id: Option<String>,
        label: String,
        #[serde(default)]
        checked: bool,
        #[serde(default)]
        order: Option<u32>,
    },
}

impl From<&str> for ChecklistInput {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

/// An acceptance criterion as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriterionInput {
    Label(String),
    Item {
        #[serde(default)]
        id: Option<String>,
        label: String,
        #[serde(default)]
        satisfied: bool,
        #[serde(default)]
        order: Option<u32>,
    },
}

impl From<&str> for CriterionInput {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

/// Normalises checklist input into structured items ordered by `order`.
///
/// Items without an explicit order take their position; items without an id
/// get a generated one.
pub fn normalize_checklist(task_id: &str, inputs: &[ChecklistInput]) -> Vec<ChecklistItem> {
    let mut items: Vec<ChecklistItem> = inputs
        .iter()
        .enumerate()
        .map(|(pos, input)| {
            let (id, label, checked, order) = match input {
                ChecklistInput::Label(label) => (None, label.clone(), false, None),
                ChecklistInput::Item {
                    id,
                    label,
                    checked,
                    order,
                } => (id.clone(), label.clone(), *checked, *order),
            };
            let order = order.unwrap_or(pos as u32);
            ChecklistItem {
                id: id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| idgen::item_id(task_id, 'c', &label, order)),
                label,
                checked,
                order,
            }
        })
        .collect();
    items.sort_by_key(|item| item.order);
    items
}

/// Normalises criteria input into structured criteria ordered by `order`.
pub fn normalize_criteria(task_id: &str, inputs: &[CriterionInput]) -> Vec<AcceptanceCriterion> {
    let mut items: Vec<AcceptanceCriterion> = inputs
        .iter()
        .enumerate()
        .map(|(pos, input)| {
            let (id, label, satisfied, order) = match input {
                CriterionInput::Label(label) => (None, label.clone(), false, None),
                CriterionInput::Item {
                    id,
                    label,
                    satisfied,
                    order,
                } => (id.clone(), label.clone(), *satisfied, *order),
            };
            let order = order.unwrap_or(pos as u32);
            AcceptanceCriterion {
                id: id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| idgen::item_id(task_id, 'a', &label, order)),
                label,
                satisfied,
                order,
            }
        })
        .collect();
    items.sort_by_key(|item| item.order);
    items
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Payload for creating a task. Every field is optional except in spirit the
/// title.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub estimate: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub checklist: Vec<ChecklistInput>,
    #[serde(default)]
    pub acceptance_criteria: Vec<CriterionInput>,
    #[serde(default)]
    pub qa: Option<QaState>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(flatten)]
    pub schedule: Schedule,
}

impl NewTask {
    /// Shorthand for a task with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the parent reference.
    pub fn under(mut self, parent: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent.into());
        self
    }

    /// Builds the stored task under the given id.
    pub fn into_task(self, task_id: String, actor: &str, now: DateTime<Utc>) -> Task {
        let checklist = normalize_checklist(&task_id, &self.checklist);
        let acceptance_criteria = normalize_criteria(&task_id, &self.acceptance_criteria);
        let mut task = Task {
            task_id,
            parent_task_id: self.parent_task_id.filter(|p| !p.is_empty()),
            title: self.title,
            description: self.description,
            owner: self.owner,
            estimate: self.estimate,
            labels: self.labels.into_iter().filter(|l| !l.is_empty()).collect(),
            task_type: self.task_type,
            requested_status: Some(self.status.unwrap_or_default()),
            checklist,
            acceptance_criteria,
            qa: self.qa.unwrap_or_default(),
            dependencies: dedup_ids(self.dependencies),
            schedule: self.schedule,
            ..Task::default()
        };
        task.audit.created_at = now;
        task.audit.updated_at = now;
        task.audit.updated_by = Some(actor.to_string());
        task
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Partial QA update. Only `Some` fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaUpdate {
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub evidence: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub qa_user: Option<Option<String>>,
}

impl QaUpdate {
    /// An update that only sets the approval flag.
    pub fn approval(approved: bool) -> Self {
        Self {
            approved: Some(approved),
            ..Self::default()
        }
    }

    fn apply_to(&self, qa: &mut QaState) {
        if let Some(approved) = self.approved {
            qa.approved = approved;
        }
        if let Some(ref evidence) = self.evidence {
            qa.evidence = evidence.clone();
        }
        if let Some(ref notes) = self.notes {
            qa.notes = notes.clone();
        }
        if let Some(ref user) = self.qa_user {
            qa.qa_user = user.clone();
        }
    }
}

/// Typed partial-update struct for tasks.
///
/// Only `Some` fields are applied; `None` fields are left unchanged. Nullable
/// fields use `Option<Option<_>>` so that an explicit `null` clears them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdates {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub estimate: Option<Option<String>>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default, rename = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_task_id: Option<Option<String>>,
    #[serde(default)]
    pub checklist: Option<Vec<ChecklistInput>>,
    #[serde(default)]
    pub acceptance_criteria: Option<Vec<CriterionInput>>,
    #[serde(default)]
    pub qa: Option<QaUpdate>,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,

    // Scheduling
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_time: Option<Option<String>>,
    #[serde(default)]
    pub scheduled_with_time: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub next_schedule_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub timezone: Option<Option<String>>,
    /// Free-text note copied into the schedule log entry, if one is appended.
    #[serde(default)]
    pub schedule_note: Option<String>,
}

impl TaskUpdates {
    /// An update that only requests a status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// The approval flag this update sets explicitly, if any.
    pub fn requested_approval(&self) -> Option<bool> {
        self.qa.as_ref().and_then(|qa| qa.approved)
    }

    /// Applies the scheduling fields of this update on top of `base`.
    pub fn schedule_after(&self, base: &Schedule) -> Schedule {
        let mut next = base.clone();
        if let Some(ref v) = self.scheduled_date {
            next.scheduled_date = v.clone();
        }
        if let Some(ref v) = self.scheduled_time {
            next.scheduled_time = v.clone();
        }
        if let Some(v) = self.scheduled_with_time {
            next.scheduled_with_time = v;
        }
        if let Some(v) = self.next_schedule_time {
            next.next_schedule_time = v;
        }
        if let Some(ref v) = self.timezone {
            next.timezone = v.clone();
        }
        next
    }
}

/// Applies a partial update to `task`.
///
/// Does not validate the done-gate; callers check
/// [`done_gate`](crate::propagation::done_gate) first. Appends exactly one
/// `schedule_update` log entry when any scheduling field changes value.
pub fn apply_updates(task: &mut Task, updates: &TaskUpdates, actor: &str, now: DateTime<Utc>) {
    if let Some(ref title) = updates.title {
        task.title = title.clone();
    }
    if let Some(ref description) = updates.description {
        task.description = description.clone();
    }
    if let Some(ref owner) = updates.owner {
        task.owner = owner.clone();
    }
    if let Some(ref estimate) = updates.estimate {
        task.estimate = estimate.clone();
    }
    if let Some(ref labels) = updates.labels {
        task.labels = labels.iter().filter(|l| !l.is_empty()).cloned().collect();
    }
    if let Some(ref task_type) = updates.task_type {
        task.task_type = task_type.clone();
    }
    if let Some(ref status) = updates.status {
        task.requested_status = Some(status.clone());
    }
    if let Some(ref parent) = updates.parent_task_id {
        task.parent_task_id = parent.clone().filter(|p| !p.is_empty());
    }
    if let Some(ref checklist) = updates.checklist {
        task.checklist = normalize_checklist(&task.task_id, checklist);
    }
    if let Some(ref criteria) = updates.acceptance_criteria {
        task.acceptance_criteria = normalize_criteria(&task.task_id, criteria);
    }
    if let Some(ref qa) = updates.qa {
        qa.apply_to(&mut task.qa);
    }
    if let Some(ref deps) = updates.dependencies {
        task.dependencies = dedup_ids(deps.clone());
    }

    let before = task.schedule.clone();
    let after = updates.schedule_after(&before);
    if after != before {
        let seq = task.schedule_log.len();
        task.schedule_log.push(ScheduleLogEntry {
            id: idgen::schedule_entry_id(&task.task_id, actor, now, seq),
            kind: ScheduleEventKind::ScheduleUpdate,
            note: updates.schedule_note.clone(),
            from: before,
            to: after.clone(),
            updated_by: Some(actor.to_string()),
            at: now,
        });
        task.schedule = after;
    }

    touch(task, actor, now);
}

// ---------------------------------------------------------------------------
// Acceptance
// ---------------------------------------------------------------------------

/// Satisfaction flag for one criterion, matched by id and then by label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriterionPatch {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub satisfied: bool,
}

/// Payload for `set_acceptance`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcceptanceUpdate {
    #[serde(default)]
    pub acceptance_criteria: Vec<CriterionPatch>,
    #[serde(default)]
    pub qa: Option<QaUpdate>,
}

impl AcceptanceUpdate {
    /// An acceptance update that only sets QA approval.
    pub fn approval(approved: bool) -> Self {
        Self {
            acceptance_criteria: Vec::new(),
            qa: Some(QaUpdate::approval(approved)),
        }
    }
}

/// Merges criterion flags and QA fields into `task`.
///
/// Unmatched patches that carry a label are appended as new criteria. When
/// the caller does not set `qa.approved`, approval flips to `true` once every
/// criterion is satisfied and is otherwise left alone. `qa_at` is always
/// stamped.
pub fn merge_acceptance(task: &mut Task, update: &AcceptanceUpdate, actor: &str, now: DateTime<Utc>) {
    for patch in &update.acceptance_criteria {
        let by_id = patch.id.as_deref().and_then(|id| {
            task.acceptance_criteria
                .iter()
                .position(|c| c.id == id)
        });
        let idx = by_id.or_else(|| {
            patch.label.as_deref().and_then(|label| {
                task.acceptance_criteria
                    .iter()
                    .position(|c| c.label == label)
            })
        });
        match idx {
            Some(i) => task.acceptance_criteria[i].satisfied = patch.satisfied,
            None => {
                if let Some(label) = patch.label.as_deref().filter(|l| !l.is_empty()) {
                    let order = task
                        .acceptance_criteria
                        .iter()
                        .map(|c| c.order + 1)
                        .max()
                        .unwrap_or(0);
                    task.acceptance_criteria.push(AcceptanceCriterion {
                        id: patch
                            .id
                            .clone()
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(|| idgen::item_id(&task.task_id, 'a', label, order)),
                        label: label.to_string(),
                        satisfied: patch.satisfied,
                        order,
                    });
                }
            }
        }
    }

    let explicit = update.qa.as_ref().and_then(|qa| qa.approved);
    if let Some(ref qa) = update.qa {
        qa.apply_to(&mut task.qa);
    }
    if explicit.is_none() && task.all_criteria_satisfied() {
        task.qa.approved = true;
    }
    task.qa.qa_at = Some(now);
    if task.qa.qa_user.is_none() {
        task.qa.qa_user = Some(actor.to_string());
    }

    touch(task, actor, now);
}

/// Replaces the dependency set.
pub fn replace_dependencies(task: &mut Task, ids: Vec<String>, actor: &str, now: DateTime<Utc>) {
    task.dependencies = dedup_ids(ids);
    touch(task, actor, now);
}

fn touch(task: &mut Task, actor: &str, now: DateTime<Utc>) {
    task.audit.updated_at = now;
    task.audit.updated_by = Some(actor.to_string());
}

/// Removes empty and repeated ids, keeping first occurrences in order.
fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskBuilder;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn checklist_shorthand_is_normalized() {
        let json = r#"["write", {"label": "review", "checked": true}, {"id": "x1", "label": "ship", "order": 7}]"#;
        let inputs: Vec<ChecklistInput> = serde_json::from_str(json).unwrap();
        let items = normalize_checklist("task-1", &inputs);

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].label, "write");
        assert!(!items[0].checked);
        assert_eq!(items[0].order, 0);
        assert_eq!(items[1].label, "review");
        assert!(items[1].checked);
        assert_eq!(items[2].id, "x1");
        assert_eq!(items[2].order, 7);
        assert!(items.iter().all(|i| !i.id.is_empty()));
    }

    #[test]
    fn new_task_defaults() {
        let task = NewTask::titled("Ship feature").into_task("task-1".into(), "alice", now());
        assert_eq!(task.requested_status, Some(TaskStatus::Todo));
        assert_eq!(task.audit.created_at, now());
        assert_eq!(task.audit.updated_at, now());
        assert_eq!(task.audit.updated_by.as_deref(), Some("alice"));
        assert!(task.checklist.is_empty());
        assert!(!task.qa.approved);
    }

    #[test]
    fn unrelated_update_appends_no_schedule_entry() {
        let mut task = TaskBuilder::new("task-1", "x").build();
        let updates = TaskUpdates {
            title: Some("renamed".into()),
            ..TaskUpdates::default()
        };
        apply_updates(&mut task, &updates, "bob", now());
        assert_eq!(task.title, "renamed");
        assert!(task.schedule_log.is_empty());
        assert_eq!(task.audit.updated_by.as_deref(), Some("bob"));
    }

    #[test]
    fn schedule_change_appends_one_entry() {
        let mut task = TaskBuilder::new("task-1", "x").build();
        task.schedule.scheduled_date = Some("2025-05-01".into());

        let updates = TaskUpdates {
            scheduled_date: Some(Some("2025-05-03".into())),
            scheduled_time: Some(Some("09:30".into())),
            scheduled_with_time: Some(true),
            schedule_note: Some("moved after demo".into()),
            ..TaskUpdates::default()
        };
        apply_updates(&mut task, &updates, "bob", now());

        assert_eq!(task.schedule_log.len(), 1);
        let entry = &task.schedule_log[0];
        assert_eq!(entry.kind, ScheduleEventKind::ScheduleUpdate);
        assert_eq!(entry.from.scheduled_date.as_deref(), Some("2025-05-01"));
        assert_eq!(entry.to.scheduled_date.as_deref(), Some("2025-05-03"));
        assert_eq!(entry.to.scheduled_time.as_deref(), Some("09:30"));
        assert!(entry.to.scheduled_with_time);
        assert_eq!(entry.note.as_deref(), Some("moved after demo"));
        assert_eq!(task.schedule, entry.to);
    }

    #[test]
    fn setting_same_schedule_value_is_not_a_change() {
        let mut task = TaskBuilder::new("task-1", "x").build();
        task.schedule.timezone = Some("UTC".into());
        let updates = TaskUpdates {
            timezone: Some(Some("UTC".into())),
            ..TaskUpdates::default()
        };
        apply_updates(&mut task, &updates, "bob", now());
        assert!(task.schedule_log.is_empty());
    }

    #[test]
    fn explicit_null_clears_nullable_field() {
        let updates: TaskUpdates = serde_json::from_str(r#"{"scheduled_date": null}"#).unwrap();
        assert_eq!(updates.scheduled_date, Some(None));
        let absent: TaskUpdates = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.scheduled_date, None);
    }

    #[test]
    fn acceptance_matches_by_id_then_label() {
        let mut task = TaskBuilder::new("task-1", "x")
            .criteria(&[("loads", false), ("saves", false)])
            .build();
        let first_id = task.acceptance_criteria[0].id.clone();
        let update = AcceptanceUpdate {
            acceptance_criteria: vec![
                CriterionPatch {
                    id: Some(first_id),
                    label: None,
                    satisfied: true,
                },
                CriterionPatch {
                    id: Some("unknown".into()),
                    label: Some("saves".into()),
                    satisfied: true,
                },
            ],
            qa: None,
        };
        merge_acceptance(&mut task, &update, "qa-bot", now());

        assert!(task.acceptance_criteria.iter().all(|c| c.satisfied));
        assert_eq!(task.acceptance_criteria.len(), 2);
        // Auto-approval once every criterion holds.
        assert!(task.qa.approved);
        assert_eq!(task.qa.qa_at, Some(now()));
    }

    #[test]
    fn explicit_rejection_wins_over_auto_approval() {
        let mut task = TaskBuilder::new("task-1", "x")
            .criteria(&[("loads", true)])
            .approved(true)
            .build();
        merge_acceptance(&mut task, &AcceptanceUpdate::approval(false), "qa", now());
        assert!(!task.qa.approved);
    }

    #[test]
    fn partial_criteria_leave_prior_approval() {
        let mut task = TaskBuilder::new("task-1", "x")
            .criteria(&[("a", false), ("b", false)])
            .build();
        let update = AcceptanceUpdate {
            acceptance_criteria: vec![CriterionPatch {
                id: None,
                label: Some("a".into()),
                satisfied: true,
            }],
            qa: None,
        };
        merge_acceptance(&mut task, &update, "qa", now());
        assert!(!task.qa.approved);
        assert!(task.qa.qa_at.is_some());
    }

    #[test]
    fn unmatched_labelled_patch_is_appended() {
        let mut task = TaskBuilder::new("task-1", "x").criteria(&[("a", true)]).build();
        let update = AcceptanceUpdate {
            acceptance_criteria: vec![CriterionPatch {
                id: None,
                label: Some("b".into()),
                satisfied: false,
            }],
            qa: None,
        };
        merge_acceptance(&mut task, &update, "qa", now());
        assert_eq!(task.acceptance_criteria.len(), 2);
        assert_eq!(task.acceptance_criteria[1].label, "b");
        assert_eq!(task.acceptance_criteria[1].order, 1);
    }

    #[test]
    fn dependencies_are_deduplicated_in_order() {
        let mut task = TaskBuilder::new("task-1", "x").build();
        replace_dependencies(
            &mut task,
            vec!["b".into(), "a".into(), "b".into(), String::new()],
            "bob",
            now(),
        );
        assert_eq!(task.dependencies, vec!["b".to_string(), "a".to_string()]);
    }
}
