//! Output formatting helpers for the `cadence` CLI.
//!
//! JSON output, simple tables, and human-readable task trees. Colors follow
//! the usual conventions (`NO_COLOR`, `CLICOLOR`, `CLICOLOR_FORCE`, TTY).

use std::env;
use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;

use cadence_core::enums::TaskStatus;
use cadence_core::task::{Task, TaskTree};

const PASS: (u8, u8, u8) = (0xc2, 0xd9, 0x4c);
const WARN: (u8, u8, u8) = (0xff, 0xb4, 0x54);
const FAIL: (u8, u8, u8) = (0xf0, 0x71, 0x78);
const MUTED: (u8, u8, u8) = (0x6c, 0x76, 0x80);

const ICON_TODO: &str = "\u{25CB}"; // ○
const ICON_IN_PROGRESS: &str = "\u{25D0}"; // ◐
const ICON_BLOCKED: &str = "\u{25CF}"; // ●
const ICON_DONE: &str = "\u{2713}"; // ✓

/// Determines if ANSI color codes should be used.
pub fn supports_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if env::var("CLICOLOR").as_deref() == Ok("0") {
        return false;
    }
    if env::var("TERM").as_deref() == Ok("dumb") {
        return false;
    }
    if env::var_os("CLICOLOR_FORCE").is_some() {
        return true;
    }
    io::stdout().is_terminal()
}

fn color_str(s: &str, rgb: (u8, u8, u8)) -> String {
    if supports_color() {
        s.truecolor(rgb.0, rgb.1, rgb.2).to_string()
    } else {
        s.to_string()
    }
}

pub fn render_muted(s: &str) -> String {
    color_str(s, MUTED)
}

pub fn render_pass(s: &str) -> String {
    color_str(s, PASS)
}

pub fn render_bold(s: &str) -> String {
    if supports_color() {
        s.bold().to_string()
    } else {
        s.to_string()
    }
}

/// Colored status icon.
pub fn render_status_icon(status: &TaskStatus) -> String {
    match status {
        TaskStatus::InProgress => color_str(ICON_IN_PROGRESS, WARN),
        TaskStatus::Blocked => color_str(ICON_BLOCKED, FAIL),
        TaskStatus::Done => color_str(ICON_DONE, PASS),
        _ => ICON_TODO.to_string(),
    }
}

/// Colored status name.
pub fn render_status(status: &TaskStatus) -> String {
    match status {
        TaskStatus::InProgress => color_str(status.as_str(), WARN),
        TaskStatus::Blocked => color_str(status.as_str(), FAIL),
        TaskStatus::Done => color_str(status.as_str(), PASS),
        _ => status.as_str().to_string(),
    }
}

/// Print a value as pretty-printed JSON to stdout.
///
/// Terminates the process with exit code 1 if serialization fails.
pub fn output_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            // Ignore broken pipe errors (e.g., piped to `head`)
            let _ = writeln!(handle, "{}", json);
        }
        Err(e) => {
            eprintln!("Error: failed to serialize JSON: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print a simple table with headers and rows.
///
/// Column widths are computed from the data for alignment.
pub fn output_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    let header: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
        .collect();
    let _ = writeln!(handle, "{}", header.join("  ").trim_end());

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(handle, "{}", separator.join("  "));

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(w) => format!("{:<width$}", cell, width = *w),
                None => cell.clone(),
            })
            .collect();
        let _ = writeln!(handle, "{}", cells.join("  ").trim_end());
    }
}

/// One-line summary: `{icon} {id}: {title} ({status}, {progress}%)`.
pub fn format_task_compact(task: &Task) -> String {
    format!(
        "{} {}: {} ({}, {}%)",
        render_status_icon(&task.status),
        task.task_id,
        task.title,
        render_status(&task.status),
        task.progress,
    )
}

/// Renders trees with two-space indentation per level.
pub fn format_trees(trees: &[TaskTree]) -> String {
    let mut lines = Vec::new();
    for tree in trees {
        push_tree_lines(tree, 0, &mut lines);
    }
    lines.join("\n")
}

fn push_tree_lines(tree: &TaskTree, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!("{}{}", "  ".repeat(depth), format_task_compact(&tree.task)));
    for child in &tree.children {
        push_tree_lines(child, depth + 1, lines);
    }
}

fn tick(on: bool) -> &'static str {
    if on { "[x]" } else { "[ ]" }
}

/// Multi-line view of a task and its children.
pub fn format_task_detail(tree: &TaskTree) -> String {
    let task = &tree.task;
    let mut lines = Vec::new();

    lines.push(render_bold(&format!("{} {}", task.task_id, task.title)));

    let requested = task.requested();
    let mut status_line = format!(
        "Status: {} {}  Progress: {}%",
        render_status_icon(&task.status),
        render_status(&task.status),
        task.progress
    );
    if requested != task.status {
        status_line.push_str(&render_muted(&format!("  (requested: {requested})")));
    }
    lines.push(status_line);

    if let Some(ref parent) = task.parent_task_id {
        lines.push(format!("Parent: {parent}"));
    }
    if !task.owner.is_empty() {
        lines.push(format!("Owner: {}", task.owner));
    }
    if !task.task_type.is_empty() {
        lines.push(format!("Type: {}", task.task_type));
    }
    if let Some(ref estimate) = task.estimate {
        lines.push(format!("Estimate: {estimate}"));
    }
    if !task.labels.is_empty() {
        let labels: Vec<&str> = task.labels.iter().map(String::as_str).collect();
        lines.push(format!("Labels: {}", labels.join(", ")));
    }
    if !task.description.is_empty() {
        lines.push(String::new());
        lines.push(task.description.clone());
    }

    if !task.checklist.is_empty() {
        lines.push(String::new());
        lines.push("Checklist:".to_string());
        for item in &task.checklist {
            lines.push(format!("  {} {}", tick(item.checked), item.label));
        }
    }
    if !task.acceptance_criteria.is_empty() {
        lines.push(String::new());
        lines.push("Acceptance criteria:".to_string());
        for criterion in &task.acceptance_criteria {
            lines.push(format!(
                "  {} {} {}",
                tick(criterion.satisfied),
                criterion.label,
                render_muted(&criterion.id)
            ));
        }
    }

    lines.push(String::new());
    if task.qa.approved {
        let by = task.qa.qa_user.as_deref().unwrap_or("unknown");
        lines.push(format!("QA: {} by {by}", render_pass("approved")));
    } else {
        lines.push("QA: not approved".to_string());
    }
    if let Some(ref notes) = task.qa.notes {
        lines.push(format!("  Notes: {notes}"));
    }
    for evidence in &task.qa.evidence {
        lines.push(format!("  Evidence: {evidence}"));
    }

    let schedule = &task.schedule;
    if let Some(ref date) = schedule.scheduled_date {
        let mut when = date.clone();
        if let Some(ref time) = schedule.scheduled_time {
            when.push(' ');
            when.push_str(time);
        }
        if let Some(ref tz) = schedule.timezone {
            when.push_str(&format!(" ({tz})"));
        }
        lines.push(format!("Scheduled: {when}"));
    }
    if !task.schedule_log.is_empty() {
        lines.push(format!("Reschedules: {}", task.schedule_log.len()));
    }
    if !task.dependencies.is_empty() {
        lines.push(format!("Depends on: {}", task.dependencies.join(", ")));
    }

    lines.push(format!(
        "Created: {}",
        task.audit.created_at.format("%Y-%m-%d %H:%M")
    ));
    let updated_by = task.audit.updated_by.as_deref().unwrap_or("unknown");
    lines.push(format!(
        "Updated: {} by {updated_by}",
        task.audit.updated_at.format("%Y-%m-%d %H:%M")
    ));
    if let Some(completed) = task.audit.completed_at {
        lines.push(format!("Completed: {}", completed.format("%Y-%m-%d %H:%M")));
    }

    if !tree.children.is_empty() {
        lines.push(String::new());
        lines.push("Subtasks:".to_string());
        let mut child_lines = Vec::new();
        for child in &tree.children {
            push_tree_lines(child, 1, &mut child_lines);
        }
        lines.extend(child_lines);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::task::TaskBuilder;

    #[test]
    fn compact_line_has_id_title_and_progress() {
        let task = TaskBuilder::new("task-abc", "Ship feature").build();
        let line = format_task_compact(&task);
        assert!(line.contains("task-abc: Ship feature"));
        assert!(line.contains("todo"));
        assert!(line.contains("0%"));
    }

    #[test]
    fn trees_indent_children() {
        let tree = TaskTree {
            task: TaskBuilder::new("task-root", "root").build(),
            children: vec![TaskTree {
                task: TaskBuilder::new("task-kid", "kid").build(),
                children: Vec::new(),
            }],
        };
        let text = format_trees(&[tree]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("  "));
        assert!(lines[1].contains("task-kid"));
    }

    #[test]
    fn detail_lists_checklist_and_qa() {
        let task = TaskBuilder::new("task-abc", "release")
            .checklist(&[("tag", true), ("publish", false)])
            .build();
        let text = format_task_detail(&TaskTree {
            task,
            children: Vec::new(),
        });
        assert!(text.contains("[x] tag"));
        assert!(text.contains("[ ] publish"));
        assert!(text.contains("QA: not approved"));
    }
}
