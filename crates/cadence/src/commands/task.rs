//! `cadence task` -- create, update and inspect tasks.

use anyhow::{Result, bail};

use cadence_core::enums::TaskStatus;
use cadence_core::payload::{
    AcceptanceUpdate, ChecklistInput, CriterionInput, CriterionPatch, NewTask, QaUpdate,
    TaskUpdates,
};
use cadence_core::task::Schedule;

use crate::cli::{
    ScheduleArgs, TaskAcceptArgs, TaskArgs, TaskCommands, TaskCreateArgs, TaskDepsArgs,
    TaskListArgs, TaskShowArgs, TaskUpdateArgs,
};
use crate::commands::{parse_timestamp, read_json_payload};
use crate::context::{Repository, RuntimeContext, Workspace};
use crate::output::{format_task_compact, format_task_detail, format_trees, output_json};

/// Execute a `cadence task` subcommand.
pub fn run(ctx: &RuntimeContext, args: &TaskArgs) -> Result<()> {
    let ws = ctx.workspace()?;
    let repo = ws.task_repository()?;
    match &args.command {
        TaskCommands::Create(a) => create(ctx, &ws, &repo, a),
        TaskCommands::Update(a) => update(ctx, &ws, &repo, a),
        TaskCommands::Accept(a) => accept(ctx, &ws, &repo, a),
        TaskCommands::Deps(a) => deps(ctx, &ws, &repo, a),
        TaskCommands::List(a) => list(ctx, &repo, a),
        TaskCommands::Show(a) => show(ctx, &repo, a),
    }
}

/// Parses a requested status, accepting the usual aliases.
fn parse_status(value: &str) -> Result<TaskStatus> {
    Ok(value.parse::<TaskStatus>()?)
}

fn schedule_from(args: &ScheduleArgs) -> Result<Schedule> {
    Ok(Schedule {
        scheduled_date: args.scheduled_date.clone(),
        scheduled_time: args.scheduled_time.clone(),
        scheduled_with_time: args.scheduled_time.is_some(),
        next_schedule_time: args
            .next_schedule_time
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        timezone: args.timezone.clone(),
    })
}

fn new_task_from(args: &TaskCreateArgs) -> Result<NewTask> {
    let title = args.title.clone().unwrap_or_default();
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    Ok(NewTask {
        task_id: args.id.clone(),
        parent_task_id: args.parent.clone(),
        title,
        description: args.description.clone().unwrap_or_default(),
        owner: args.owner.clone().unwrap_or_default(),
        estimate: args.estimate.clone(),
        labels: args.labels.clone(),
        task_type: args.task_type.clone().unwrap_or_default(),
        status: args.status.as_deref().map(parse_status).transpose()?,
        checklist: args
            .checklist
            .iter()
            .map(|s| ChecklistInput::from(s.as_str()))
            .collect(),
        acceptance_criteria: args
            .criteria
            .iter()
            .map(|s| CriterionInput::from(s.as_str()))
            .collect(),
        qa: None,
        dependencies: args.dependencies.clone(),
        schedule: schedule_from(&args.schedule)?,
    })
}

fn create(ctx: &RuntimeContext, ws: &Workspace, repo: &Repository, args: &TaskCreateArgs) -> Result<()> {
    let payload = match args.from_file {
        Some(ref path) => read_json_payload(path)?,
        None => new_task_from(args)?,
    };
    let task = repo.create_task(payload, &ws.actor)?;

    if ctx.json {
        output_json(&task);
    } else if !ctx.quiet {
        println!("Created {}", format_task_compact(&task));
    }
    Ok(())
}

/// Returns `true` if any field flag was given.
fn has_update_flags(args: &TaskUpdateArgs) -> bool {
    let s = &args.schedule;
    args.title.is_some()
        || args.description.is_some()
        || args.owner.is_some()
        || args.estimate.is_some()
        || !args.labels.is_empty()
        || args.task_type.is_some()
        || args.status.is_some()
        || args.parent.is_some()
        || args.detach
        || !args.checklist.is_empty()
        || args.approve
        || args.reject
        || s.scheduled_date.is_some()
        || s.scheduled_time.is_some()
        || s.next_schedule_time.is_some()
        || s.timezone.is_some()
        || args.unschedule
        || args.note.is_some()
}

/// Overlays command-line flags onto `updates`.
fn apply_update_flags(args: &TaskUpdateArgs, updates: &mut TaskUpdates) -> Result<()> {
    if let Some(ref title) = args.title {
        updates.title = Some(title.clone());
    }
    if let Some(ref description) = args.description {
        updates.description = Some(description.clone());
    }
    if let Some(ref owner) = args.owner {
        updates.owner = Some(owner.clone());
    }
    if let Some(ref estimate) = args.estimate {
        updates.estimate = Some(Some(estimate.clone()));
    }
    if !args.labels.is_empty() {
        updates.labels = Some(args.labels.clone());
    }
    if let Some(ref task_type) = args.task_type {
        updates.task_type = Some(task_type.clone());
    }
    if let Some(ref status) = args.status {
        updates.status = Some(parse_status(status)?);
    }
    if let Some(ref parent) = args.parent {
        updates.parent_task_id = Some(Some(parent.clone()));
    }
    if args.detach {
        updates.parent_task_id = Some(None);
    }
    if !args.checklist.is_empty() {
        updates.checklist = Some(
            args.checklist
                .iter()
                .map(|s| ChecklistInput::from(s.as_str()))
                .collect(),
        );
    }
    if args.approve || args.reject {
        let qa = updates.qa.get_or_insert_with(QaUpdate::default);
        qa.approved = Some(args.approve);
    }

    let schedule = &args.schedule;
    if let Some(ref date) = schedule.scheduled_date {
        updates.scheduled_date = Some(Some(date.clone()));
    }
    if let Some(ref time) = schedule.scheduled_time {
        updates.scheduled_time = Some(Some(time.clone()));
        updates.scheduled_with_time = Some(true);
    }
    if let Some(ref next) = schedule.next_schedule_time {
        updates.next_schedule_time = Some(Some(parse_timestamp(next)?));
    }
    if let Some(ref tz) = schedule.timezone {
        updates.timezone = Some(Some(tz.clone()));
    }
    if args.unschedule {
        updates.scheduled_date = Some(None);
        updates.scheduled_time = Some(None);
        updates.scheduled_with_time = Some(false);
        updates.next_schedule_time = Some(None);
        updates.timezone = Some(None);
    }
    if let Some(ref note) = args.note {
        updates.schedule_note = Some(note.clone());
    }

    Ok(())
}

fn update(ctx: &RuntimeContext, ws: &Workspace, repo: &Repository, args: &TaskUpdateArgs) -> Result<()> {
    let mut updates: TaskUpdates = match args.from_file {
        Some(ref path) => read_json_payload(path)?,
        None => TaskUpdates::default(),
    };
    if !has_update_flags(args) && args.from_file.is_none() {
        bail!("nothing to update (pass at least one field flag or --from-file)");
    }
    apply_update_flags(args, &mut updates)?;

    let task = repo.update_task(&args.id, updates, &ws.actor)?;
    if ctx.json {
        output_json(&task);
    } else if !ctx.quiet {
        println!("Updated {}", format_task_compact(&task));
    }
    Ok(())
}

fn accept(ctx: &RuntimeContext, ws: &Workspace, repo: &Repository, args: &TaskAcceptArgs) -> Result<()> {
    let Some(current) = repo.get_task(&args.id, Some(1))? else {
        bail!("task {} not found", args.id);
    };

    // A value naming an existing criterion id patches it; anything else is
    // matched (or added) by label.
    let patch = |value: &String, satisfied: bool| {
        let is_id = current
            .task
            .acceptance_criteria
            .iter()
            .any(|c| &c.id == value);
        CriterionPatch {
            id: is_id.then(|| value.clone()),
            label: (!is_id).then(|| value.clone()),
            satisfied,
        }
    };
    let mut update = AcceptanceUpdate {
        acceptance_criteria: args
            .satisfy
            .iter()
            .map(|v| patch(v, true))
            .chain(args.unsatisfy.iter().map(|v| patch(v, false)))
            .collect(),
        qa: None,
    };

    let mut qa = QaUpdate::default();
    if args.approve || args.reject {
        qa.approved = Some(args.approve);
    }
    if !args.evidence.is_empty() {
        qa.evidence = Some(args.evidence.clone());
    }
    if let Some(ref notes) = args.notes {
        qa.notes = Some(Some(notes.clone()));
    }
    if qa.approved.is_some() || qa.evidence.is_some() || qa.notes.is_some() {
        qa.qa_user = Some(Some(ws.actor.clone()));
        update.qa = Some(qa);
    }

    let task = repo.set_acceptance(&args.id, update, &ws.actor)?;
    if ctx.json {
        output_json(&task);
    } else if !ctx.quiet {
        let qa = if task.qa.approved { "approved" } else { "not approved" };
        println!("QA {qa}: {}", format_task_compact(&task));
    }
    Ok(())
}

fn deps(ctx: &RuntimeContext, ws: &Workspace, repo: &Repository, args: &TaskDepsArgs) -> Result<()> {
    let task = repo.set_dependencies(&args.id, args.dependencies.clone(), &ws.actor)?;
    if ctx.json {
        output_json(&task);
    } else if !ctx.quiet {
        if task.dependencies.is_empty() {
            println!("{} has no dependencies", task.task_id);
        } else {
            println!("{} depends on {}", task.task_id, task.dependencies.join(", "));
        }
    }
    Ok(())
}

fn list(ctx: &RuntimeContext, repo: &Repository, args: &TaskListArgs) -> Result<()> {
    let trees = repo.list_tasks(args.parent.as_deref(), args.depth)?;
    if ctx.json {
        output_json(&trees);
    } else if trees.is_empty() {
        if !ctx.quiet {
            println!("No tasks found.");
        }
    } else {
        println!("{}", format_trees(&trees));
    }
    Ok(())
}

fn show(ctx: &RuntimeContext, repo: &Repository, args: &TaskShowArgs) -> Result<()> {
    let Some(tree) = repo.get_task(&args.id, args.depth)? else {
        bail!("task {} not found", args.id);
    };
    if ctx.json {
        output_json(&tree);
    } else {
        println!("{}", format_task_detail(&tree));
    }
    Ok(())
}
