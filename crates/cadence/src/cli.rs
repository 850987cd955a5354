//! Clap CLI definitions for the `cadence` command.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// cadence -- hierarchical tasks with QA gates, plus adaptive daily pushes.
#[derive(Parser, Debug)]
#[command(
    name = "cadence",
    about = "Hierarchical task tracker with QA gates and adaptive daily pushes",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Data directory (default: $CADENCE_DIR, or the nearest .cadence/ upwards).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Actor name for audit fields (default: $CADENCE_ACTOR, config, $USER).
    #[arg(long, global = true, env = "CADENCE_ACTOR")]
    pub actor: Option<String>,

    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output (errors only).
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a .cadence directory with a default config.
    Init(InitArgs),

    /// Create, update and inspect tasks.
    Task(TaskArgs),

    /// Record and inspect user engagement.
    Engagement(EngagementArgs),

    /// Manage push registrations and run the daily scheduler.
    Push(PushArgs),

    /// Inspect configuration.
    Config(ConfigArgs),

    /// Generate shell completion scripts.
    Completion(CompletionArgs),
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Prefix for generated task ids.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Storage backend.
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Overwrite an existing config.yaml.
    #[arg(long)]
    pub force: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Jsonl,
    Sqlite,
    Memory,
}

// ---------------------------------------------------------------------------
// task
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task.
    Create(TaskCreateArgs),

    /// Update task fields or request a status change.
    Update(TaskUpdateArgs),

    /// Mark acceptance criteria and set QA approval.
    Accept(TaskAcceptArgs),

    /// Replace a task's dependency list.
    Deps(TaskDepsArgs),

    /// List task trees.
    List(TaskListArgs),

    /// Show one task and its subtree.
    Show(TaskShowArgs),
}

/// Schedule fields shared by `create` and `update`.
#[derive(Args, Debug, Default)]
pub struct ScheduleArgs {
    /// Scheduled date (YYYY-MM-DD).
    #[arg(long)]
    pub scheduled_date: Option<String>,

    /// Scheduled time (HH:MM).
    #[arg(long)]
    pub scheduled_time: Option<String>,

    /// Next occurrence as an RFC 3339 timestamp.
    #[arg(long)]
    pub next_schedule_time: Option<String>,

    /// IANA time zone of the schedule.
    #[arg(long)]
    pub timezone: Option<String>,
}

#[derive(Args, Debug)]
pub struct TaskCreateArgs {
    /// Task title.
    #[arg(required_unless_present = "from_file")]
    pub title: Option<String>,

    /// Parent task id.
    #[arg(long)]
    pub parent: Option<String>,

    /// Explicit task id (replaces an existing task with that id).
    #[arg(long)]
    pub id: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    #[arg(long)]
    pub estimate: Option<String>,

    /// Label (repeatable).
    #[arg(short = 'l', long = "label")]
    pub labels: Vec<String>,

    /// Free-form task type.
    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    /// Requested initial status.
    #[arg(long)]
    pub status: Option<String>,

    /// Checklist item (repeatable).
    #[arg(long = "check")]
    pub checklist: Vec<String>,

    /// Acceptance criterion (repeatable).
    #[arg(long = "criterion")]
    pub criteria: Vec<String>,

    /// Dependency task id (repeatable).
    #[arg(long = "depends-on")]
    pub dependencies: Vec<String>,

    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// Read the whole payload as JSON from a file (`-` for stdin).
    #[arg(long, conflicts_with = "title")]
    pub from_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TaskUpdateArgs {
    /// Task id.
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    #[arg(long)]
    pub estimate: Option<String>,

    /// Replace labels (repeatable).
    #[arg(short = 'l', long = "label")]
    pub labels: Vec<String>,

    #[arg(short = 't', long = "type")]
    pub task_type: Option<String>,

    /// Requested status (todo, in_progress, blocked, done).
    #[arg(short = 's', long)]
    pub status: Option<String>,

    /// Move under another parent.
    #[arg(long, conflicts_with = "detach")]
    pub parent: Option<String>,

    /// Make the task a root.
    #[arg(long)]
    pub detach: bool,

    /// Replace the checklist (repeatable).
    #[arg(long = "check")]
    pub checklist: Vec<String>,

    /// Approve QA in the same update.
    #[arg(long, conflicts_with = "reject")]
    pub approve: bool,

    /// Revoke QA approval in the same update.
    #[arg(long)]
    pub reject: bool,

    #[command(flatten)]
    pub schedule: ScheduleArgs,

    /// Clear every schedule field.
    #[arg(long, conflicts_with_all = ["scheduled_date", "scheduled_time", "next_schedule_time", "timezone"])]
    pub unschedule: bool,

    /// Note recorded in the schedule log when the schedule changes.
    #[arg(long)]
    pub note: Option<String>,

    /// Read the update payload as JSON from a file (`-` for stdin).
    #[arg(long)]
    pub from_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TaskAcceptArgs {
    /// Task id.
    pub id: String,

    /// Criterion id or label to mark satisfied (repeatable).
    #[arg(long)]
    pub satisfy: Vec<String>,

    /// Criterion id or label to mark unsatisfied (repeatable).
    #[arg(long)]
    pub unsatisfy: Vec<String>,

    /// Approve QA.
    #[arg(long, conflicts_with = "reject")]
    pub approve: bool,

    /// Revoke QA approval.
    #[arg(long)]
    pub reject: bool,

    /// Evidence reference (repeatable, replaces the list).
    #[arg(long)]
    pub evidence: Vec<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct TaskDepsArgs {
    /// Task id.
    pub id: String,

    /// Dependency ids. None clears the list.
    pub dependencies: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TaskListArgs {
    /// Only list children of this task.
    #[arg(long)]
    pub parent: Option<String>,

    /// Tree depth (top level is 1).
    #[arg(long)]
    pub depth: Option<usize>,
}

#[derive(Args, Debug)]
pub struct TaskShowArgs {
    /// Task id.
    pub id: String,

    /// Subtree depth (the task itself is 1).
    #[arg(long)]
    pub depth: Option<usize>,
}

// ---------------------------------------------------------------------------
// engagement
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct EngagementArgs {
    #[command(subcommand)]
    pub command: EngagementCommands,
}

#[derive(Subcommand, Debug)]
pub enum EngagementCommands {
    /// Record one interaction.
    Record(EngagementRecordArgs),

    /// Show a user's engagement profile.
    Show(EngagementShowArgs),
}

#[derive(Args, Debug)]
pub struct EngagementRecordArgs {
    pub user_id: String,

    /// IANA time zone of the user (default: push.default_timezone).
    #[arg(long)]
    pub timezone: Option<String>,

    /// When the interaction happened (RFC 3339, default: now).
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args, Debug)]
pub struct EngagementShowArgs {
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// push
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct PushArgs {
    #[command(subcommand)]
    pub command: PushCommands,
}

#[derive(Subcommand, Debug)]
pub enum PushCommands {
    /// Register (or re-register) a push endpoint.
    Register(PushRegisterArgs),

    /// List registrations.
    List,

    /// Remove a registration.
    Remove(PushRemoveArgs),

    /// Run a single scheduler tick.
    Tick(PushTickArgs),

    /// Run the scheduler loop until interrupted.
    Run,
}

#[derive(Args, Debug)]
pub struct PushRegisterArgs {
    /// Endpoint URL deliveries are posted to.
    pub endpoint: String,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub timezone: Option<String>,

    /// Subscription key as NAME=VALUE (repeatable).
    #[arg(long = "key")]
    pub keys: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PushRemoveArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct PushTickArgs {
    /// Evaluate as if it were this instant (RFC 3339, default: now).
    #[arg(long)]
    pub at: Option<String>,
}

// ---------------------------------------------------------------------------
// config / completion
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (file + environment).
    Show,

    /// Print the path of config.yaml.
    Path,
}

#[derive(Args, Debug)]
pub struct CompletionArgs {
    #[command(subcommand)]
    pub command: CompletionCommands,
}

#[derive(Subcommand, Debug)]
pub enum CompletionCommands {
    /// Generate bash completions.
    Bash,
    /// Generate zsh completions.
    Zsh,
    /// Generate fish completions.
    Fish,
    /// Generate PowerShell completions.
    Powershell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_task_update() {
        let cli = Cli::try_parse_from([
            "cadence", "--json", "task", "update", "task-abc", "--status", "done", "--approve",
        ])
        .unwrap();
        assert!(cli.global.json);
        match cli.command {
            Some(Commands::Task(TaskArgs {
                command: TaskCommands::Update(args),
            })) => {
                assert_eq!(args.id, "task-abc");
                assert_eq!(args.status.as_deref(), Some("done"));
                assert!(args.approve);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
