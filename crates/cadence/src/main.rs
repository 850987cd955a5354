//! `cadence` -- hierarchical task tracker with QA gates and adaptive daily
//! pushes.
//!
//! Parses CLI arguments with clap, resolves the runtime context, installs
//! logging and dispatches to command handlers.

mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use context::RuntimeContext;

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_logging(ctx: &RuntimeContext) {
    let default = if ctx.verbose {
        "cadence=debug"
    } else if ctx.quiet {
        "cadence=error"
    } else {
        "cadence=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(ctx.verbose)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let ctx = RuntimeContext::from_global_args(&cli.global);
    init_logging(&ctx);

    let result = match cli.command {
        Some(Commands::Init(args)) => commands::init::run(&ctx, &args),
        Some(Commands::Task(args)) => commands::task::run(&ctx, &args),
        Some(Commands::Engagement(args)) => commands::engagement::run(&ctx, &args),
        Some(Commands::Push(args)) => commands::push::run(&ctx, &args),
        Some(Commands::Config(args)) => commands::config_cmd::run(&ctx, &args),
        Some(Commands::Completion(args)) => commands::completion::run(&args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    // Handle errors: print message and exit with code 1
    if let Err(e) = result {
        if cli.global.json {
            let err_json = serde_json::json!({
                "error": format!("{:#}", e),
            });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{}", s);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}
