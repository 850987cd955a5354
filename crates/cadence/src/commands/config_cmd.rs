//! `cadence config` -- inspect configuration.

use anyhow::{Context, Result};

use cadence_config::config::CONFIG_FILE;

use crate::cli::{ConfigArgs, ConfigCommands};
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `cadence config` command.
pub fn run(ctx: &RuntimeContext, args: &ConfigArgs) -> Result<()> {
    let ws = ctx.workspace()?;
    match args.command {
        ConfigCommands::Show => {
            if ctx.json {
                output_json(&ws.config);
            } else {
                let yaml =
                    serde_yaml::to_string(&ws.config).context("failed to render configuration")?;
                print!("{yaml}");
            }
        }
        ConfigCommands::Path => {
            let path = ws.data_dir.join(CONFIG_FILE);
            if ctx.json {
                output_json(&serde_json::json!({ "path": path }));
            } else {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
