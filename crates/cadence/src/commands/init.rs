//! `cadence init` -- create a `.cadence` directory.

use std::env;
use std::fs;

use anyhow::{Context, Result, bail};

use cadence_config::config::{CONFIG_FILE, StorageBackend, load_config, save_config};
use cadence_config::data_dir::ensure_data_dir;

use crate::cli::{BackendArg, InitArgs};
use crate::context::RuntimeContext;
use crate::output::output_json;

const GITIGNORE_CONTENT: &str = r#"# cadence local state
*.lock
*.db
*.db-wal
*.db-shm
"#;

/// Execute the `cadence init` command.
pub fn run(ctx: &RuntimeContext, args: &InitArgs) -> Result<()> {
    let data_dir = match ctx.data_dir {
        Some(ref dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
            dir.clone()
        }
        None => {
            let cwd = env::current_dir().context("failed to get current directory")?;
            ensure_data_dir(&cwd).context("failed to create .cadence directory")?
        }
    };

    let config_path = data_dir.join(CONFIG_FILE);
    let exists = config_path.exists();
    if exists && !args.force {
        bail!(
            "{} already exists\n\nThis workspace is already initialized. Use --force to rewrite its config.",
            config_path.display()
        );
    }

    let mut config = if exists {
        load_config(&data_dir)
            .with_context(|| format!("failed to read {}", config_path.display()))?
    } else {
        Default::default()
    };
    if let Some(ref prefix) = args.prefix {
        config.tasks.id_prefix = prefix.trim_end_matches('-').to_string();
    }
    if let Some(backend) = args.backend {
        config.storage.backend = match backend {
            BackendArg::Jsonl => StorageBackend::Jsonl,
            BackendArg::Sqlite => StorageBackend::Sqlite,
            BackendArg::Memory => StorageBackend::Memory,
        };
    }
    config.validate().context("invalid configuration")?;
    save_config(&data_dir, &config)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    let gitignore_path = data_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(&gitignore_path, GITIGNORE_CONTENT).with_context(|| {
            format!("failed to create .gitignore: {}", gitignore_path.display())
        })?;
    }

    if ctx.json {
        output_json(&serde_json::json!({
            "data_dir": data_dir,
            "config": config_path,
            "backend": config.storage.backend.as_str(),
            "id_prefix": config.tasks.id_prefix,
        }));
    } else if !ctx.quiet {
        println!("cadence initialized in {}", data_dir.display());
        println!("  Backend: {}", config.storage.backend.as_str());
        println!(
            "  Tasks will be named: {}-<hash> (e.g., {}-a3f)",
            config.tasks.id_prefix, config.tasks.id_prefix
        );
    }

    Ok(())
}
