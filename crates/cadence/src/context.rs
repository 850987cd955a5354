//! Runtime context for command execution.
//!
//! The [`RuntimeContext`] holds the global flags and knows how to find the
//! data directory, load configuration and open stores for it.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use cadence_config::config::{self as config_file, CadenceConfig, StorageBackend};
use cadence_config::data_dir::find_data_dir;
use cadence_core::task::Task;
use cadence_push::{EngagementProfile, EngagementTracker, PushRegistration, PushRegistry};
use cadence_storage::{
    JsonlStore, MemoryStore, Record, RecordStore, RepositoryOptions, SqliteStore, TaskRepository,
};

use crate::cli::GlobalArgs;

/// SQLite database file inside the storage directory.
pub const DB_FILE: &str = "cadence.db";

pub type DynStore<T> = Box<dyn RecordStore<T>>;
pub type Repository = TaskRepository<DynStore<Task>>;
pub type Tracker = EngagementTracker<DynStore<EngagementProfile>>;
pub type Registry = PushRegistry<DynStore<PushRegistration>>;

/// Runtime context passed to every command handler.
///
/// Constructed once in `main` after CLI parsing, before command dispatch.
#[derive(Debug)]
pub struct RuntimeContext {
    /// Explicit `--data-dir`.
    pub data_dir: Option<PathBuf>,

    /// Explicit `--actor` (or `$CADENCE_ACTOR`).
    pub actor_flag: Option<String>,

    /// Whether to produce JSON output.
    pub json: bool,

    pub verbose: bool,

    /// Suppress non-essential output.
    pub quiet: bool,
}

/// Everything a data command needs: where the data lives and how it is
/// configured.
#[derive(Debug)]
pub struct Workspace {
    pub data_dir: PathBuf,
    pub config: CadenceConfig,
    pub actor: String,
}

impl RuntimeContext {
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        Self {
            data_dir: global.data_dir.clone(),
            actor_flag: global.actor.clone(),
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
        }
    }

    /// Resolves the data directory: `--data-dir`, then `$CADENCE_DIR`, then
    /// the nearest `.cadence/` above the current directory.
    pub fn resolve_data_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Some(dir.clone());
        }
        let cwd = env::current_dir().ok()?;
        find_data_dir(&cwd)
    }

    /// Opens the workspace, loading the layered configuration.
    pub fn workspace(&self) -> Result<Workspace> {
        let data_dir = self
            .resolve_data_dir()
            .context("no .cadence directory found. Run 'cadence init' to create one.")?;
        if !data_dir.is_dir() {
            anyhow::bail!(
                "data directory {} does not exist\nHint: run 'cadence init' to create it",
                data_dir.display()
            );
        }
        let config = config_file::load_layered(&data_dir)
            .with_context(|| format!("failed to load configuration from {}", data_dir.display()))?;
        let actor = resolve_actor(self.actor_flag.as_deref(), config.actor.as_deref());
        Ok(Workspace {
            data_dir,
            config,
            actor,
        })
    }
}

impl Workspace {
    /// Directory the record files live in.
    pub fn storage_dir(&self) -> PathBuf {
        match self.config.storage.data_dir {
            Some(ref dir) if dir.is_absolute() => dir.clone(),
            Some(ref dir) => self.data_dir.join(dir),
            None => self.data_dir.clone(),
        }
    }

    /// Opens the configured backend for records of type `T`.
    pub fn open_store<T: Record>(&self) -> Result<DynStore<T>> {
        open_store(self.config.storage.backend, &self.storage_dir())
    }

    pub fn task_repository(&self) -> Result<Repository> {
        let options = RepositoryOptions {
            id_prefix: self.config.tasks.id_prefix.clone(),
            default_max_depth: self.config.tasks.default_max_depth,
        };
        Ok(TaskRepository::with_options(self.open_store()?, options))
    }

    pub fn engagement_tracker(&self) -> Result<Tracker> {
        Ok(EngagementTracker::new(self.open_store()?)
            .with_max_total_events(self.config.engagement.max_total_events)
            .with_default_timezone(self.config.push.default_timezone.clone()))
    }

    pub fn push_registry(&self) -> Result<Registry> {
        Ok(PushRegistry::new(self.open_store()?))
    }
}

/// Opens a store of `backend` kind rooted at `dir`.
pub fn open_store<T: Record>(backend: StorageBackend, dir: &Path) -> Result<DynStore<T>> {
    let store: DynStore<T> = match backend {
        StorageBackend::Jsonl => Box::new(JsonlStore::<T>::in_dir(dir)),
        StorageBackend::Sqlite => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let path = dir.join(DB_FILE);
            Box::new(
                SqliteStore::<T>::open(&path)
                    .with_context(|| format!("failed to open database: {}", path.display()))?,
            )
        }
        StorageBackend::Memory => Box::new(MemoryStore::<T>::new()),
    };
    Ok(store)
}

/// Resolves the actor name.
///
/// Priority: explicit flag (or `$CADENCE_ACTOR`) > config `actor` > `$USER` /
/// `$USERNAME` > `"unknown"`.
fn resolve_actor(flag_value: Option<&str>, configured: Option<&str>) -> String {
    if let Some(actor) = flag_value.filter(|a| !a.is_empty()) {
        return actor.to_string();
    }

    if let Some(actor) = configured.filter(|a| !a.is_empty()) {
        return actor.to_string();
    }

    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        if !user.is_empty() {
            return user;
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_actor_with_flag() {
        assert_eq!(resolve_actor(Some("alice"), Some("bob")), "alice");
    }

    #[test]
    fn resolve_actor_falls_back_to_config() {
        assert_eq!(resolve_actor(Some(""), Some("bob")), "bob");
    }

    #[test]
    fn resolve_actor_never_empty() {
        assert!(!resolve_actor(None, None).is_empty());
    }

    #[test]
    fn storage_dir_is_relative_to_data_dir() {
        let mut config = CadenceConfig::default();
        config.storage.data_dir = Some(PathBuf::from("records"));
        let ws = Workspace {
            data_dir: PathBuf::from("/tmp/project/.cadence"),
            config,
            actor: "alice".into(),
        };
        assert_eq!(ws.storage_dir(), PathBuf::from("/tmp/project/.cadence/records"));
    }

    #[test]
    fn sqlite_backend_creates_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = open_store::<Task>(StorageBackend::Sqlite, dir.path()).unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(dir.path().join(DB_FILE).exists());
    }
}
