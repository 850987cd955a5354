//! Discovery and management of the `.cadence/` data directory.
//!
//! The `.cadence/` directory holds the record files and `config.yaml`. This
//! module finds it by walking up the directory tree and creates it on
//! `cadence init`.

use crate::config::ConfigError;
use std::path::{Path, PathBuf};

/// The name of the cadence data directory.
pub const DATA_DIR_NAME: &str = ".cadence";

/// The name of the environment variable that can override the data directory.
pub const DATA_DIR_ENV: &str = "CADENCE_DIR";

/// Walk up the directory tree from `start` looking for a `.cadence/` directory.
///
/// The `CADENCE_DIR` environment variable is checked first (highest
/// priority). Returns `None` if the filesystem root is reached without
/// finding one.
///
/// # Examples
///
/// ```no_run
/// use cadence_config::data_dir::find_data_dir;
/// use std::path::Path;
///
/// if let Some(dir) = find_data_dir(Path::new(".")) {
///     println!("Found data dir at {}", dir.display());
/// }
/// ```
pub fn find_data_dir(start: &Path) -> Option<PathBuf> {
    if let Ok(env_dir) = std::env::var(DATA_DIR_ENV) {
        let env_path = PathBuf::from(&env_dir);
        if env_path.is_dir() {
            return Some(env_path);
        }
    }
    find_data_dir_from(start)
}

/// Like [`find_data_dir`] but ignores `CADENCE_DIR`.
pub fn find_data_dir_from(start: &Path) -> Option<PathBuf> {
    // Canonicalize the start path so we get absolute paths.
    let start = start.canonicalize().ok()?;

    let mut current = start.as_path();
    loop {
        let candidate = current.join(DATA_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent;
            }
            _ => break, // Reached filesystem root.
        }
    }

    None
}

/// Walk up the directory tree looking for `.cadence/`, returning an error if
/// not found.
///
/// # Errors
///
/// Returns [`ConfigError::DataDirNotFound`] if no `.cadence/` directory is
/// found.
pub fn find_data_dir_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_data_dir(start).ok_or(ConfigError::DataDirNotFound)
}

/// Ensure a `.cadence/` directory exists at the given path.
///
/// If `path` itself is not called `.cadence`, a `.cadence/` subdirectory is
/// created under it. Returns the path to the `.cadence/` directory.
///
/// # Errors
///
/// Returns [`ConfigError::ReadError`] if directory creation fails.
pub fn ensure_data_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let data_dir = if path.ends_with(DATA_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(DATA_DIR_NAME)
    };

    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_data_dir_in_temp() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join(".cadence");
        std::fs::create_dir(&data).unwrap();

        let found = find_data_dir_from(dir.path()).unwrap();
        // Canonicalize both for comparison (handles symlinks, /tmp vs /private/tmp).
        assert_eq!(found.canonicalize().unwrap(), data.canonicalize().unwrap());
    }

    #[test]
    fn test_find_data_dir_in_child() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join(".cadence");
        std::fs::create_dir(&data).unwrap();

        let child = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&child).unwrap();

        let found = find_data_dir_from(&child).unwrap();
        assert_eq!(found.canonicalize().unwrap(), data.canonicalize().unwrap());
    }

    #[test]
    fn test_ensure_data_dir_creates() {
        let dir = tempfile::tempdir().unwrap();
        let result = ensure_data_dir(dir.path()).unwrap();
        assert!(result.is_dir());
        assert!(result.ends_with(".cadence"));
    }

    #[test]
    fn test_ensure_data_dir_already_named() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join(".cadence");
        let result = ensure_data_dir(&data).unwrap();
        assert!(result.is_dir());
        assert_eq!(result, data);
    }

    #[test]
    fn test_ensure_data_dir_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = ensure_data_dir(dir.path()).unwrap();
        let second = ensure_data_dir(dir.path()).unwrap();
        assert_eq!(first, second);
    }
}
