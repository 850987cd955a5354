//! Storage error types.

use std::path::PathBuf;

use cadence_core::jsonl::JsonlError;

/// Errors that can occur during storage and repository operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "task", "registration").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A requested status change failed the done-gate.
    #[error("invalid transition for {id}: {reason}")]
    InvalidTransition {
        /// The task whose transition was refused.
        id: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The backing store could not be read or written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backing store lives on a read-only filesystem.
    #[error("storage is read-only: {}", path.display())]
    ReadOnly {
        /// File or directory that refused the write.
        path: PathBuf,
    },

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A JSONL file could not be decoded.
    #[error("jsonl error in {}: {source}", path.display())]
    Jsonl {
        /// The file being read.
        path: PathBuf,
        /// Underlying decode error.
        source: JsonlError,
    },

    /// Another process holds the store lock, or a mutex was poisoned.
    #[error("lock error: {0}")]
    Lock(String),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`StorageError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a [`StorageError::InvalidTransition`].
    pub fn invalid_transition(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Wraps any other error as [`StorageError::Unavailable`].
    pub fn unavailable(source: impl std::fmt::Display) -> Self {
        Self::Unavailable(source.to_string())
    }

    /// Maps an I/O error on `path` to [`StorageError::ReadOnly`] when the
    /// filesystem refused the write, and to [`StorageError::Io`] otherwise.
    pub fn from_write(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if is_read_only_io(&err) {
            Self::ReadOnly { path: path.into() }
        } else {
            Self::Io(err)
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a [`StorageError::InvalidTransition`].
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Returns `true` if the store refused a write because it is read-only.
    pub fn is_read_only(&self) -> bool {
        match self {
            Self::ReadOnly { .. } => true,
            Self::Query(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ReadOnly
            }
            _ => false,
        }
    }

    /// Returns `true` for errors caused by the caller rather than the store.
    pub fn is_domain(&self) -> bool {
        self.is_not_found() || self.is_invalid_transition()
    }

    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry (e.g., database busy, lock contention).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Lock(_) | Self::Unavailable(_) => true,
            Self::Query(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

fn is_read_only_io(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::ReadOnlyFilesystem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_io_is_classified() {
        let err = std::io::Error::from(std::io::ErrorKind::ReadOnlyFilesystem);
        assert!(StorageError::from_write("/tmp/x", err).is_read_only());

        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(!StorageError::from_write("/tmp/x", err).is_read_only());
    }

    #[test]
    fn domain_errors() {
        assert!(StorageError::not_found("task", "t-1").is_domain());
        assert!(StorageError::invalid_transition("t-1", "QA not approved").is_domain());
        assert!(!StorageError::unavailable("disk gone").is_domain());
    }

    #[test]
    fn display_includes_reason() {
        let err = StorageError::invalid_transition("task-1", "subtasks incomplete");
        assert_eq!(err.to_string(), "invalid transition for task-1: subtasks incomplete");
    }
}
