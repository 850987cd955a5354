//! Record stores and the task repository for the cadence system.
//!
//! Provides the [`RecordStore`] trait with in-memory, JSONL and SQLite
//! implementations, the [`StagedStore`] read-only save policy, and the
//! [`TaskRepository`] built on top of them.

pub mod error;
pub mod jsonl;
pub mod memory;
pub mod repository;
pub mod sqlite;
pub mod staged;
pub mod traits;

// Re-exports for convenience.
pub use error::{Result, StorageError};
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
pub use repository::{RepositoryOptions, TaskRepository};
pub use sqlite::SqliteStore;
pub use staged::StagedStore;
pub use traits::{Record, RecordStore, find_record, upsert_record};
