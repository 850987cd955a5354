//! [`SqliteStore`] -- SQLite-backed record store.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::error::{Result, StorageError};
use crate::sqlite::schema;
use crate::traits::{Record, RecordStore};

/// SQLite-backed implementation of [`RecordStore`].
///
/// Wraps a [`rusqlite::Connection`] in a `Mutex` for thread safety. Several
/// stores (one per record type) may open the same database file; writes are
/// serialized by SQLite through `BEGIN IMMEDIATE` and the busy timeout.
pub struct SqliteStore<T> {
    /// The mutex-protected SQLite connection.
    conn: Mutex<Connection>,
    label: String,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> SqliteStore<T> {
    /// Opens (or creates) a SQLite database at the given path.
    ///
    /// Enables WAL mode, then initialises the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(?path, collection = T::COLLECTION, "opening SQLite database");

        let conn = Connection::open(path).map_err(|e| {
            StorageError::Unavailable(format!("failed to open {}: {e}", path.display()))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            label: format!("{}#{}", path.display(), T::COLLECTION),
            _record: PhantomData,
        };
        store.configure_connection()?;
        store.init_schema()?;

        Ok(store)
    }

    /// Opens an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory SQLite database");
        let conn = Connection::open_in_memory().map_err(|e| {
            StorageError::Unavailable(format!("failed to open in-memory db: {e}"))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            label: format!(":memory:#{}", T::COLLECTION),
            _record: PhantomData,
        };
        store.configure_connection()?;
        store.init_schema()?;

        Ok(store)
    }

    /// Sets connection pragmas (WAL mode, busy timeout).
    fn configure_connection(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| StorageError::Unavailable(format!("failed to set pragmas: {e}")))?;
        Ok(())
    }

    /// Creates tables if they do not exist and records the schema version.
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;

        let version: std::result::Result<String, _> = conn.query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        );
        if let Ok(v) = version {
            if v.parse::<i32>().unwrap_or(0) >= schema::CURRENT_SCHEMA_VERSION {
                debug!(version = %v, "schema already at current version, skipping init");
                return Ok(());
            }
        }

        for stmt in schema::SCHEMA_STATEMENTS {
            if let Err(e) = conn.execute_batch(stmt) {
                let err = StorageError::from(e);
                if err.is_read_only() {
                    warn!("database is read-only, skipping schema init");
                    return Ok(());
                }
                return Err(err);
            }
        }

        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![schema::CURRENT_SCHEMA_VERSION.to_string()],
        )?;

        debug!("schema initialized (version {})", schema::CURRENT_SCHEMA_VERSION);
        Ok(())
    }

    /// Acquires the connection lock.
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(format!("mutex poisoned: {e}")))
    }
}

fn load_on<T: Record>(conn: &Connection) -> Result<Vec<T>> {
    let mut stmt =
        conn.prepare("SELECT body FROM records WHERE collection = ?1 ORDER BY position, id")?;
    let bodies = stmt
        .query_map(params![T::COLLECTION], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(StorageError::from))
        .collect()
}

fn save_on<T: Record>(conn: &Connection, records: &[T]) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "DELETE FROM records WHERE collection = ?1",
        params![T::COLLECTION],
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO records (collection, id, position, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, record) in records.iter().enumerate() {
        let body = serde_json::to_string(record)?;
        stmt.execute(params![
            T::COLLECTION,
            record.record_id(),
            position as i64,
            body,
            now
        ])?;
    }
    Ok(())
}

impl<T: Record> RecordStore<T> for SqliteStore<T> {
    fn load(&self) -> Result<Vec<T>> {
        let conn = self.lock_conn()?;
        load_on(&conn)
    }

    fn save(&self, records: &[T]) -> Result<()> {
        let conn = self.lock_conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        save_on(&tx, records)?;
        tx.commit()?;
        Ok(())
    }

    fn transact(&self, f: &mut dyn FnMut(&mut Vec<T>) -> Result<()>) -> Result<()> {
        let conn = self.lock_conn()?;
        let tx = match Transaction::new_unchecked(&conn, TransactionBehavior::Immediate) {
            Ok(tx) => tx,
            Err(e) => {
                let err = StorageError::from(e);
                if !err.is_read_only() {
                    return Err(err);
                }
                // Still run the closure so the caller can keep the result in
                // memory; the write itself is refused.
                let mut records = load_on(&conn)?;
                f(&mut records)?;
                return Err(err);
            }
        };

        let mut records = load_on(&tx)?;
        // Rolled back on drop if `f` or the save fails.
        f(&mut records)?;
        save_on(&tx, &records)?;
        tx.commit()?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl<T> std::fmt::Debug for SqliteStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::task::{Task, TaskBuilder};

    fn test_store() -> SqliteStore<Task> {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn schema_version_set() {
        let store = test_store();
        let conn = store.lock_conn().unwrap();
        let version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, schema::CURRENT_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn idempotent_init() {
        let store = test_store();
        store.init_schema().unwrap();
        let conn = store.lock_conn().unwrap();
        let keys: Vec<String> = conn
            .prepare("SELECT key FROM metadata ORDER BY key")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(keys, vec!["schema_version"]);
    }

    #[test]
    fn save_and_load_round_trip_order() {
        let store = test_store();
        store
            .save(&[
                TaskBuilder::new("task-z", "last").build(),
                TaskBuilder::new("task-a", "first").build(),
            ])
            .unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].task_id, "task-z");
        assert_eq!(loaded[1].task_id, "task-a");
    }

    #[test]
    fn transaction_commit() {
        let store = test_store();
        store
            .transact(&mut |records| {
                records.push(TaskBuilder::new("task-tx1", "In transaction").build());
                Ok(())
            })
            .unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].title, "In transaction");
    }

    #[test]
    fn transaction_rollback_on_error() {
        let store = test_store();
        store.save(&[TaskBuilder::new("task-1", "keep").build()]).unwrap();

        let result = store.transact(&mut |records| {
            records.clear();
            Err(StorageError::Internal("intentional".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn collections_are_isolated() {
        #[derive(Clone, serde::Serialize, serde::Deserialize)]
        struct Note {
            id: String,
        }
        impl Record for Note {
            const COLLECTION: &'static str = "notes";
            fn record_id(&self) -> &str {
                &self.id
            }
        }

        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("cadence.db");
        let tasks = SqliteStore::<Task>::open(&db).unwrap();
        let notes = SqliteStore::<Note>::open(&db).unwrap();

        tasks.save(&[TaskBuilder::new("task-1", "x").build()]).unwrap();
        notes.save(&[Note { id: "n1".into() }]).unwrap();
        notes.save(&[]).unwrap();

        assert_eq!(tasks.load().unwrap().len(), 1);
        assert!(notes.load().unwrap().is_empty());
    }
}
