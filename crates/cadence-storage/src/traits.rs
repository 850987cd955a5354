//! Record and RecordStore traits -- the public API for persistence.
//!
//! Consumers depend on these traits rather than on concrete implementations so
//! that alternative backends (in-memory, JSONL, SQLite) can be substituted.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use cadence_core::task::Task;

use crate::error::Result;

/// A persistable record with a stable identity.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the collection the record belongs to. Used as the SQLite
    /// partition key and the default JSONL file stem.
    const COLLECTION: &'static str;

    /// Stable identifier, unique within the collection.
    fn record_id(&self) -> &str;
}

impl Record for Task {
    const COLLECTION: &'static str = "tasks";

    fn record_id(&self) -> &str {
        &self.task_id
    }
}

/// Whole-collection persistence for one record type.
///
/// The core treats the store as a plain list: it loads everything, computes,
/// and saves everything back.
pub trait RecordStore<T: Record>: Send + Sync {
    /// Loads every record. A store that has never been written loads empty.
    fn load(&self) -> Result<Vec<T>>;

    /// Replaces the stored collection with `records`.
    fn save(&self, records: &[T]) -> Result<()>;

    /// Read-modify-write as one unit.
    ///
    /// Backends override this to hold their exclusive lock or transaction
    /// across the whole sequence. An error returned by `f` aborts the
    /// sequence without saving and is returned unchanged.
    fn transact(&self, f: &mut dyn FnMut(&mut Vec<T>) -> Result<()>) -> Result<()> {
        let mut records = self.load()?;
        f(&mut records)?;
        self.save(&records)
    }

    /// Short human-readable description for logs, e.g. the file path.
    fn describe(&self) -> String {
        T::COLLECTION.to_string()
    }
}

impl<T: Record, S: RecordStore<T> + ?Sized> RecordStore<T> for Box<S> {
    fn load(&self) -> Result<Vec<T>> {
        (**self).load()
    }

    fn save(&self, records: &[T]) -> Result<()> {
        (**self).save(records)
    }

    fn transact(&self, f: &mut dyn FnMut(&mut Vec<T>) -> Result<()>) -> Result<()> {
        (**self).transact(f)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: Record, S: RecordStore<T> + ?Sized> RecordStore<T> for Arc<S> {
    fn load(&self) -> Result<Vec<T>> {
        (**self).load()
    }

    fn save(&self, records: &[T]) -> Result<()> {
        (**self).save(records)
    }

    fn transact(&self, f: &mut dyn FnMut(&mut Vec<T>) -> Result<()>) -> Result<()> {
        (**self).transact(f)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Looks up a record by id in a loaded collection.
pub fn find_record<'a, T: Record>(records: &'a [T], id: &str) -> Option<&'a T> {
    records.iter().find(|r| r.record_id() == id)
}

/// Inserts `record`, replacing an existing record with the same id in place.
///
/// Returns `true` if an existing record was replaced.
pub fn upsert_record<T: Record>(records: &mut Vec<T>, record: T) -> bool {
    match records
        .iter()
        .position(|r| r.record_id() == record.record_id())
    {
        Some(i) => {
            records[i] = record;
            true
        }
        None => {
            records.push(record);
            false
        }
    }
}
