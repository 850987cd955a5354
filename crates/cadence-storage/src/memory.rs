//! [`MemoryStore`] -- mutex-guarded in-memory record store.

use std::sync::Mutex;

use crate::error::{Result, StorageError};
use crate::traits::{Record, RecordStore};

/// Keeps records in process memory. Nothing survives a restart.
#[derive(Debug)]
pub struct MemoryStore<T> {
    records: Mutex<Vec<T>>,
}

impl<T: Record> MemoryStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Creates a store pre-seeded with `records`.
    pub fn with_records(records: Vec<T>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<T>>> {
        self.records
            .lock()
            .map_err(|e| StorageError::Lock(format!("mutex poisoned: {e}")))
    }
}

impl<T: Record> RecordStore<T> for MemoryStore<T> {
    fn load(&self) -> Result<Vec<T>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, records: &[T]) -> Result<()> {
        *self.lock()? = records.to_vec();
        Ok(())
    }

    fn transact(&self, f: &mut dyn FnMut(&mut Vec<T>) -> Result<()>) -> Result<()> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        f(&mut working)?;
        *guard = working;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory:{}", T::COLLECTION)
    }
}
