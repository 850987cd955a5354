//! [`StagedStore`] -- a record store fronted by the last known collection.
//!
//! Writes refused by a read-only store stay staged in memory: reads serve
//! the staged collection and the next write replays it into the store.

use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use crate::error::{Result, StorageError};
use crate::traits::{Record, RecordStore};

struct Staged<T> {
    records: Vec<T>,
    /// At least one load or write has succeeded.
    loaded: bool,
    /// The last write was refused as read-only; `records` is newer than the
    /// store.
    degraded: bool,
}

/// Wraps a [`RecordStore`] with the read-only save policy.
pub struct StagedStore<S, T> {
    store: S,
    state: Mutex<Staged<T>>,
}

impl<T: Record, S: RecordStore<T>> StagedStore<S, T> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: Mutex::new(Staged {
                records: Vec::new(),
                loaded: false,
                degraded: false,
            }),
        }
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns `true` while writes are held in memory.
    pub fn is_degraded(&self) -> bool {
        self.lock().map(|s| s.degraded).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Staged<T>>> {
        self.state
            .lock()
            .map_err(|e| StorageError::Lock(format!("staged state poisoned: {e}")))
    }

    /// Runs `op` over the collection inside one store transaction.
    ///
    /// While degraded, the staged collection replaces whatever the store
    /// loads. A read-only refusal after `op` succeeded is logged and the
    /// result kept in memory; every other error is returned unchanged.
    pub fn mutate<R>(&self, op: impl FnOnce(&mut Vec<T>) -> Result<R>) -> Result<R> {
        let mut state = self.lock()?;
        let replay = state.degraded.then(|| state.records.clone());

        let mut op = Some(op);
        let mut output: Option<R> = None;
        let mut staged: Option<Vec<T>> = None;

        let result = self.store.transact(&mut |records| {
            if let Some(ref kept) = replay {
                *records = kept.clone();
            }
            let op = op
                .take()
                .ok_or_else(|| StorageError::Internal("mutation replayed".into()))?;
            output = Some(op(records)?);
            staged = Some(records.clone());
            Ok(())
        });

        match result {
            Ok(()) => {
                if state.degraded {
                    info!(store = %self.store.describe(), "store writable again");
                }
                state.degraded = false;
            }
            Err(e) if e.is_read_only() && staged.is_some() => {
                warn!(
                    store = %self.store.describe(),
                    error = %e,
                    "store is read-only, keeping state in memory"
                );
                state.degraded = true;
            }
            Err(e) => return Err(e),
        }

        if let Some(records) = staged {
            state.records = records;
            state.loaded = true;
        }
        output.ok_or_else(|| StorageError::Internal("mutation produced no result".into()))
    }

    /// Current collection.
    ///
    /// While degraded this is the staged collection. A failed load after an
    /// earlier success reuses the last known collection.
    pub fn load(&self) -> Result<Vec<T>> {
        let mut state = self.lock()?;
        if !state.degraded {
            match self.store.load() {
                Ok(records) => {
                    state.records = records;
                    state.loaded = true;
                }
                Err(e) if state.loaded => {
                    warn!(
                        store = %self.store.describe(),
                        error = %e,
                        "load failed, reusing last loaded state"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(state.records.clone())
    }

    /// Runs `f` over the collection as of the last load or write, without
    /// touching the store.
    pub fn with_staged<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let state = self.lock()?;
        Ok(f(&state.records))
    }
}

impl<S, T> std::fmt::Debug for StagedStore<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let degraded = self.state.lock().map(|s| s.degraded).unwrap_or(false);
        f.debug_struct("StagedStore")
            .field("degraded", &degraded)
            .finish_non_exhaustive()
    }
}
