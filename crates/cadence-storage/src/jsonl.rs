//! [`JsonlStore`] -- one JSON object per line in a single file.
//!
//! Saves go to a temporary file in the same directory and are renamed over the
//! target, so readers never observe a half-written file. Writers serialize on
//! an exclusive `fs2` lock held on a sidecar `<file>.lock`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, trace};

use cadence_core::jsonl::{JsonlError, read_jsonl, write_jsonl};

use crate::error::{Result, StorageError};
use crate::traits::{Record, RecordStore};

/// JSONL-file backed record store.
#[derive(Debug)]
pub struct JsonlStore<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> JsonlStore<T> {
    /// Uses the file at `path`. The file need not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    /// Uses `<dir>/<collection>.jsonl`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::open(dir.as_ref().join(format!("{}.jsonl", T::COLLECTION)))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Takes the exclusive writer lock.
    ///
    /// Returns `None` on a read-only filesystem: nobody can write there, and
    /// the subsequent save reports [`StorageError::ReadOnly`] on its own.
    fn acquire_lock(&self) -> Result<Option<File>> {
        let lock_path = self.lock_path();
        let opened = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path);
        let file = match opened {
            Ok(file) => file,
            Err(e) => {
                let err = StorageError::from_write(&lock_path, e);
                if err.is_read_only() {
                    debug!(path = %lock_path.display(), "read-only filesystem, skipping lock");
                    return Ok(None);
                }
                return Err(err);
            }
        };
        file.lock_exclusive().map_err(|e| {
            StorageError::Lock(format!("failed to lock {}: {e}", lock_path.display()))
        })?;
        trace!(path = %lock_path.display(), "acquired lock");
        Ok(Some(file))
    }

    fn read_all(&self) -> Result<Vec<T>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };
        read_jsonl(BufReader::new(file))
            .collect::<std::result::Result<Vec<T>, JsonlError>>()
            .map_err(|source| StorageError::Jsonl {
                path: self.path.clone(),
                source,
            })
    }

    fn write_all(&self, records: &[T]) -> Result<()> {
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|e| StorageError::from_write(&dir, e))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| StorageError::from_write(&dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write_jsonl(&mut writer, records).map_err(|e| match e {
                JsonlError::Io(io) => StorageError::from_write(&self.path, io),
                other => StorageError::Jsonl {
                    path: self.path.clone(),
                    source: other,
                },
            })?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::from_write(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::from_write(&self.path, e.error))?;

        debug!(path = %self.path.display(), count = records.len(), "saved records");
        Ok(())
    }
}

impl<T: Record> RecordStore<T> for JsonlStore<T> {
    fn load(&self) -> Result<Vec<T>> {
        self.read_all()
    }

    fn save(&self, records: &[T]) -> Result<()> {
        let _lock = self.acquire_lock()?;
        self.write_all(records)
    }

    fn transact(&self, f: &mut dyn FnMut(&mut Vec<T>) -> Result<()>) -> Result<()> {
        // The lock is released when the file handle drops.
        let _lock = self.acquire_lock()?;
        let mut records = self.read_all()?;
        f(&mut records)?;
        self.write_all(&records)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
