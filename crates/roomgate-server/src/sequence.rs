//! Durable counter behind generated identities and room names.
//!
//! The value lives in a small text file holding one decimal integer. Each
//! increment reads, bumps and rewrites it under an in-process lock, and the
//! rewrite goes through a temp file renamed over the original so a crash
//! never leaves a torn value behind. Only a missing file falls back to the
//! seed; any other read failure is an error.
//!
//! The lock is per process. Two servers sharing one counter file can still
//! race.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors from the durable counter.
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("failed to read counter file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write counter file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("counter file {} does not hold an integer: {content:?}", .path.display())]
    Corrupt { path: PathBuf, content: String },

    #[error("counter file {} is exhausted", .path.display())]
    Exhausted { path: PathBuf },

    #[error("counter task failed: {0}")]
    Task(String),
}

/// A file-backed, monotonically increasing counter.
///
/// Clones share the same lock.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    path: PathBuf,
    seed: u64,
    lock: Arc<Mutex<()>>,
}

impl SequenceCounter {
    pub fn new(path: impl Into<PathBuf>, seed: u64) -> Self {
        Self {
            path: path.into(),
            seed,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Increments the counter and returns the new value.
    ///
    /// From a fresh store the first value is `seed + 1`.
    pub async fn next(&self) -> Result<u64, CounterError> {
        let counter = self.clone();
        tokio::task::spawn_blocking(move || counter.next_blocking())
            .await
            .map_err(|e| CounterError::Task(e.to_string()))?
    }

    /// The last issued value, or the seed if nothing was issued yet.
    pub async fn current(&self) -> Result<u64, CounterError> {
        let counter = self.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = counter.lock.lock().unwrap_or_else(|e| e.into_inner());
            counter.read_value()
        })
        .await
        .map_err(|e| CounterError::Task(e.to_string()))?
    }

    /// Blocking form of [`SequenceCounter::next`].
    pub fn next_blocking(&self) -> Result<u64, CounterError> {
        // The guarded data is the file, so a poisoned lock is still usable.
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let value = self
            .read_value()?
            .checked_add(1)
            .ok_or_else(|| CounterError::Exhausted {
                path: self.path.clone(),
            })?;
        self.write_value(value)?;

        tracing::debug!(path = %self.path.display(), value, "advanced sequence counter");
        Ok(value)
    }

    fn read_value(&self) -> Result<u64, CounterError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(self.seed),
            Err(source) => {
                return Err(CounterError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        contents
            .trim()
            .parse()
            .map_err(|_| CounterError::Corrupt {
                path: self.path.clone(),
                content: contents.clone(),
            })
    }

    fn write_value(&self, value: u64) -> Result<(), CounterError> {
        let write_error = |source| CounterError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
        write!(file, "{}", value).map_err(write_error)?;
        file.as_file().sync_all().map_err(write_error)?;
        file.persist(&self.path).map_err(|e| write_error(e.error))?;
        Ok(())
    }
}
