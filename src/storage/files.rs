//! Named file reads and writes under the serving directory.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

type LockTable = Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>;

/// Errors returned by [`FileStore`] operations.
#[derive(Debug)]
pub enum StoreError {
    /// The name is empty, absolute, or escapes the serving directory.
    InvalidName(String),
    /// No file with that name exists.
    NotFound,
    /// Any other filesystem failure.
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidName(name) => write!(f, "invalid file name: {name:?}"),
            StoreError::NotFound => write!(f, "file not found"),
            StoreError::Io(e) => write!(f, "file I/O failed: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound
        } else {
            StoreError::Io(e)
        }
    }
}

/// Reads and writes files under a fixed directory.
///
/// Each resolved path has its own reader/writer lock: writes to one name are
/// serialized and a read never sees a write in progress. Different names do
/// not contend. Cloning shares the lock table.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    locks: Arc<LockTable>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Maps a request name to a path inside the serving directory.
    ///
    /// Rejects names that could point outside it.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let invalid = name.is_empty()
            || name.starts_with('/')
            || name.contains(['\\', '\0'])
            || name
                .split('/')
                .any(|segment| segment.is_empty() || segment == "." || segment == "..");

        if invalid {
            return Err(StoreError::InvalidName(name.to_string()));
        }

        Ok(self.root.join(name))
    }

    /// Returns the full contents of `name`.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(name)?;
        let lock = self.lock_for(&path);

        let result = {
            let _guard = lock.read().await;
            tokio::fs::read(&path).await
        };

        self.release(&path, lock);
        Ok(result?)
    }

    /// Replaces the contents of `name` with `contents`, creating the file if needed.
    pub async fn write(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        let lock = self.lock_for(&path);

        let result = {
            let _guard = lock.write().await;
            tokio::fs::write(&path, contents).await
        };

        self.release(&path, lock);

        result.map_err(StoreError::Io)?;

        tracing::debug!(path = %path.display(), bytes = contents.len(), "File written");
        Ok(())
    }

    fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    // Drops the table entry once no other task holds it.
    fn release(&self, path: &Path, lock: Arc<RwLock<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
        drop(lock);
    }

    /// Number of names with an outstanding lock entry.
    pub fn active_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
