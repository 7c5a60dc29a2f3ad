//! Durable storage for the persisted session record

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;

use super::state::PersistedSession;
use crate::util::paths::session_state_path;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("State record is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Session-scoped durable key/value slot. Absence means idle.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedSession>, StoreError>;

    async fn save(&self, record: &PersistedSession) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory store. Clones share the same slot, so a fresh coordinator built
/// on a clone sees what an evicted one wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    slot: Arc<Mutex<Option<PersistedSession>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<PersistedSession> {
        *self.slot.lock()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        Ok(*self.slot.lock())
    }

    async fn save(&self, record: &PersistedSession) -> Result<(), StoreError> {
        *self.slot.lock() = Some(*record);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.slot.lock().take();
        Ok(())
    }
}

/// JSON file store, written atomically through a sibling temp file
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<data_dir>/session-state.json`
    pub fn at_default_location() -> Self {
        Self::new(session_state_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<Option<PersistedSession>, StoreError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(path: &Path, record: &PersistedSession) -> Result<(), StoreError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let contents = serde_json::to_string_pretty(record)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        io::Write::write_all(&mut tmp, contents.as_bytes())?;
        tmp.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    fn remove(path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

async fn blocking<T, F>(task: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StoreError::Io(io::Error::other(err)))?
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        let path = self.path.clone();
        blocking(move || Self::read(&path)).await
    }

    async fn save(&self, record: &PersistedSession) -> Result<(), StoreError> {
        let path = self.path.clone();
        let record = *record;
        blocking(move || Self::write(&path, &record)).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let path = self.path.clone();
        blocking(move || Self::remove(&path)).await
    }
}
