//! File-backed store persisting a JSON snapshot.

use crate::error::{StoreError, StoreResult};
use crate::store::LocalStore;
use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use teamsync_model::EntitySet;
use tracing::debug;

/// A store persisting the entity set as one JSON document.
///
/// # Durability
///
/// Every write serializes the merged set to `<path>.tmp`, syncs it and
/// renames it over `<path>`. A crash or error mid-write leaves the previous
/// snapshot in place.
///
/// # Example
///
/// ```no_run
/// use teamsync_model::EntitySet;
/// use teamsync_store::{FileStore, LocalStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("cache/entities.json")).unwrap();
/// store.bulk_upsert(&EntitySet::new()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a store at `path`, creating parent directories if needed.
    ///
    /// The file itself is created on first write; a missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn load(&self) -> StoreResult<EntitySet> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(EntitySet::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupted(e.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(EntitySet::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn replace(&self, entities: &EntitySet) -> StoreResult<()> {
        let bytes =
            serde_json::to_vec(entities).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot replaced");
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn read_all(&self) -> StoreResult<EntitySet> {
        self.load()
    }

    fn bulk_upsert(&self, entities: &EntitySet) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut current = self.load()?;
        current.upsert_all(entities);
        self.replace(&current)
    }

    fn clear(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
