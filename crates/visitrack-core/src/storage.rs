//! Local key-value persistence
//!
//! String-keyed, string-valued storage that survives across sessions:
//! - [`MemoryStore`] for process-local scopes and tests
//! - [`FileStore`] for a JSON map on disk, replaced atomically on every write
//!
//! Each key in [`keys`] is independently readable and writable.

use crate::error::StorageError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Storage keys used by the tracking components
pub mod keys {
    /// Visitor identity token
    pub const VISITOR_ID: &str = "user_tracking_id";
    /// Full visitor record snapshot (JSON)
    pub const VISITOR_RECORD: &str = "user_tracking_info";
    /// Visited path list (JSON array)
    pub const VISITED_PATHS: &str = "visited_routes";
    /// Home visit counter (decimal)
    pub const HOME_VISIT_COUNT: &str = "home_visit_count";
    /// Last known aggregate visitor count (decimal)
    pub const TOTAL_VISITOR_COUNT: &str = "total_visit_count";
}

/// Synchronous string key-value store
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read a value; `Ok(None)` if absent
    ///
    /// # Errors
    /// - `StorageError` if the backend cannot be read
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one
    ///
    /// # Errors
    /// - `StorageError` if the backend rejects the write
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// No keys stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file store
///
/// The whole map is rewritten through a temp file in the same directory and
/// renamed over the target, so readers never observe a partial file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open or create the store at `path`.
    ///
    /// A missing file starts empty. An unparsable file is treated as absent
    /// and overwritten on the next write.
    ///
    /// # Errors
    /// - `StorageError::Io` if an existing file cannot be read
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, String>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discarding malformed store file");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let display = self.path.display().to_string();
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| StorageError::io(display.clone(), e))?;

        let body = serde_json::to_vec_pretty(entries)?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| StorageError::io(display.clone(), e))?;
        tmp.write_all(&body)
            .map_err(|e| StorageError::io(display.clone(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::io(display, e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }
}
