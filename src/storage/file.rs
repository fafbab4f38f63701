//! Single-file JSON snapshot store
//!
//! The whole registry is one JSON document. Every call re-reads the file, and
//! every write replaces it through a temp file in the same directory.
//! Writers hold an exclusive OS lock on `<path>.lock` from load to rename, so
//! separate handles and separate processes serialize on the same file.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{RegistryStore, StorageError};
use crate::crypto::Address;
use crate::registry::DomainRecord;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    domains: BTreeMap<String, DomainRecord>,
    #[serde(default)]
    reverse: BTreeMap<String, String>,
}

/// Held for the whole read-modify-write span; released on drop
struct SnapshotLock(File);

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

/// Registry persisted as a JSON file
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Block until this handle is the only writer of the snapshot
    fn lock(&self) -> Result<SnapshotLock, StorageError> {
        fs::create_dir_all(self.dir())?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.lock_path())?;
        file.lock_exclusive()?;
        Ok(SnapshotLock(file))
    }

    fn load(&self) -> Result<Snapshot, StorageError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|source| StorageError::Snapshot {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let dir = self.dir();

        let body = serde_json::to_vec_pretty(snapshot).map_err(|source| StorageError::Snapshot {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;

        debug!(path = %self.path.display(), domains = snapshot.domains.len(), "Snapshot written");
        Ok(())
    }
}

impl RegistryStore for JsonFileStore {
    fn get(&self, name: &str) -> Result<Option<DomainRecord>, StorageError> {
        Ok(self.load()?.domains.remove(name))
    }

    fn name_for_reverse(&self, reverse: &Address) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.reverse.remove(&reverse.to_base58()))
    }

    fn insert(&self, record: &DomainRecord) -> Result<bool, StorageError> {
        let _lock = self.lock()?;
        let mut snapshot = self.load()?;
        if snapshot.domains.contains_key(&record.name) {
            return Ok(false);
        }
        snapshot.domains.insert(record.name.clone(), record.clone());
        snapshot
            .reverse
            .insert(record.reverse_address.to_base58(), record.name.clone());
        self.save(&snapshot)?;
        Ok(true)
    }

    fn replace(&self, record: &DomainRecord) -> Result<(), StorageError> {
        let _lock = self.lock()?;
        let mut snapshot = self.load()?;
        snapshot.domains.insert(record.name.clone(), record.clone());
        snapshot
            .reverse
            .insert(record.reverse_address.to_base58(), record.name.clone());
        self.save(&snapshot)
    }

    fn remove(&self, record: &DomainRecord) -> Result<(), StorageError> {
        let _lock = self.lock()?;
        let mut snapshot = self.load()?;
        snapshot.domains.remove(&record.name);
        snapshot.reverse.remove(&record.reverse_address.to_base58());
        self.save(&snapshot)
    }

    fn list(&self) -> Result<Vec<DomainRecord>, StorageError> {
        Ok(self.load()?.domains.into_values().collect())
    }
}
