//! Storage module - durable forward and reverse domain indexes
//!
//! A store owns the consistency of its two indexes: every write touches the
//! forward entry (`name -> record`) and the reverse entry
//! (`reverse_address -> name`) as one unit.

pub mod db;
mod file;
mod memory;

pub use db::SledStore;
pub use file::*;
pub use memory::*;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::crypto::Address;
use crate::registry::DomainRecord;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Snapshot {path} is unreadable: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt entry under key {key}")]
    Corrupt { key: String },
}

/// Persistence behind a `DomainRegistry`
pub trait RegistryStore: Send + Sync {
    /// Forward lookup
    fn get(&self, name: &str) -> Result<Option<DomainRecord>, StorageError>;

    /// Reverse lookup
    fn name_for_reverse(&self, reverse: &Address) -> Result<Option<String>, StorageError>;

    /// Write both entries unless `record.name` already exists; returns
    /// whether the record was written
    fn insert(&self, record: &DomainRecord) -> Result<bool, StorageError>;

    /// Overwrite an existing record (and its reverse entry)
    fn replace(&self, record: &DomainRecord) -> Result<(), StorageError>;

    /// Remove both entries
    fn remove(&self, record: &DomainRecord) -> Result<(), StorageError>;

    /// All records ordered by name
    fn list(&self) -> Result<Vec<DomainRecord>, StorageError>;
}

/// Which store the node opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sled,
    JsonFile,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StorageBackend::Memory),
            "sled" => Ok(StorageBackend::Sled),
            "json_file" | "json" => Ok(StorageBackend::JsonFile),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Open the configured store
pub fn open_store(
    backend: StorageBackend,
    path: &std::path::Path,
) -> Result<Arc<dyn RegistryStore>, StorageError> {
    info!(?backend, path = %path.display(), "Opening registry store");
    Ok(match backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sled => Arc::new(SledStore::open(path)?),
        StorageBackend::JsonFile => Arc::new(JsonFileStore::new(path)),
    })
}
