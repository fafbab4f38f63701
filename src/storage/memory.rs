//! In-memory store
//!
//! Both indexes sit behind one lock so a writer updates them together.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{RegistryStore, StorageError};
use crate::crypto::Address;
use crate::registry::DomainRecord;

#[derive(Debug, Default)]
struct Indexes {
    forward: BTreeMap<String, DomainRecord>,
    reverse: BTreeMap<Address, String>,
}

/// Store for tests and throwaway nodes
#[derive(Debug, Default)]
pub struct MemoryStore {
    indexes: RwLock<Indexes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.indexes.read().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().forward.is_empty()
    }
}

impl RegistryStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<DomainRecord>, StorageError> {
        Ok(self.indexes.read().forward.get(name).cloned())
    }

    fn name_for_reverse(&self, reverse: &Address) -> Result<Option<String>, StorageError> {
        Ok(self.indexes.read().reverse.get(reverse).cloned())
    }

    fn insert(&self, record: &DomainRecord) -> Result<bool, StorageError> {
        let mut indexes = self.indexes.write();
        if indexes.forward.contains_key(&record.name) {
            return Ok(false);
        }
        indexes.forward.insert(record.name.clone(), record.clone());
        indexes.reverse.insert(record.reverse_address, record.name.clone());
        Ok(true)
    }

    fn replace(&self, record: &DomainRecord) -> Result<(), StorageError> {
        let mut indexes = self.indexes.write();
        indexes.forward.insert(record.name.clone(), record.clone());
        indexes.reverse.insert(record.reverse_address, record.name.clone());
        Ok(())
    }

    fn remove(&self, record: &DomainRecord) -> Result<(), StorageError> {
        let mut indexes = self.indexes.write();
        indexes.forward.remove(&record.name);
        indexes.reverse.remove(&record.reverse_address);
        Ok(())
    }

    fn list(&self) -> Result<Vec<DomainRecord>, StorageError> {
        Ok(self.indexes.read().forward.values().cloned().collect())
    }
}
