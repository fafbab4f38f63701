//! Database persistence layer using Sled
//!
//! Forward and reverse indexes live in separate trees and are always written
//! inside one multi-tree transaction, then flushed.

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use super::{RegistryStore, StorageError};
use crate::crypto::Address;
use crate::registry::DomainRecord;

const DOMAINS_TREE: &str = "domains";
const REVERSE_TREE: &str = "reverse";

/// Sled-backed registry store
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    domains: Tree,
    reverse: Tree,
}

fn unwrap_tx(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StorageError::Database(e),
    }
}

impl SledStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let domains = db.open_tree(DOMAINS_TREE)?;
        let reverse = db.open_tree(REVERSE_TREE)?;

        Ok(Self {
            db,
            domains,
            reverse,
        })
    }

    fn write_both(&self, record: &DomainRecord, only_if_absent: bool) -> Result<bool, StorageError> {
        let value = bincode::serialize(record)?;
        let name = record.name.as_bytes();
        let reverse_key = record.reverse_address.as_bytes().as_slice();

        let result: TransactionResult<bool, StorageError> =
            (&self.domains, &self.reverse).transaction(|(domains, reverse)| {
                if only_if_absent && domains.get(name)?.is_some() {
                    return Ok(false);
                }
                domains.insert(name, value.clone())?;
                reverse.insert(reverse_key, name)?;
                Ok(true)
            });

        let written = result.map_err(unwrap_tx)?;
        self.db.flush()?;
        Ok(written)
    }
}

impl RegistryStore for SledStore {
    fn get(&self, name: &str) -> Result<Option<DomainRecord>, StorageError> {
        match self.domains.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn name_for_reverse(&self, reverse: &Address) -> Result<Option<String>, StorageError> {
        match self.reverse.get(reverse.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StorageError::Corrupt {
                    key: reverse.to_base58(),
                }),
            None => Ok(None),
        }
    }

    fn insert(&self, record: &DomainRecord) -> Result<bool, StorageError> {
        self.write_both(record, true)
    }

    fn replace(&self, record: &DomainRecord) -> Result<(), StorageError> {
        self.write_both(record, false).map(|_| ())
    }

    fn remove(&self, record: &DomainRecord) -> Result<(), StorageError> {
        let name = record.name.as_bytes();
        let reverse_key = record.reverse_address.as_bytes().as_slice();

        let result: TransactionResult<(), StorageError> =
            (&self.domains, &self.reverse).transaction(|(domains, reverse)| {
                domains.remove(name)?;
                reverse.remove(reverse_key)?;
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            });

        result.map_err(unwrap_tx)?;
        self.db.flush()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<DomainRecord>, StorageError> {
        let mut records = Vec::with_capacity(self.domains.len());
        for item in self.domains.iter() {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }
}
