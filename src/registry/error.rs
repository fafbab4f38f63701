//! Registry error taxonomy

use thiserror::Error;

use crate::crypto::Address;
use crate::derivation::DerivationError;
use crate::ledger::LedgerError;
use crate::storage::StorageError;

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    AlreadyExists,
    NotFound,
    Unauthorized,
    NetworkError,
    StorageError,
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid domain name {name:?}: {reason}")]
    InvalidInput { name: String, reason: String },

    #[error("Domain already registered: {name}")]
    AlreadyExists { name: String },

    #[error("Domain not found: {name}")]
    NotFound { name: String },

    #[error("No domain registered for address {address}")]
    AddressNotFound { address: Address },

    #[error("Unauthorized: {requester} does not own {name}")]
    Unauthorized { name: String, requester: Address },

    #[error("Domain {name} still has subdomains")]
    HasSubdomains { name: String },

    #[error("Ledger call for {name} failed: {source}")]
    Network {
        name: String,
        #[source]
        source: LedgerError,
    },

    #[error("Storage failure on {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidInput { .. } | RegistryError::HasSubdomains { .. } => {
                ErrorKind::InvalidInput
            }
            RegistryError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            RegistryError::NotFound { .. } | RegistryError::AddressNotFound { .. } => {
                ErrorKind::NotFound
            }
            RegistryError::Unauthorized { .. } => ErrorKind::Unauthorized,
            RegistryError::Network { .. } => ErrorKind::NetworkError,
            RegistryError::Storage { .. } => ErrorKind::StorageError,
        }
    }

    /// Only transport failures from the ledger are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Network { source, .. } if source.is_retryable())
    }

    pub(crate) fn derivation(name: &str, err: DerivationError) -> Self {
        RegistryError::InvalidInput {
            name: name.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn storage(key: impl Into<String>) -> impl FnOnce(StorageError) -> Self {
        let key = key.into();
        move |source| RegistryError::Storage { key, source }
    }

    pub(crate) fn network(name: impl Into<String>) -> impl FnOnce(LedgerError) -> Self {
        let name = name.into();
        move |source| RegistryError::Network { name, source }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
