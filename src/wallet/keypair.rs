//! Keypair implementation
//!
//! A keypair is the identity that owns domains and signs ledger transfers.
//! Key files hold the 32 secret bytes as a JSON array of numbers.

use crate::crypto::{Address, Hash, PrivateKey, PublicKey, SchnorrSignature};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid private key")]
    InvalidKey,
    #[error("Key file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed key file: {0}")]
    Format(String),
}

/// A signing key pair and the address it controls
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Private key (for signing)
    private_key: PrivateKey,
    /// Public key
    pub public_key: PublicKey,
    /// Address (x-only public key bytes)
    pub address: Address,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::generate())
    }

    fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        let address = public_key.to_address();

        Self {
            private_key,
            public_key,
            address,
        }
    }

    /// Import from private key bytes
    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        let private_key = PrivateKey::from_bytes(bytes).map_err(|_| WalletError::InvalidKey)?;
        Ok(Self::from_private_key(private_key))
    }

    /// Export private key bytes
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.private_key.to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &Hash) -> SchnorrSignature {
        self.private_key.sign(message)
    }

    /// Write the key file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WalletError> {
        let body = serde_json::to_vec(&self.private_key_bytes().to_vec())
            .map_err(|e| WalletError::Format(e.to_string()))?;
        fs::write(path.as_ref(), body)?;
        info!(address = %self.address, path = %path.as_ref().display(), "Key file saved");
        Ok(())
    }

    /// Read a key file written by [`KeyPair::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let raw = fs::read(path.as_ref())?;
        let bytes: Vec<u8> =
            serde_json::from_slice(&raw).map_err(|e| WalletError::Format(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| WalletError::Format(format!("expected 32 bytes, found {}", v.len())))?;
        Self::from_private_key_bytes(&secret)
    }
}
