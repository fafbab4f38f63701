//! Ledger collaborator interface
//!
//! The registry only composes name resolution with these calls; balances,
//! submission and confirmation belong to whatever chain client implements
//! the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::{hash_bytes, Address, Hash, PublicKey, SchnorrSignature};
use crate::wallet::KeyPair;

/// Ledger errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Ledger call timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("Insufficient funds in {address}: have {have}, need {need}")]
    InsufficientFunds { address: Address, have: u64, need: u64 },
    #[error("Invalid signature for {address}")]
    InvalidSignature { address: Address },
    #[error("Unknown transaction {0}")]
    UnknownTransaction(TransactionId),
    #[error("Nonce mismatch for {address}: expected {expected}, got {got}")]
    NonceMismatch { address: Address, expected: u64, got: u64 },
}

impl LedgerError {
    /// Transport failures may succeed on a later attempt; nothing else will
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Network(_) | LedgerError::Timeout { .. })
    }
}

/// Transaction identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Hash);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0.as_bytes()).into_string())
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self)
    }
}

/// Final state of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Confirmed,
    Failed,
}

/// One entry of an address's transaction history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub id: TransactionId,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub slot: u64,
    pub status: TransactionStatus,
}

/// Outcome of a transfer addressed by domain names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub from_name: String,
    pub to_name: String,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
}

/// A value transfer signed by the sender
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub nonce: u64,
    pub public_key: PublicKey,
    pub signature: SchnorrSignature,
}

impl SignedTransfer {
    /// Digest the signer commits to
    pub fn message(from: &Address, to: &Address, amount: u64, nonce: u64) -> Hash {
        let mut data = Vec::with_capacity(80);
        data.extend_from_slice(&from.0);
        data.extend_from_slice(&to.0);
        data.extend_from_slice(&amount.to_le_bytes());
        data.extend_from_slice(&nonce.to_le_bytes());
        hash_bytes(&data)
    }

    pub fn sign(from: &Address, to: &Address, amount: u64, nonce: u64, signer: &KeyPair) -> Self {
        let message = Self::message(from, to, amount, nonce);
        Self {
            from: *from,
            to: *to,
            amount,
            nonce,
            public_key: signer.public_key.clone(),
            signature: signer.sign(&message),
        }
    }

    /// Signature checks out and the key controls `from`
    pub fn verify(&self) -> bool {
        let message = Self::message(&self.from, &self.to, self.amount, self.nonce);
        self.public_key.to_address() == self.from && self.public_key.verify(&message, &self.signature)
    }

    pub fn id(&self) -> TransactionId {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&Self::message(&self.from, &self.to, self.amount, self.nonce).0);
        data.extend_from_slice(&self.signature.0);
        TransactionId(hash_bytes(&data))
    }
}

/// External ledger used for balances and transfers
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError>;

    /// Nonce the next transfer from `address` must carry
    async fn next_nonce(&self, address: &Address) -> Result<u64, LedgerError>;

    /// Submit a transfer signed by the caller.
    ///
    /// Idempotent: submitting a transfer that already landed returns its id
    /// and moves nothing.
    async fn submit_signed(&self, transfer: &SignedTransfer) -> Result<TransactionId, LedgerError>;

    /// Sign once at the current nonce, then submit
    async fn submit_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
        signer: &KeyPair,
    ) -> Result<TransactionId, LedgerError> {
        let nonce = self.next_nonce(from).await?;
        let transfer = SignedTransfer::sign(from, to, amount, nonce, signer);
        self.submit_signed(&transfer).await
    }

    async fn confirm(&self, id: &TransactionId) -> Result<TransactionStatus, LedgerError>;

    /// Most recent transactions touching `address`, newest first
    async fn transaction_history(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<TransactionSummary>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_transfer_verifies() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let transfer = SignedTransfer::sign(&alice.address, &bob.address, 50, 0, &alice);
        assert!(transfer.verify());
    }

    #[test]
    fn test_transfer_signed_by_other_key_fails() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let transfer = SignedTransfer::sign(&alice.address, &mallory.address, 50, 0, &mallory);
        assert!(!transfer.verify());
    }

    #[test]
    fn test_tampered_amount_fails() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut transfer = SignedTransfer::sign(&alice.address, &bob.address, 50, 0, &alice);
        transfer.amount = 5_000;
        assert!(!transfer.verify());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LedgerError::Network("reset".into()).is_retryable());
        assert!(LedgerError::Timeout { after_ms: 10 }.is_retryable());
        assert!(!LedgerError::InvalidSignature { address: Address::zero() }.is_retryable());
        assert!(!LedgerError::NonceMismatch {
            address: Address::zero(),
            expected: 1,
            got: 0
        }
        .is_retryable());
    }
}
