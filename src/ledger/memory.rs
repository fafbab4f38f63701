//! In-process ledger
//!
//! Stand-in for a real chain client in tests and demos. Balances and history
//! live in memory; transport failures and latency can be injected.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{
    LedgerClient, LedgerError, SignedTransfer, TransactionId, TransactionStatus,
    TransactionSummary,
};
use crate::crypto::{hash_bytes, Address};

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Address, u64>,
    nonces: HashMap<Address, u64>,
    history: Vec<TransactionSummary>,
    slot: u64,
    failures_remaining: u32,
    submissions: u32,
}

impl LedgerState {
    fn record(&mut self, id: TransactionId, from: Address, to: Address, amount: u64) {
        self.slot += 1;
        self.history.push(TransactionSummary {
            id,
            from,
            to,
            amount,
            slot: self.slot,
            status: TransactionStatus::Confirmed,
        });
    }
}

/// Ledger kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    latency: Option<Duration>,
    ack_delay: Option<Duration>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Apply submissions at once but acknowledge them only after `delay`
    pub fn with_ack_delay(delay: Duration) -> Self {
        Self {
            ack_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Credit `amount` to `address` out of thin air
    pub fn airdrop(&self, address: &Address, amount: u64) -> TransactionId {
        let mut state = self.state.lock();
        let balance = state.balances.entry(*address).or_insert(0);
        *balance = balance.saturating_add(amount);

        let mut seed = Vec::with_capacity(48);
        seed.extend_from_slice(b"airdrop");
        seed.extend_from_slice(&address.0);
        seed.extend_from_slice(&state.slot.to_le_bytes());
        let id = TransactionId(hash_bytes(&seed));
        state.record(id, Address::zero(), *address, amount);
        id
    }

    /// Make the next `count` calls fail with a network error
    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures_remaining = count;
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Submissions received, including replays
    pub fn submission_count(&self) -> u32 {
        self.state.lock().submissions
    }

    async fn simulate_transport(&self) -> Result<(), LedgerError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(LedgerError::Network("connection reset by peer".to_string()));
        }
        Ok(())
    }

    fn apply(&self, transfer: &SignedTransfer) -> Result<TransactionId, LedgerError> {
        let mut state = self.state.lock();
        state.submissions += 1;

        let id = transfer.id();
        if state.history.iter().any(|tx| tx.id == id) {
            debug!(tx = %id, "Replayed transfer ignored");
            return Ok(id);
        }

        let from = transfer.from;
        if !transfer.verify() {
            return Err(LedgerError::InvalidSignature { address: from });
        }

        let expected = state.nonces.get(&from).copied().unwrap_or(0);
        if transfer.nonce != expected {
            return Err(LedgerError::NonceMismatch {
                address: from,
                expected,
                got: transfer.nonce,
            });
        }

        let have = state.balances.get(&from).copied().unwrap_or(0);
        if have < transfer.amount {
            return Err(LedgerError::InsufficientFunds {
                address: from,
                have,
                need: transfer.amount,
            });
        }

        state.balances.insert(from, have - transfer.amount);
        let credited = state.balances.entry(transfer.to).or_insert(0);
        *credited = credited.saturating_add(transfer.amount);
        state.nonces.insert(from, expected + 1);

        state.record(id, from, transfer.to, transfer.amount);
        debug!(%from, to = %transfer.to, amount = transfer.amount, tx = %id, "Transfer applied");
        Ok(id)
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError> {
        self.simulate_transport().await?;
        Ok(self.state.lock().balances.get(address).copied().unwrap_or(0))
    }

    async fn next_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        self.simulate_transport().await?;
        Ok(self.state.lock().nonces.get(address).copied().unwrap_or(0))
    }

    async fn submit_signed(&self, transfer: &SignedTransfer) -> Result<TransactionId, LedgerError> {
        self.simulate_transport().await?;
        let result = self.apply(transfer);
        if let Some(delay) = self.ack_delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn confirm(&self, id: &TransactionId) -> Result<TransactionStatus, LedgerError> {
        self.simulate_transport().await?;
        self.state
            .lock()
            .history
            .iter()
            .find(|tx| tx.id == *id)
            .map(|tx| tx.status)
            .ok_or(LedgerError::UnknownTransaction(*id))
    }

    async fn transaction_history(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<TransactionSummary>, LedgerError> {
        self.simulate_transport().await?;
        Ok(self
            .state
            .lock()
            .history
            .iter()
            .rev()
            .filter(|tx| tx.from == *address || tx.to == *address)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::KeyPair;

    #[tokio::test]
    async fn test_airdrop_and_transfer() {
        let ledger = MemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        ledger.airdrop(&alice.address, 1_000);
        let id = ledger
            .submit_transfer(&alice.address, &bob.address, 400, &alice)
            .await
            .unwrap();

        assert_eq!(ledger.confirm(&id).await.unwrap(), TransactionStatus::Confirmed);
        assert_eq!(ledger.get_balance(&alice.address).await.unwrap(), 600);
        assert_eq!(ledger.get_balance(&bob.address).await.unwrap(), 400);
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let ledger = MemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let err = ledger
            .submit_transfer(&alice.address, &bob.address, 1, &alice)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { have: 0, need: 1, .. }));
    }

    #[tokio::test]
    async fn test_wrong_signer_rejected() {
        let ledger = MemoryLedger::new();
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        ledger.airdrop(&alice.address, 1_000);

        let err = ledger
            .submit_transfer(&alice.address, &mallory.address, 10, &mallory)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidSignature { address: alice.address });
        assert_eq!(ledger.get_balance(&alice.address).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_repeated_transfers_get_distinct_ids() {
        let ledger = MemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.airdrop(&alice.address, 100);

        let first = ledger.submit_transfer(&alice.address, &bob.address, 10, &alice).await.unwrap();
        let second = ledger.submit_transfer(&alice.address, &bob.address, 10, &alice).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_history_newest_first_and_limited() {
        let ledger = MemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.airdrop(&alice.address, 100);
        ledger.submit_transfer(&alice.address, &bob.address, 10, &alice).await.unwrap();
        ledger.submit_transfer(&alice.address, &bob.address, 20, &alice).await.unwrap();

        let history = ledger.transaction_history(&alice.address, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, 20);
        assert_eq!(history[1].amount, 10);
        assert_eq!(ledger.transaction_history(&bob.address, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replayed_transfer_applies_once() {
        let ledger = MemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.airdrop(&alice.address, 100);

        let transfer = SignedTransfer::sign(&alice.address, &bob.address, 30, 0, &alice);
        let first = ledger.submit_signed(&transfer).await.unwrap();
        let again = ledger.submit_signed(&transfer).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(ledger.submission_count(), 2);
        assert_eq!(ledger.get_balance(&bob.address).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_stale_nonce_rejected() {
        let ledger = MemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.airdrop(&alice.address, 100);
        ledger.submit_transfer(&alice.address, &bob.address, 10, &alice).await.unwrap();

        let stale = SignedTransfer::sign(&alice.address, &bob.address, 20, 0, &alice);
        let err = ledger.submit_signed(&stale).await.unwrap_err();
        assert!(matches!(err, LedgerError::NonceMismatch { expected: 1, got: 0, .. }));
        assert_eq!(ledger.get_balance(&bob.address).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let ledger = MemoryLedger::new();
        ledger.fail_next(1);
        let err = ledger.get_balance(&Address::zero()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(ledger.get_balance(&Address::zero()).await.unwrap(), 0);
    }
}
