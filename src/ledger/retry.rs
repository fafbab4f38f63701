//! Retry policy for ledger calls
//!
//! Retries live here, around the ledger collaborator, and never inside the
//! registry. Only retryable `LedgerError`s are retried.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    LedgerClient, LedgerError, SignedTransfer, TransactionId, TransactionStatus,
    TransactionSummary,
};
use crate::crypto::Address;

/// Delay before attempt `n + 1`, given the 1-based attempt `n` that just failed
#[derive(Clone)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        multiplier: u32,
        max: Duration,
    },
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(*max)
            }
            Backoff::Custom(f) => f(attempt),
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backoff::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => f
                .debug_struct("Exponential")
                .field("initial", initial)
                .field("multiplier", multiplier)
                .field("max", max)
                .finish(),
            Backoff::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Attempts, backoff and per-attempt timeout
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Three tries two seconds apart, as the account scripts did by hand.
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(2)),
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            call_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match self.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(LedgerError::Timeout {
                        after_ms: limit.as_millis() as u64,
                    }),
                },
                None => op().await,
            };

            match outcome {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Ledger call failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Ledger client with a retry policy applied to every call
#[derive(Debug)]
pub struct RetryingLedger<L> {
    inner: L,
    policy: RetryPolicy,
}

impl<L: LedgerClient> RetryingLedger<L> {
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<L: LedgerClient> LedgerClient for RetryingLedger<L> {
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError> {
        self.policy
            .run("get_balance", || self.inner.get_balance(address))
            .await
    }

    async fn next_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        self.policy
            .run("next_nonce", || self.inner.next_nonce(address))
            .await
    }

    /// The transfer is signed once by the caller, so every attempt carries the
    /// same id. Before resubmitting, ask whether an earlier attempt landed.
    async fn submit_signed(&self, transfer: &SignedTransfer) -> Result<TransactionId, LedgerError> {
        let id = transfer.id();
        let resubmitting = AtomicBool::new(false);

        self.policy
            .run("submit_transfer", || {
                let resubmitting = &resubmitting;
                async move {
                    if resubmitting.swap(true, Ordering::SeqCst) {
                        if let Ok(status) = self.inner.confirm(&id).await {
                            debug!(tx = %id, ?status, "Earlier submission landed");
                            return Ok(id);
                        }
                    }
                    self.inner.submit_signed(transfer).await
                }
            })
            .await
    }

    async fn confirm(&self, id: &TransactionId) -> Result<TransactionStatus, LedgerError> {
        self.policy.run("confirm", || self.inner.confirm(id)).await
    }

    async fn transaction_history(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<TransactionSummary>, LedgerError> {
        self.policy
            .run("transaction_history", || {
                self.inner.transaction_history(address, limit)
            })
            .await
    }
}
