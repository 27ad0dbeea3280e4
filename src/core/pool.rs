use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use thiserror::Error;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::block::Block;
use super::crypto::Address;
use super::transaction::{Transaction, TransactionError};
use super::view::{AccountView, PendingSource, ViewError};

/// Errors that can occur during pool admission
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Account state unavailable: {0}")]
    Unavailable(#[from] ViewError),
}

impl PoolError {
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::InvalidSignature => "invalid-signature",
            PoolError::InvalidNonce { .. } => "invalid-nonce",
            PoolError::InsufficientBalance { .. } => "insufficient-balance",
            PoolError::InvalidTransaction(_) => "invalid-transaction",
            PoolError::Unavailable(_) => "unavailable",
        }
    }
}

/// Result of a submit call. Re-submitting an already-pending transaction is
/// a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Admitted,
    AlreadyPending,
}

#[derive(Debug, Clone)]
struct PendingTx {
    tx: Transaction,
    admitted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: HashMap<String, PendingTx>,
    /// Admission order; selection is FIFO.
    order: VecDeque<String>,
}

impl PoolInner {
    fn pending_for<'a>(
        &'a self,
        sender: &'a Address,
    ) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| &e.tx)
            .filter(move |tx| &tx.sender == sender)
    }
}

/// Holds validated transactions awaiting inclusion in a block.
///
/// One mutex serializes admission, so racing submissions for the same
/// sender-nonce slot resolve deterministically: confirmed state is fetched
/// before the lock, the pooled per-sender sequence is re-checked inside it.
#[derive(Debug, Default)]
pub struct TransactionPool {
    inner: Mutex<PoolInner>,
}

impl TransactionPool {
    pub fn new() -> Self {
        TransactionPool::default()
    }

    /// Validates and admits a transaction.
    ///
    /// Checks, in order: signature, nonce (exactly the sender's next
    /// expected value, counting already-pooled transactions), and spendable
    /// balance (confirmed minus pending outgoing).
    pub async fn submit(
        &self,
        tx: Transaction,
        accounts: &dyn AccountView,
    ) -> Result<SubmitOutcome, PoolError> {
        let id = tx.id();

        // Cheap idempotency check before touching the network.
        if self.inner.lock().unwrap().entries.contains_key(&id) {
            return Ok(SubmitOutcome::AlreadyPending);
        }

        tx.validate_transfer().map_err(|e| match e {
            TransactionError::InvalidSignature | TransactionError::NotSigned => {
                PoolError::InvalidSignature
            }
            other => PoolError::InvalidTransaction(other.to_string()),
        })?;

        // Fetched outside the lock; the await must not hold it.
        let account = accounts.account_info(&tx.sender).await?;

        let mut inner = self.inner.lock().unwrap();

        if inner.entries.contains_key(&id) {
            return Ok(SubmitOutcome::AlreadyPending);
        }

        let pending_count = inner.pending_for(&tx.sender).count() as u64;
        let pending_out: u64 = inner.pending_for(&tx.sender).map(|t| t.amount).sum();

        let expected = account.nonce + pending_count + 1;
        if tx.nonce != expected {
            return Err(PoolError::InvalidNonce {
                expected,
                got: tx.nonce,
            });
        }

        let available = account.balance.saturating_sub(pending_out);
        if tx.amount > available {
            return Err(PoolError::InsufficientBalance {
                required: tx.amount,
                available,
            });
        }

        debug!("Admitted transaction {} from {}", id, tx.sender);
        inner.entries.insert(
            id.clone(),
            PendingTx {
                tx,
                admitted_at: Utc::now(),
            },
        );
        inner.order.push_back(id);

        Ok(SubmitOutcome::Admitted)
    }

    /// Up to `max` transactions in admission order. Entries stay pooled
    /// until confirmed inclusion.
    pub fn select_for_block(&self, max: usize) -> Vec<Transaction> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .take(max)
            .map(|e| e.tx.clone())
            .collect()
    }

    /// Removes every pooled transaction settled by the given block.
    pub fn evict_mined(&self, block: &Block) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut evicted = 0;

        for tx in &block.transactions {
            if inner.entries.remove(&tx.id()).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            let PoolInner { entries, order } = &mut *inner;
            order.retain(|id| entries.contains_key(id));
            info!("Evicted {} mined transactions", evicted);
        }

        evicted
    }

    /// Drops entries older than `max_age`, and with each one every
    /// later-nonce entry from the same sender. Never fatal, reported as a
    /// count.
    ///
    /// The suffix must go too: a gap in a sender's pooled sequence would let
    /// a fresh submission claim an occupied nonce slot and strand the
    /// entries past the gap, which no block could ever settle.
    pub fn evict_expired(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut inner = self.inner.lock().unwrap();

        let before = inner.entries.len();
        let PoolInner { entries, order } = &mut *inner;

        let mut floors: HashMap<Address, u64> = HashMap::new();
        for e in entries.values() {
            if e.admitted_at < cutoff {
                let floor = floors.entry(e.tx.sender.clone()).or_insert(e.tx.nonce);
                *floor = (*floor).min(e.tx.nonce);
            }
        }

        entries.retain(|_, e| match floors.get(&e.tx.sender) {
            Some(floor) => e.tx.nonce < *floor,
            None => true,
        });
        order.retain(|id| entries.contains_key(id));

        let evicted = before - inner.entries.len();
        if evicted > 0 {
            info!("Evicted {} expired transactions", evicted);
        }

        evicted
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.select_for_block(usize::MAX)
    }

    pub fn pending_from(&self, sender: &Address) -> Vec<Transaction> {
        let inner = self.inner.lock().unwrap();
        inner.pending_for(sender).cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().unwrap().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PendingSource for TransactionPool {
    async fn select(&self, max: usize) -> Result<Vec<Transaction>, ViewError> {
        Ok(self.select_for_block(max))
    }

    async fn evict_mined(&self, block: &Block) -> Result<usize, ViewError> {
        Ok(TransactionPool::evict_mined(self, block))
    }

    async fn pending_for(&self, sender: &Address) -> Result<Vec<Transaction>, ViewError> {
        Ok(self.pending_from(sender))
    }
}
