use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;

/// Errors crossing a component boundary.
///
/// Components run in-process in tests and as separate HTTP services in
/// deployment; either way, a call ends in exactly one of these.
#[derive(Debug, Error)]
pub enum ViewError {
    /// The chain head moved under us. For a miner this is the expected
    /// race outcome, not a failure.
    #[error("Stale linkage: {0}")]
    Linkage(String),

    /// The peer understood the request and said no. Terminal for the call.
    #[error("Rejected ({kind}): {message}")]
    Rejected { kind: String, message: String },

    /// The peer could not be reached. Surfaced as-is so the caller decides
    /// about retries; nothing in the core retries silently.
    #[error("Peer unavailable: {0}")]
    Unavailable(String),
}

/// Confirmed balance and last used nonce of an account at the chain head.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct AccountInfo {
    pub balance: u64,
    pub nonce: u64,
}

/// Chain head snapshot: height, hash and the difficulty the next block
/// must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HeadInfo {
    pub height: u64,
    pub hash: String,
    pub difficulty: u8,
}

/// Read access to confirmed account state.
#[async_trait]
pub trait AccountView: Send + Sync {
    async fn account_info(&self, address: &Address) -> Result<AccountInfo, ViewError>;
}

/// The ledger as seen by a miner: where the head is and where solved
/// blocks go.
#[async_trait]
pub trait ChainView: Send + Sync {
    async fn head(&self) -> Result<HeadInfo, ViewError>;

    async fn submit_block(&self, block: &Block) -> Result<(), ViewError>;
}

/// The pending pool as seen by miners and wallets.
#[async_trait]
pub trait PendingSource: Send + Sync {
    /// Up to `max` pending transactions in admission order. Non-destructive.
    async fn select(&self, max: usize) -> Result<Vec<Transaction>, ViewError>;

    /// Drops every pooled transaction settled by the given block.
    async fn evict_mined(&self, block: &Block) -> Result<usize, ViewError>;

    /// Pending transactions from one sender, in admission order.
    async fn pending_for(&self, sender: &Address) -> Result<Vec<Transaction>, ViewError>;
}
