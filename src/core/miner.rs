use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;
use super::view::{ChainView, PendingSource, ViewError};

/// Nonces tried between cancellation checks. The search never blocks
/// longer than one batch without looking at the flag.
const CANCEL_CHECK_BATCH: u64 = 4_096;

/// Consecutive linkage losses tolerated in one `mine_once` call before the
/// race is surfaced to the caller.
const LINKAGE_RETRY_BUDGET: u32 = 5;

/// Errors that can occur while mining
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("Lost the linkage race {0} times in a row")]
    LostRace(u32),

    #[error("Chain error: {0}")]
    Chain(#[from] ViewError),
}

/// The miner's externally observable state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MinerStatus {
    Idle,
    Assembling,
    Searching,
    Solved,
    Cancelled,
}

/// Result of one mining cycle.
#[derive(Debug, Clone)]
pub enum MineOutcome {
    /// The candidate was solved and accepted by the ledger.
    Mined(Block),
    /// The search was cancelled before completion; no side effects.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Address credited with the coinbase reward
    pub reward_address: Address,

    /// Coinbase amount; must match the ledger's reward parameter
    pub mining_reward: u64,

    /// Maximum transactions pulled into one candidate
    pub block_tx_limit: usize,
}

/// Proof-of-work miner: assembles candidates from the pending pool, runs the
/// nonce search off the async runtime, and submits solved blocks.
///
/// Losing the append race (`InvalidLinkage` from the ledger) is the expected
/// concurrency outcome. The miner discards the candidate and reassembles on
/// the new head.
#[derive(Debug, Clone)]
pub struct Miner {
    config: MinerConfig,
    cancel: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<MinerStatus>>,
}

impl Miner {
    pub fn new(config: MinerConfig) -> Self {
        Miner {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(MinerStatus::Idle)),
        }
    }

    pub fn status(&self) -> MinerStatus {
        *self.status.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Requests cancellation of the current search. The flag is polled
    /// between hash batches, never mid-hash.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn set_status(&self, status: MinerStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Runs one full cycle: assemble, search, submit, evict.
    pub async fn mine_once(
        &self,
        chain: &dyn ChainView,
        pool: &dyn PendingSource,
    ) -> Result<MineOutcome, MinerError> {
        self.cancel.store(false, Ordering::SeqCst);
        let mut losses = 0;

        loop {
            self.set_status(MinerStatus::Assembling);
            let head = chain.head().await?;
            let pending = pool.select(self.config.block_tx_limit).await?;
            let candidate = self.assemble(&head.hash, head.height + 1, pending);

            self.set_status(MinerStatus::Searching);
            let difficulty = head.difficulty;
            let cancel = self.cancel.clone();
            let solved = tokio::task::spawn_blocking(move || search(candidate, difficulty, cancel))
                .await
                .map_err(|e| ViewError::Unavailable(format!("search task failed: {}", e)))?;

            let block = match solved {
                Some(block) => block,
                None => {
                    self.set_status(MinerStatus::Cancelled);
                    info!("Search cancelled, discarding partial work");
                    self.set_status(MinerStatus::Idle);
                    return Ok(MineOutcome::Cancelled);
                }
            };

            self.set_status(MinerStatus::Solved);
            match chain.submit_block(&block).await {
                Ok(()) => {
                    info!("Mined block {} at {}", block.height, block.hash);
                    // The block is already appended; a pool hiccup here only
                    // delays eviction until the next cycle.
                    if let Err(e) = pool.evict_mined(&block).await {
                        warn!("Could not evict mined transactions: {}", e);
                    }
                    self.set_status(MinerStatus::Idle);
                    return Ok(MineOutcome::Mined(block));
                }
                Err(ViewError::Linkage(reason)) => {
                    // Someone appended first. Expected; reassemble on the
                    // new head, transactions stay pooled.
                    losses += 1;
                    info!("Lost the append race ({}), reassembling", reason);
                    if losses >= LINKAGE_RETRY_BUDGET {
                        self.set_status(MinerStatus::Idle);
                        return Err(MinerError::LostRace(losses));
                    }
                }
                Err(e) => {
                    self.set_status(MinerStatus::Idle);
                    return Err(e.into());
                }
            }
        }
    }

    /// Starts the continuous mining loop on the current runtime. Returns
    /// false if already running.
    pub fn start(&self, chain: Arc<dyn ChainView>, pool: Arc<dyn PendingSource>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let miner = self.clone();
        tokio::spawn(async move {
            info!("Mining loop started for {}", miner.config.reward_address);
            while miner.running.load(Ordering::SeqCst) {
                match miner.mine_once(chain.as_ref(), pool.as_ref()).await {
                    Ok(MineOutcome::Mined(_)) => {}
                    Ok(MineOutcome::Cancelled) => {}
                    Err(e) => {
                        warn!("Mining cycle failed: {}", e);
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
            info!("Mining loop stopped");
        });

        true
    }

    /// Stops the continuous loop and cancels any in-flight search. Returns
    /// false if not running.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            self.cancel();
        }
        was_running
    }

    fn assemble(&self, previous_hash: &str, height: u64, pending: Vec<Transaction>) -> Block {
        let timestamp = Utc::now();
        let mut transactions = Vec::with_capacity(pending.len() + 1);
        transactions.push(Transaction::coinbase(
            self.config.reward_address.clone(),
            self.config.mining_reward,
            timestamp,
        ));
        transactions.extend(pending);

        Block::new(
            height,
            previous_hash.to_string(),
            transactions,
            timestamp,
            0,
        )
    }
}

/// The proof-of-work search: iterate nonces until the hash meets the target
/// or cancellation is observed. CPU-bound; run via `spawn_blocking`.
fn search(mut block: Block, difficulty: u8, cancel: Arc<AtomicBool>) -> Option<Block> {
    let mut nonce: u64 = 0;

    loop {
        if nonce % CANCEL_CHECK_BATCH == 0 && cancel.load(Ordering::Relaxed) {
            return None;
        }

        block.nonce = nonce;
        block.hash = block.calculate_hash();
        if block.meets_difficulty(difficulty) {
            return Some(block);
        }

        nonce = nonce.wrapping_add(1);
    }
}
