use async_trait::async_trait;
use log::{info, warn};
use thiserror::Error;

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use super::block::Block;
use super::crypto::Address;
use super::storage::{LedgerStore, StorageError};
use super::view::{AccountInfo, AccountView, ChainView, HeadInfo, ViewError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid linkage: expected height {expected_height} on parent {expected_previous}")]
    InvalidLinkage {
        expected_height: u64,
        expected_previous: String,
    },

    #[error("Invalid proof of work: {0}")]
    InvalidProofOfWork(String),

    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction { id: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Stable discriminator used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidLinkage { .. } => "invalid-linkage",
            LedgerError::InvalidProofOfWork(_) => "invalid-proof-of-work",
            LedgerError::InvalidTransaction { .. } => "invalid-transaction",
            LedgerError::NotFound(_) => "not-found",
            LedgerError::Storage(_) => "storage",
        }
    }
}

/// Chain parameters fixed at genesis.
#[derive(Debug, Clone)]
pub struct LedgerParams {
    /// Difficulty before the first retarget, in leading zero hex chars
    pub initial_difficulty: u8,

    /// Recompute the difficulty every this many blocks
    pub retarget_interval: u64,

    /// Desired seconds between blocks
    pub target_block_secs: i64,

    /// Coinbase reward per mined block
    pub mining_reward: u64,

    /// Initial balances, settled as coinbase grants in the genesis block
    pub genesis_grants: Vec<(Address, u64)>,
}

impl Default for LedgerParams {
    fn default() -> Self {
        LedgerParams {
            initial_difficulty: 2,
            retarget_interval: 10,
            target_block_secs: 10,
            mining_reward: 50,
            genesis_grants: Vec::new(),
        }
    }
}

/// Everything a reader may observe, guarded as one unit so an `append` is a
/// single visible step: either the old chain with the old balances, or the
/// new chain with the new balances.
#[derive(Debug)]
struct ChainState {
    blocks: Vec<Block>,
    accounts: HashMap<Address, AccountInfo>,
}

/// The append-only ledger.
///
/// Balances are derived state: an incremental per-account cache is extended
/// on every confirmed append, with full replay from genesis as the ground
/// truth (and the recovery path after a restart).
#[derive(Debug)]
pub struct Ledger {
    state: RwLock<ChainState>,
    params: LedgerParams,
    storage: Option<LedgerStore>,
}

impl Ledger {
    /// Creates an in-memory ledger at genesis.
    pub fn new(params: LedgerParams) -> Self {
        let genesis = Block::genesis(&params.genesis_grants);
        let mut accounts = HashMap::new();
        apply_block(&mut accounts, &genesis);

        Ledger {
            state: RwLock::new(ChainState {
                blocks: vec![genesis],
                accounts,
            }),
            params,
            storage: None,
        }
    }

    /// Opens a durable ledger, replaying any existing block log to
    /// reconstruct balances exactly.
    pub fn with_storage<P: AsRef<Path>>(
        params: LedgerParams,
        path: P,
    ) -> Result<Self, LedgerError> {
        let storage = LedgerStore::open(path)?;

        let blocks = if storage.is_empty() {
            let genesis = Block::genesis(&params.genesis_grants);
            storage.append_block(&genesis)?;
            storage.flush()?;
            info!("Initialized block log at genesis {}", genesis.hash);
            vec![genesis]
        } else {
            let blocks = storage.load_blocks()?;
            info!("Replaying {} blocks from the log", blocks.len());
            blocks
        };

        let mut accounts = HashMap::new();
        for block in &blocks {
            apply_block(&mut accounts, block);
        }

        Ok(Ledger {
            state: RwLock::new(ChainState { blocks, accounts }),
            params,
            storage: Some(storage),
        })
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    /// Appends a block after validating linkage, proof of work, and every
    /// contained transaction against the state as of the block's
    /// predecessor. Atomic: readers see the old state or the new one.
    pub fn append(&self, block: Block) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();

        let head = state
            .blocks
            .last()
            .expect("chain always holds at least genesis");

        if block.height != head.height + 1 || block.previous_hash != head.hash {
            return Err(LedgerError::InvalidLinkage {
                expected_height: head.height + 1,
                expected_previous: head.hash.clone(),
            });
        }

        if block.hash != block.calculate_hash() {
            return Err(LedgerError::InvalidProofOfWork(
                "stored hash does not match block contents".to_string(),
            ));
        }

        let difficulty = difficulty_for(&state.blocks, &self.params);
        if !block.meets_difficulty(difficulty) {
            return Err(LedgerError::InvalidProofOfWork(format!(
                "hash {} does not meet difficulty {}",
                block.hash, difficulty
            )));
        }

        // Validate on a scratch copy so a rejected block leaves no trace.
        let mut scratch = state.accounts.clone();
        self.validate_transactions(&block, &mut scratch)?;

        // Persist before mutating in-memory state; a storage failure must
        // not leave the two disagreeing.
        if let Some(storage) = &self.storage {
            storage.append_block(&block)?;
            storage.flush()?;
        }

        info!(
            "Appended block {} ({} transactions) at {}",
            block.height,
            block.transactions.len(),
            block.hash
        );

        state.accounts = scratch;
        state.blocks.push(block);

        Ok(())
    }

    fn validate_transactions(
        &self,
        block: &Block,
        accounts: &mut HashMap<Address, AccountInfo>,
    ) -> Result<(), LedgerError> {
        let mut coinbase_seen = false;

        for tx in &block.transactions {
            let id = tx.id();

            if tx.is_coinbase() {
                if coinbase_seen {
                    return Err(LedgerError::InvalidTransaction {
                        id,
                        reason: "more than one coinbase in block".to_string(),
                    });
                }
                if tx.amount != self.params.mining_reward {
                    return Err(LedgerError::InvalidTransaction {
                        id,
                        reason: format!(
                            "coinbase amount {} does not match reward {}",
                            tx.amount, self.params.mining_reward
                        ),
                    });
                }
                coinbase_seen = true;
                accounts.entry(tx.recipient.clone()).or_default().balance += tx.amount;
                continue;
            }

            tx.validate_transfer()
                .map_err(|e| LedgerError::InvalidTransaction {
                    id: id.clone(),
                    reason: e.to_string(),
                })?;

            let sender = accounts.entry(tx.sender.clone()).or_default();

            if tx.nonce != sender.nonce + 1 {
                return Err(LedgerError::InvalidTransaction {
                    id,
                    reason: format!(
                        "invalid nonce: expected {}, got {}",
                        sender.nonce + 1,
                        tx.nonce
                    ),
                });
            }

            if sender.balance < tx.amount {
                return Err(LedgerError::InvalidTransaction {
                    id,
                    reason: format!(
                        "insufficient balance: required {}, available {}",
                        tx.amount, sender.balance
                    ),
                });
            }

            sender.balance -= tx.amount;
            sender.nonce = tx.nonce;
            accounts.entry(tx.recipient.clone()).or_default().balance += tx.amount;
        }

        Ok(())
    }

    /// Confirmed balance at the head, or at a historical height by replaying
    /// the chain prefix.
    pub fn balance_of(&self, address: &Address, at_height: Option<u64>) -> Result<u64, LedgerError> {
        let state = self.state.read().unwrap();

        match at_height {
            None => Ok(state
                .accounts
                .get(address)
                .map(|a| a.balance)
                .unwrap_or(0)),
            Some(height) => {
                let head = state.blocks.len() as u64 - 1;
                if height > head {
                    return Err(LedgerError::NotFound(format!(
                        "height {} beyond head {}",
                        height, head
                    )));
                }

                let mut accounts = HashMap::new();
                for block in &state.blocks[..=height as usize] {
                    apply_block(&mut accounts, block);
                }

                Ok(accounts.get(address).map(|a| a.balance).unwrap_or(0))
            }
        }
    }

    /// Balance and last used nonce at the head. Fresh accounts are zeroed,
    /// not an error.
    pub fn account(&self, address: &Address) -> AccountInfo {
        let state = self.state.read().unwrap();
        state.accounts.get(address).copied().unwrap_or_default()
    }

    /// The difficulty the next block must satisfy.
    pub fn current_difficulty(&self) -> u8 {
        let state = self.state.read().unwrap();
        difficulty_for(&state.blocks, &self.params)
    }

    /// Consistent head snapshot for miners: height, hash and difficulty
    /// taken under one read lock.
    pub fn head_info(&self) -> HeadInfo {
        let state = self.state.read().unwrap();
        let head = state
            .blocks
            .last()
            .expect("chain always holds at least genesis");

        HeadInfo {
            height: head.height,
            hash: head.hash.clone(),
            difficulty: difficulty_for(&state.blocks, &self.params),
        }
    }

    pub fn height(&self) -> u64 {
        let state = self.state.read().unwrap();
        state.blocks.len() as u64 - 1
    }

    pub fn block_at(&self, height: u64) -> Result<Block, LedgerError> {
        let state = self.state.read().unwrap();
        state
            .blocks
            .get(height as usize)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("no block at height {}", height)))
    }

    pub fn chain(&self) -> Vec<Block> {
        self.state.read().unwrap().blocks.clone()
    }

    /// Full-chain audit: hashes, linkage and proof of work for every block
    /// past genesis.
    pub fn is_valid(&self) -> bool {
        let state = self.state.read().unwrap();

        for i in 1..state.blocks.len() {
            let current = &state.blocks[i];
            let previous = &state.blocks[i - 1];

            if current.hash != current.calculate_hash() {
                return false;
            }

            if current.previous_hash != previous.hash || current.height != previous.height + 1 {
                return false;
            }

            let difficulty = difficulty_for(&state.blocks[..i], &self.params);
            if !current.meets_difficulty(difficulty) {
                return false;
            }
        }

        true
    }

    /// Ground-truth balances computed by replaying every block from genesis.
    /// The incremental cache must always agree with this.
    pub fn replay_balances(&self) -> HashMap<Address, AccountInfo> {
        let state = self.state.read().unwrap();

        let mut accounts = HashMap::new();
        for block in &state.blocks {
            apply_block(&mut accounts, block);
        }

        accounts
    }
}

/// Applies a confirmed block to an account map.
///
/// Only called on blocks that already passed validation (or genesis), so
/// debits cannot underflow; `saturating_sub` guards the invariant anyway.
fn apply_block(accounts: &mut HashMap<Address, AccountInfo>, block: &Block) {
    for tx in &block.transactions {
        if tx.is_coinbase() {
            accounts.entry(tx.recipient.clone()).or_default().balance += tx.amount;
            continue;
        }

        let sender = accounts.entry(tx.sender.clone()).or_default();
        if sender.balance < tx.amount {
            warn!(
                "replay underflow for {}: balance {}, debit {}",
                tx.sender, sender.balance, tx.amount
            );
        }
        sender.balance = sender.balance.saturating_sub(tx.amount);
        sender.nonce = tx.nonce;
        accounts.entry(tx.recipient.clone()).or_default().balance += tx.amount;
    }
}

/// Deterministic retargeting: every `retarget_interval` blocks, compare the
/// observed timestamp span of the last window against the desired one and
/// step the difficulty by one, clamped to at least 1.
fn difficulty_for(blocks: &[Block], params: &LedgerParams) -> u8 {
    let mut difficulty = params.initial_difficulty.max(1);
    let interval = params.retarget_interval.max(1) as usize;
    let head = blocks.len().saturating_sub(1);

    let mut boundary = interval;
    while boundary <= head {
        let span = (blocks[boundary].timestamp - blocks[boundary - interval].timestamp)
            .num_seconds();
        let expected = params.target_block_secs * interval as i64;

        if span < expected / 2 {
            difficulty = difficulty.saturating_add(1);
        } else if span > expected * 2 && difficulty > 1 {
            difficulty -= 1;
        }

        boundary += interval;
    }

    difficulty
}

#[async_trait]
impl AccountView for Ledger {
    async fn account_info(&self, address: &Address) -> Result<AccountInfo, ViewError> {
        Ok(self.account(address))
    }
}

#[async_trait]
impl ChainView for Ledger {
    async fn head(&self) -> Result<HeadInfo, ViewError> {
        Ok(self.head_info())
    }

    async fn submit_block(&self, block: &Block) -> Result<(), ViewError> {
        match self.append(block.clone()) {
            Ok(()) => Ok(()),
            Err(e @ LedgerError::InvalidLinkage { .. }) => Err(ViewError::Linkage(e.to_string())),
            Err(e) => Err(ViewError::Rejected {
                kind: e.kind().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crypto::KeyPair;
    use crate::core::transaction::Transaction;
    use chrono::Utc;

    fn funded_ledger(keys: &KeyPair, amount: u64) -> Ledger {
        Ledger::new(LedgerParams {
            initial_difficulty: 1,
            genesis_grants: vec![(keys.address().clone(), amount)],
            ..LedgerParams::default()
        })
    }

    /// Searches nonces until the candidate satisfies the ledger's current
    /// difficulty. Test helper only; the real search lives in the miner.
    fn seal(ledger: &Ledger, transactions: Vec<Transaction>) -> Block {
        let head = ledger.head_info();
        let timestamp = Utc::now();
        let mut nonce = 0;

        loop {
            let block = Block::new(
                head.height + 1,
                head.hash.clone(),
                transactions.clone(),
                timestamp,
                nonce,
            );
            if block.meets_difficulty(head.difficulty) {
                return block;
            }
            nonce += 1;
        }
    }

    fn signed_transfer(from: &KeyPair, to: &Address, amount: u64, nonce: u64) -> Transaction {
        let mut tx = Transaction::new(from.address().clone(), to.clone(), amount, nonce);
        tx.sign(from).unwrap();
        tx
    }

    #[test]
    fn test_genesis_grants_fund_accounts() {
        let keys = KeyPair::generate();
        let ledger = funded_ledger(&keys, 100);

        assert_eq!(ledger.height(), 0);
        assert_eq!(ledger.balance_of(keys.address(), None).unwrap(), 100);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_append_settles_transfer() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let ledger = funded_ledger(&alice, 100);

        let tx = signed_transfer(&alice, bob.address(), 30, 1);
        let block = seal(&ledger, vec![tx]);
        ledger.append(block).unwrap();

        assert_eq!(ledger.balance_of(alice.address(), None).unwrap(), 70);
        assert_eq!(ledger.balance_of(bob.address(), None).unwrap(), 30);
        assert_eq!(ledger.account(alice.address()).nonce, 1);
    }

    #[test]
    fn test_append_rejects_bad_linkage() {
        let keys = KeyPair::generate();
        let ledger = funded_ledger(&keys, 100);

        let stranger = Block::new(1, "not the head".to_string(), Vec::new(), Utc::now(), 0);
        assert!(matches!(
            ledger.append(stranger),
            Err(LedgerError::InvalidLinkage { .. })
        ));

        // Re-appending the identical head block is a linkage error too,
        // never a duplicate.
        let head = ledger.block_at(0).unwrap();
        assert!(matches!(
            ledger.append(head),
            Err(LedgerError::InvalidLinkage { .. })
        ));
    }

    #[test]
    fn test_append_rejects_weak_proof_of_work() {
        let keys = KeyPair::generate();
        // Difficulty nobody can hit by accident.
        let ledger = Ledger::new(LedgerParams {
            initial_difficulty: 64,
            genesis_grants: vec![(keys.address().clone(), 100)],
            ..LedgerParams::default()
        });

        let head = ledger.head_info();
        let block = Block::new(1, head.hash, Vec::new(), Utc::now(), 0);
        assert!(matches!(
            ledger.append(block),
            Err(LedgerError::InvalidProofOfWork(_))
        ));
        assert_eq!(ledger.height(), 0);
    }

    #[test]
    fn test_append_rejects_tampered_hash() {
        let keys = KeyPair::generate();
        let ledger = funded_ledger(&keys, 100);

        let mut block = seal(&ledger, Vec::new());
        block.hash = "0".repeat(64);
        assert!(matches!(
            ledger.append(block),
            Err(LedgerError::InvalidProofOfWork(_))
        ));
    }

    #[test]
    fn test_append_rejects_overspend() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let ledger = funded_ledger(&alice, 100);

        let tx = signed_transfer(&alice, bob.address(), 200, 1);
        let block = seal(&ledger, vec![tx]);

        assert!(matches!(
            ledger.append(block),
            Err(LedgerError::InvalidTransaction { .. })
        ));
        // Rejection leaves no trace.
        assert_eq!(ledger.height(), 0);
        assert_eq!(ledger.balance_of(alice.address(), None).unwrap(), 100);
    }

    #[test]
    fn test_append_rejects_nonce_gap() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let ledger = funded_ledger(&alice, 100);

        let tx = signed_transfer(&alice, bob.address(), 30, 5);
        let block = seal(&ledger, vec![tx]);

        assert!(matches!(
            ledger.append(block),
            Err(LedgerError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn test_append_rejects_double_coinbase() {
        let miner = KeyPair::generate();
        let ledger = funded_ledger(&miner, 0);
        let reward = ledger.params().mining_reward;

        let now = Utc::now();
        let block = seal(
            &ledger,
            vec![
                Transaction::coinbase(miner.address().clone(), reward, now),
                Transaction::coinbase(miner.address().clone(), reward, now),
            ],
        );

        assert!(matches!(
            ledger.append(block),
            Err(LedgerError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn test_historical_balance_by_replay() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let ledger = funded_ledger(&alice, 100);

        let block = seal(&ledger, vec![signed_transfer(&alice, bob.address(), 30, 1)]);
        ledger.append(block).unwrap();

        assert_eq!(ledger.balance_of(alice.address(), Some(0)).unwrap(), 100);
        assert_eq!(ledger.balance_of(alice.address(), Some(1)).unwrap(), 70);
        assert!(matches!(
            ledger.balance_of(alice.address(), Some(2)),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_cache_agrees_with_replay() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let ledger = funded_ledger(&alice, 100);

        let block = seal(&ledger, vec![signed_transfer(&alice, bob.address(), 30, 1)]);
        ledger.append(block).unwrap();
        let block = seal(&ledger, vec![signed_transfer(&alice, bob.address(), 20, 2)]);
        ledger.append(block).unwrap();

        let replayed = ledger.replay_balances();
        for (address, info) in replayed {
            assert_eq!(ledger.account(&address).balance, info.balance);
            assert_eq!(ledger.account(&address).nonce, info.nonce);
        }
    }

    #[test]
    fn test_difficulty_retargets_up_for_fast_blocks() {
        let params = LedgerParams {
            initial_difficulty: 1,
            retarget_interval: 2,
            target_block_secs: 100,
            ..LedgerParams::default()
        };

        // Blocks "mined" seconds apart against a 100-second target.
        let mut blocks = vec![Block::genesis(&[])];
        for h in 1..=2u64 {
            let prev = blocks.last().unwrap();
            let timestamp = prev.timestamp + chrono::Duration::seconds(1);
            blocks.push(Block::new(h, prev.hash.clone(), Vec::new(), timestamp, 0));
        }

        assert_eq!(difficulty_for(&blocks, &params), 2);
    }
}
