// Domain core
//
// The four components of the settlement pipeline and what they share:
// - Crypto primitives (key pairs, addresses, signatures)
// - Transactions and blocks
// - The append-only ledger with proof-of-work validation
// - The pending transaction pool
// - The miner state machine
// - The wallet
// - View traits connecting them in-process or over HTTP

pub mod block;
pub mod crypto;
pub mod ledger;
pub mod miner;
pub mod pool;
pub mod storage;
pub mod transaction;
pub mod view;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use crypto::{Address, DigitalSignature, KeyPair};
pub use ledger::{Ledger, LedgerError, LedgerParams};
pub use miner::{MineOutcome, Miner, MinerConfig, MinerStatus};
pub use pool::{PoolError, SubmitOutcome, TransactionPool};
pub use transaction::Transaction;
pub use view::{AccountInfo, AccountView, ChainView, HeadInfo, PendingSource, ViewError};
pub use wallet::{BalanceBreakdown, Wallet, WalletError};
