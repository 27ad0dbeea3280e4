//! minicoin is a mini cryptocurrency split into four cooperating services:
//! Wallet, Transaction (pending pool), Miner and Blockchain (ledger).
//!
//! The flow: a wallet signs a transaction, the pool admits it after
//! signature/nonce/balance validation, the miner pulls admitted
//! transactions into a proof-of-work candidate, and the ledger appends the
//! solved block. Balances are derived by replaying the chain.

pub mod api;
pub mod config;
pub mod core;
