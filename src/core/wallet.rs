use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{Address, CryptoError, KeyPair};
use super::transaction::{Transaction, TransactionError};
use super::view::{AccountView, PendingSource, ViewError};

/// Errors that can occur during wallet operations
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Peer error: {0}")]
    Peer(#[from] ViewError),
}

/// Confirmed versus pending funds, kept separate so callers never mistake
/// in-flight money for settled money.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct BalanceBreakdown {
    /// Settled balance at the chain head
    pub confirmed: u64,

    /// Sum of this wallet's transactions still in the pool
    pub pending_outgoing: u64,

    /// confirmed - pending_outgoing
    pub spendable: u64,
}

/// A wallet: one key pair plus the logic to build spendable transactions
/// against the observed chain and pool state. The signing key never leaves
/// this type.
#[derive(Debug, Clone)]
pub struct Wallet {
    keys: KeyPair,
}

impl Wallet {
    pub fn generate() -> Self {
        Wallet {
            keys: KeyPair::generate(),
        }
    }

    pub fn from_keys(keys: KeyPair) -> Self {
        Wallet { keys }
    }

    pub fn address(&self) -> &Address {
        self.keys.address()
    }

    /// Builds and signs a transfer.
    ///
    /// Balance and nonce are derived from confirmed state plus this wallet's
    /// own pending transactions; an overspend fails here, locally, before a
    /// signature is ever produced.
    pub async fn create_transaction(
        &self,
        recipient: Address,
        amount: u64,
        accounts: &dyn AccountView,
        pending: &dyn PendingSource,
    ) -> Result<Transaction, WalletError> {
        let account = accounts.account_info(self.address()).await?;
        let in_flight = pending.pending_for(self.address()).await?;

        let pending_outgoing: u64 = in_flight.iter().map(|tx| tx.amount).sum();
        let spendable = account.balance.saturating_sub(pending_outgoing);

        if amount > spendable {
            return Err(WalletError::InsufficientBalance {
                required: amount,
                available: spendable,
            });
        }

        let nonce = account.nonce + in_flight.len() as u64 + 1;

        let mut tx = Transaction::new(self.address().clone(), recipient, amount, nonce);
        tx.sign(&self.keys)?;

        Ok(tx)
    }

    /// Confirmed and pending balances at the current head.
    pub async fn balance(
        &self,
        accounts: &dyn AccountView,
        pending: &dyn PendingSource,
    ) -> Result<BalanceBreakdown, WalletError> {
        let account = accounts.account_info(self.address()).await?;
        let in_flight = pending.pending_for(self.address()).await?;

        let pending_outgoing: u64 = in_flight.iter().map(|tx| tx.amount).sum();

        Ok(BalanceBreakdown {
            confirmed: account.balance,
            pending_outgoing,
            spendable: account.balance.saturating_sub(pending_outgoing),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::{Ledger, LedgerParams};
    use crate::core::pool::TransactionPool;

    fn funded(wallet: &Wallet, amount: u64) -> Ledger {
        Ledger::new(LedgerParams {
            initial_difficulty: 1,
            genesis_grants: vec![(wallet.address().clone(), amount)],
            ..LedgerParams::default()
        })
    }

    #[tokio::test]
    async fn test_create_transaction_signs_and_numbers() {
        let wallet = Wallet::generate();
        let recipient = Wallet::generate();
        let ledger = funded(&wallet, 100);
        let pool = TransactionPool::new();

        let tx = wallet
            .create_transaction(recipient.address().clone(), 30, &ledger, &pool)
            .await
            .unwrap();

        assert_eq!(tx.nonce, 1);
        assert!(tx.verify_signature().unwrap());

        // Pool accepts its own wallet's output.
        pool.submit(tx, &ledger).await.unwrap();

        // The next transaction numbers past the pending one.
        let tx2 = wallet
            .create_transaction(recipient.address().clone(), 20, &ledger, &pool)
            .await
            .unwrap();
        assert_eq!(tx2.nonce, 2);
    }

    #[tokio::test]
    async fn test_overspend_fails_before_signing() {
        let wallet = Wallet::generate();
        let recipient = Wallet::generate();
        let ledger = funded(&wallet, 70);
        let pool = TransactionPool::new();

        let err = wallet
            .create_transaction(recipient.address().clone(), 200, &ledger, &pool)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WalletError::InsufficientBalance {
                required: 200,
                available: 70
            }
        ));
    }

    #[tokio::test]
    async fn test_balance_separates_pending() {
        let wallet = Wallet::generate();
        let recipient = Wallet::generate();
        let ledger = funded(&wallet, 100);
        let pool = TransactionPool::new();

        let tx = wallet
            .create_transaction(recipient.address().clone(), 30, &ledger, &pool)
            .await
            .unwrap();
        pool.submit(tx, &ledger).await.unwrap();

        let balance = wallet.balance(&ledger, &pool).await.unwrap();
        assert_eq!(balance.confirmed, 100);
        assert_eq!(balance.pending_outgoing, 30);
        assert_eq!(balance.spendable, 70);
    }
}
