//! End-to-end settlement flows with all components wired in-process:
//! ledger, pool, miner and wallet talking through the same interfaces the
//! HTTP services use.

use chrono::Utc;

use minicoin::core::{
    Block, KeyPair, Ledger, LedgerError, LedgerParams, MineOutcome, Miner, MinerConfig, PoolError,
    SubmitOutcome, Transaction, TransactionPool, Wallet,
};

fn fast_ledger(grants: Vec<(minicoin::core::Address, u64)>) -> Ledger {
    Ledger::new(LedgerParams {
        initial_difficulty: 1,
        genesis_grants: grants,
        ..LedgerParams::default()
    })
}

fn miner_for(keys: &KeyPair) -> Miner {
    Miner::new(MinerConfig {
        reward_address: keys.address().clone(),
        mining_reward: 50,
        block_tx_limit: 100,
    })
}

/// Seals a candidate on the current head at the ledger's difficulty.
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

#[tokio::test]
async fn wallet_to_miner_settlement() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let miner_keys = KeyPair::generate();

    let ledger = fast_ledger(vec![(alice.address().clone(), 100)]);
    let pool = TransactionPool::new();
    let miner = miner_for(&miner_keys);

    // Alice builds and signs against live state, the pool admits.
    let tx = alice
        .create_transaction(bob.address().clone(), 30, &ledger, &pool)
        .await
        .unwrap();
    assert_eq!(tx.nonce, 1);
    assert!(matches!(
        pool.submit(tx, &ledger).await.unwrap(),
        SubmitOutcome::Admitted
    ));

    // One mining cycle settles it.
    let outcome = miner.mine_once(&ledger, &pool).await.unwrap();
    let block = match outcome {
        MineOutcome::Mined(block) => block,
        MineOutcome::Cancelled => panic!("unexpected cancellation"),
    };

    assert_eq!(block.height, 1);
    assert_eq!(ledger.balance_of(alice.address(), None).unwrap(), 70);
    assert_eq!(ledger.balance_of(bob.address(), None).unwrap(), 30);
    assert_eq!(ledger.balance_of(miner_keys.address(), None).unwrap(), 50);
    assert!(pool.is_empty());
    assert!(ledger.is_valid());

    // The incremental balance cache agrees with a full replay.
    for (address, info) in ledger.replay_balances() {
        assert_eq!(ledger.account(&address).balance, info.balance);
        assert_eq!(ledger.account(&address).nonce, info.nonce);
    }
}

#[tokio::test]
async fn overspend_never_reaches_the_chain() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let ledger = fast_ledger(vec![(alice.address().clone(), 70)]);
    let pool = TransactionPool::new();

    // The wallet refuses before signing.
    assert!(alice
        .create_transaction(bob.address().clone(), 200, &ledger, &pool)
        .await
        .is_err());

    // A hand-built overspend is refused by the pool too.
    let alice_keys = KeyPair::generate();
    let funded = fast_ledger(vec![(alice_keys.address().clone(), 70)]);
    let mut tx = Transaction::new(
        alice_keys.address().clone(),
        bob.address().clone(),
        200,
        1,
    );
    tx.sign(&alice_keys).unwrap();
    let err = pool.submit(tx, &funded).await.unwrap_err();
    assert!(matches!(err, PoolError::InsufficientBalance { .. }));

    assert_eq!(ledger.height(), 0);
    assert!(pool.is_empty());
}

#[tokio::test]
async fn same_nonce_admitted_once() {
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let carol = KeyPair::generate();
    let ledger = fast_ledger(vec![(alice.address().clone(), 100)]);
    let pool = TransactionPool::new();

    let mut to_bob = Transaction::new(alice.address().clone(), bob.address().clone(), 30, 1);
    to_bob.sign(&alice).unwrap();
    let mut to_carol = Transaction::new(alice.address().clone(), carol.address().clone(), 40, 1);
    to_carol.sign(&alice).unwrap();

    pool.submit(to_bob.clone(), &ledger).await.unwrap();
    let err = pool.submit(to_carol, &ledger).await.unwrap_err();
    assert!(matches!(err, PoolError::InvalidNonce { expected: 2, got: 1 }));
    assert_eq!(pool.len(), 1);

    // Re-submitting the winner is idempotent, not an error.
    assert!(matches!(
        pool.submit(to_bob, &ledger).await.unwrap(),
        SubmitOutcome::AlreadyPending
    ));
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn linkage_race_has_one_winner() {
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let ledger = fast_ledger(vec![(alice.address().clone(), 100)]);
    let pool = TransactionPool::new();

    let mut tx = Transaction::new(alice.address().clone(), bob.address().clone(), 30, 1);
    tx.sign(&alice).unwrap();
    pool.submit(tx.clone(), &ledger).await.unwrap();

    // Two miners solve candidates on the same head.
    let first = seal(&ledger, vec![tx.clone()]);
    let second = seal(&ledger, Vec::new());

    ledger.append(first).unwrap();
    let err = ledger.append(second).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidLinkage { .. }));

    // Exactly one block landed; the loser's work left no trace.
    assert_eq!(ledger.height(), 1);
    assert_eq!(ledger.balance_of(bob.address(), None).unwrap(), 30);

    // The pool still holds the transaction until eviction is requested.
    assert_eq!(pool.len(), 1);
    let mined = ledger.block_at(1).unwrap();
    assert_eq!(pool.evict_mined(&mined), 1);
    assert!(pool.is_empty());
}

#[tokio::test]
async fn pending_funds_are_not_spendable_twice() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let ledger = fast_ledger(vec![(alice.address().clone(), 100)]);
    let pool = TransactionPool::new();

    let tx = alice
        .create_transaction(bob.address().clone(), 80, &ledger, &pool)
        .await
        .unwrap();
    pool.submit(tx, &ledger).await.unwrap();

    // 20 spendable remain; asking for 30 fails locally.
    let err = alice
        .create_transaction(bob.address().clone(), 30, &ledger, &pool)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("available 20"));

    let balance = alice.balance(&ledger, &pool).await.unwrap();
    assert_eq!(balance.confirmed, 100);
    assert_eq!(balance.pending_outgoing, 80);
    assert_eq!(balance.spendable, 20);
}
