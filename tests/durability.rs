//! The block log survives a restart: balances come back by replay, and the
//! reopened ledger extends the same chain.

use chrono::Utc;
use tempfile::TempDir;

use minicoin::core::{Address, Block, KeyPair, Ledger, LedgerParams, Transaction};

fn params(grants: Vec<(Address, u64)>) -> LedgerParams {
    LedgerParams {
        initial_difficulty: 1,
        genesis_grants: grants,
        ..LedgerParams::default()
    }
}

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

#[test]
fn chain_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();

    let head_hash;
    {
        let ledger =
            Ledger::with_storage(params(vec![(alice.address().clone(), 100)]), dir.path())
                .unwrap();

        let mut tx = Transaction::new(alice.address().clone(), bob.address().clone(), 30, 1);
        tx.sign(&alice).unwrap();
        let block = seal(&ledger, vec![tx]);
        ledger.append(block).unwrap();

        assert_eq!(ledger.height(), 1);
        head_hash = ledger.head_info().hash;
    }

    // Reopen from the same log; genesis grants come from the log, not the
    // params, so balances cannot fork.
    let reopened =
        Ledger::with_storage(params(vec![(alice.address().clone(), 100)]), dir.path()).unwrap();

    assert_eq!(reopened.height(), 1);
    assert_eq!(reopened.head_info().hash, head_hash);
    assert_eq!(reopened.balance_of(alice.address(), None).unwrap(), 70);
    assert_eq!(reopened.balance_of(bob.address(), None).unwrap(), 30);
    assert_eq!(reopened.account(alice.address()).nonce, 1);
    assert!(reopened.is_valid());

    // And it keeps accepting blocks on the restored head.
    let mut tx = Transaction::new(alice.address().clone(), bob.address().clone(), 10, 2);
    tx.sign(&alice).unwrap();
    let block = seal(&reopened, vec![tx]);
    reopened.append(block).unwrap();
    assert_eq!(reopened.height(), 2);
}

#[test]
fn stored_genesis_wins_over_changed_grants() {
    let dir = TempDir::new().unwrap();
    let alice = KeyPair::generate();

    {
        let ledger =
            Ledger::with_storage(params(vec![(alice.address().clone(), 100)]), dir.path())
                .unwrap();
        assert_eq!(ledger.balance_of(alice.address(), None).unwrap(), 100);
    }

    // An operator editing the grant list after the fact changes nothing;
    // the settled genesis block is authoritative.
    let reopened =
        Ledger::with_storage(params(vec![(alice.address().clone(), 9999)]), dir.path()).unwrap();
    assert_eq!(reopened.balance_of(alice.address(), None).unwrap(), 100);
}
