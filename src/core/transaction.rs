use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, KeyPair};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Transaction not signed")]
    NotSigned,

    #[error("Transaction already signed")]
    AlreadySigned,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid sender: {0}")]
    InvalidSender(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// A transfer of value between two accounts.
///
/// Amounts are in the smallest currency unit. The nonce is a per-sender
/// strictly increasing counter starting at 1; it is what makes a signed
/// transaction single-use.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub sender: Address,

    /// Recipient's address
    pub recipient: Address,

    /// Amount being transferred, smallest unit
    pub amount: u64,

    /// Per-sender replay-protection counter
    pub nonce: u64,

    /// Signature over sender, recipient, amount, nonce and timestamp
    pub signature: Option<DigitalSignature>,

    /// Creation time
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Creates a new unsigned transaction.
    pub fn new(sender: Address, recipient: Address, amount: u64, nonce: u64) -> Self {
        Transaction {
            sender,
            recipient,
            amount,
            nonce,
            signature: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a coinbase transaction (mining reward or genesis grant).
    ///
    /// Coinbase transactions carry the reserved sender address, nonce 0 and
    /// no signature; they mint value rather than move it.
    pub fn coinbase(recipient: Address, amount: u64, timestamp: DateTime<Utc>) -> Self {
        Transaction {
            sender: Address::coinbase(),
            recipient,
            amount,
            nonce: 0,
            signature: None,
            timestamp,
        }
    }

    /// The transaction id: SHA-256 over the canonical signing bytes.
    ///
    /// Content-derived, so re-submitting the identical transaction produces
    /// the identical id. Pool admission relies on this for idempotency.
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_bytes_lossy());
        format!("{:x}", hasher.finalize())
    }

    /// Signs the transaction with the sender's key pair.
    pub fn sign(&mut self, keys: &KeyPair) -> Result<(), TransactionError> {
        if self.signature.is_some() {
            return Err(TransactionError::AlreadySigned);
        }

        if keys.address() != &self.sender {
            return Err(TransactionError::InvalidSender(
                "key pair does not match sender address".to_string(),
            ));
        }

        let message = self.signing_bytes()?;
        self.signature = Some(keys.sign(&message));

        Ok(())
    }

    /// Verifies the signature against the sender's public key.
    pub fn verify_signature(&self) -> Result<bool, TransactionError> {
        let signature = match &self.signature {
            Some(sig) => sig,
            None => return Err(TransactionError::NotSigned),
        };

        let message = self.signing_bytes()?;
        verify_signature(&message, signature, &self.sender).map_err(TransactionError::from)
    }

    /// Structural checks that hold for any admissible transfer: positive
    /// amount, non-coinbase sender, valid signature.
    pub fn validate_transfer(&self) -> Result<(), TransactionError> {
        if self.amount == 0 {
            return Err(TransactionError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }

        if self.is_coinbase() {
            return Err(TransactionError::InvalidSender(
                "coinbase sender cannot submit transfers".to_string(),
            ));
        }

        if !self.verify_signature()? {
            return Err(TransactionError::InvalidSignature);
        }

        Ok(())
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender.is_coinbase() && self.nonce == 0 && self.signature.is_none()
    }

    /// Canonical byte encoding of everything the signature covers.
    fn signing_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        let data = serde_json::json!({
            "sender": self.sender.0,
            "recipient": self.recipient.0,
            "amount": self.amount,
            "nonce": self.nonce,
            "timestamp": self.timestamp,
        });

        serde_json::to_vec(&data).map_err(|e| TransactionError::Encoding(e.to_string()))
    }

    // Identical to signing_bytes but infallible for id computation; JSON
    // encoding of these fields cannot fail in practice.
    fn signing_bytes_lossy(&self) -> Vec<u8> {
        self.signing_bytes().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();

        let tx = Transaction::new(sender.address().clone(), recipient.address().clone(), 30, 1);

        assert_eq!(tx.amount, 30);
        assert_eq!(tx.nonce, 1);
        assert!(tx.signature.is_none());
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn test_sign_and_verify() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();

        let mut tx = Transaction::new(sender.address().clone(), recipient.address().clone(), 30, 1);
        tx.sign(&sender).unwrap();

        assert!(tx.verify_signature().unwrap());
        assert!(tx.validate_transfer().is_ok());
    }

    #[test]
    fn test_sign_with_wrong_key() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();
        let intruder = KeyPair::generate();

        let mut tx = Transaction::new(sender.address().clone(), recipient.address().clone(), 30, 1);
        assert!(matches!(
            tx.sign(&intruder),
            Err(TransactionError::InvalidSender(_))
        ));
    }

    #[test]
    fn test_tampered_amount_fails_verification() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();

        let mut tx = Transaction::new(sender.address().clone(), recipient.address().clone(), 30, 1);
        tx.sign(&sender).unwrap();

        tx.amount = 300;
        assert!(!tx.verify_signature().unwrap());
    }

    #[test]
    fn test_id_is_content_derived() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();

        let mut tx = Transaction::new(sender.address().clone(), recipient.address().clone(), 30, 1);
        let id_before = tx.id();
        tx.sign(&sender).unwrap();

        // Signing does not change the id; a different nonce does.
        assert_eq!(tx.id(), id_before);

        let other = Transaction::new(sender.address().clone(), recipient.address().clone(), 30, 2);
        assert_ne!(other.id(), id_before);
    }

    #[test]
    fn test_coinbase_transaction() {
        let miner = KeyPair::generate();
        let tx = Transaction::coinbase(miner.address().clone(), 50, Utc::now());

        assert!(tx.is_coinbase());
        assert!(tx.sender.is_coinbase());
        assert_eq!(tx.amount, 50);
        // A coinbase is not an admissible transfer.
        assert!(tx.validate_transfer().is_err());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();

        let mut tx = Transaction::new(sender.address().clone(), recipient.address().clone(), 0, 1);
        tx.sign(&sender).unwrap();

        assert!(matches!(
            tx.validate_transfer(),
            Err(TransactionError::InvalidAmount(_))
        ));
    }
}
