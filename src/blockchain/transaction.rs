use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{self, Address, Wallet};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Malformed transaction: {0}")]
    Malformed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Duplicate transaction: {0}")]
    Duplicate(String),

    #[error("Transaction already signed")]
    AlreadySigned,
}

/// Distinguishes ordinary transfers from treasury mints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[default]
    Transfer,
    Faucet,
}

/// A signed value transfer.
///
/// Transactions are never mutated after admission; the block producer copies
/// them into sealed blocks as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub sender: Address,

    /// Receiver's address
    pub receiver: Address,

    /// Amount being transferred, fee included
    pub amount: f64,

    /// Unix seconds at signing time
    pub timestamp: f64,

    /// Hex encoded Ed25519 signature over [`Transaction::signing_message`]
    pub signature: String,

    /// Hex encoded Ed25519 public key of the signer
    #[serde(rename = "pubkey")]
    pub public_key: String,

    #[serde(rename = "type", default)]
    pub kind: TransactionKind,
}

impl Transaction {
    /// Creates a new unsigned transfer stamped with the current time
    pub fn new(sender: Address, receiver: Address, amount: f64) -> Self {
        Transaction {
            sender,
            receiver,
            amount,
            timestamp: super::unix_now(),
            signature: String::new(),
            public_key: String::new(),
            kind: TransactionKind::Transfer,
        }
    }

    /// Signs the transaction with a wallet.
    ///
    /// The wallet is not required to own the sender address; a mismatch is
    /// caught by [`Transaction::verify`].
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if !self.signature.is_empty() {
            return Err(TransactionError::AlreadySigned);
        }

        self.signature = wallet.sign(&self.signing_message());
        self.public_key = wallet.public_key_hex();
        Ok(())
    }

    /// The exact bytes a client signs.
    ///
    /// `sender:receiver:amount:timestamp`, with `\` and `:` escaped inside the
    /// address fields so the separator is unambiguous. Numbers use the
    /// shortest decimal that round-trips the `f64`.
    pub fn signing_message(&self) -> Vec<u8> {
        format!(
            "{}:{}:{}:{}",
            escape_field(self.sender.as_str()),
            escape_field(self.receiver.as_str()),
            self.amount,
            self.timestamp
        )
        .into_bytes()
    }

    /// Structural validation: every field present and numerically sane
    pub fn validate_structure(&self) -> Result<(), TransactionError> {
        if self.sender.is_empty() {
            return Err(TransactionError::Malformed("missing sender".to_string()));
        }
        if self.receiver.is_empty() {
            return Err(TransactionError::Malformed("missing receiver".to_string()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(TransactionError::Malformed(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if !self.timestamp.is_finite() || self.timestamp <= 0.0 {
            return Err(TransactionError::Malformed("missing timestamp".to_string()));
        }
        if self.signature.trim().is_empty() {
            return Err(TransactionError::Malformed("missing signature".to_string()));
        }
        if self.public_key.trim().is_empty() {
            return Err(TransactionError::Malformed("missing public key".to_string()));
        }
        Ok(())
    }

    /// Checks only that the signature matches the supplied public key
    pub fn has_valid_signature(&self) -> bool {
        crypto::verify_signature(&self.signing_message(), &self.signature, &self.public_key)
    }

    /// Full signature verification.
    ///
    /// The public key must derive the declared sender address and the
    /// signature must cover this exact sender, receiver, amount and
    /// timestamp. Malformed input simply fails.
    pub fn verify(&self) -> bool {
        let key_bytes = match hex::decode(self.public_key.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        if Address::from_public_key_bytes(&key_bytes) != self.sender {
            return false;
        }

        self.has_valid_signature()
    }

    pub fn is_faucet(&self) -> bool {
        self.kind == TransactionKind::Faucet
    }

    /// Whether the address appears on either side of the transaction
    pub fn involves(&self, address: &Address) -> bool {
        &self.sender == address || &self.receiver == address
    }

    /// Hex SHA-256 of the canonical JSON of the record
    pub fn hash(&self) -> String {
        let canonical = serde_json::to_value(self)
            .map(|value| super::canonical_json(&value))
            .unwrap_or_default();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

fn escape_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace(':', "\\:")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_transfer(wallet: &Wallet, receiver: &str, amount: f64) -> Transaction {
        let mut tx = Transaction::new(wallet.address().clone(), Address::from(receiver), amount);
        tx.sign(wallet).unwrap();
        tx
    }

    #[test]
    fn test_new_transaction() {
        let sender = Wallet::new();
        let tx = Transaction::new(sender.address().clone(), Address::from("openbob"), 10.5);

        assert_eq!(tx.sender, *sender.address());
        assert_eq!(tx.amount, 10.5);
        assert_eq!(tx.kind, TransactionKind::Transfer);
        assert!(tx.timestamp > 0.0);
        assert!(tx.signature.is_empty());
    }

    #[test]
    fn test_sign_and_verify() {
        let wallet = Wallet::new();
        let tx = signed_transfer(&wallet, "openbob", 10.0);

        assert!(tx.validate_structure().is_ok());
        assert!(tx.verify());
    }

    #[test]
    fn test_sign_twice_fails() {
        let wallet = Wallet::new();
        let mut tx = signed_transfer(&wallet, "openbob", 10.0);

        assert!(matches!(tx.sign(&wallet), Err(TransactionError::AlreadySigned)));
    }

    #[test]
    fn test_tampered_fields_fail_verification() {
        let wallet = Wallet::new();
        let original = signed_transfer(&wallet, "openbob", 10.0);

        let mut tx = original.clone();
        tx.amount = 11.0;
        assert!(!tx.verify());

        let mut tx = original.clone();
        tx.receiver = Address::from("openmallory");
        assert!(!tx.verify());

        let mut tx = original.clone();
        tx.timestamp += 1.0;
        assert!(!tx.verify());
    }

    #[test]
    fn test_sender_must_match_public_key() {
        let signer = Wallet::new();
        let victim = Wallet::new();

        // Signature is valid for the message, but the key does not own the sender
        let mut tx = Transaction::new(victim.address().clone(), Address::from("openbob"), 5.0);
        tx.sign(&signer).unwrap();

        assert!(tx.has_valid_signature());
        assert!(!tx.verify());
    }

    #[test]
    fn test_malformed_key_material_fails_verification() {
        let wallet = Wallet::new();
        let mut tx = signed_transfer(&wallet, "openbob", 1.0);
        tx.public_key = "not hex".to_string();
        assert!(!tx.verify());

        let mut tx = signed_transfer(&wallet, "openbob", 1.0);
        tx.signature = "abc".to_string();
        assert!(!tx.verify());
    }

    #[test]
    fn test_structure_validation() {
        let wallet = Wallet::new();
        let good = signed_transfer(&wallet, "openbob", 1.0);

        let mut tx = good.clone();
        tx.amount = 0.0;
        assert!(matches!(tx.validate_structure(), Err(TransactionError::Malformed(_))));

        let mut tx = good.clone();
        tx.amount = f64::NAN;
        assert!(matches!(tx.validate_structure(), Err(TransactionError::Malformed(_))));

        let mut tx = good.clone();
        tx.receiver = Address::from("");
        assert!(matches!(tx.validate_structure(), Err(TransactionError::Malformed(_))));

        let mut tx = good;
        tx.signature.clear();
        assert!(matches!(tx.validate_structure(), Err(TransactionError::Malformed(_))));
    }

    #[test]
    fn test_signing_message_escapes_separator() {
        let a = Transaction {
            sender: Address::from("a:b"),
            receiver: Address::from("c"),
            amount: 1.0,
            timestamp: 2.0,
            signature: String::new(),
            public_key: String::new(),
            kind: TransactionKind::Transfer,
        };
        let b = Transaction {
            sender: Address::from("a"),
            receiver: Address::from("b:c"),
            ..a.clone()
        };

        assert_ne!(a.signing_message(), b.signing_message());
        assert_eq!(a.signing_message(), b"a\\:b:c:1:2".to_vec());
    }

    #[test]
    fn test_json_field_names() {
        let wallet = Wallet::new();
        let tx = signed_transfer(&wallet, "openbob", 3.0);
        let value = serde_json::to_value(&tx).unwrap();

        assert_eq!(value["type"], "transfer");
        assert_eq!(value["pubkey"], tx.public_key);

        // `type` is optional on input
        let mut object = value.as_object().unwrap().clone();
        object.remove("type");
        let parsed: Transaction = serde_json::from_value(serde_json::Value::Object(object)).unwrap();
        assert_eq!(parsed.kind, TransactionKind::Transfer);
        assert_eq!(parsed.hash(), tx.hash());
    }

    #[test]
    fn test_signature_survives_json_with_full_precision_floats() {
        use rand::Rng;

        let wallet = Wallet::new();
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let amount = rng.gen_range(1e-6..1e9);
            let mut tx = Transaction::new(wallet.address().clone(), Address::from("openbob"), amount);
            tx.timestamp = rng.gen_range(1.6e9..1.9e9);
            tx.sign(&wallet).unwrap();

            let parsed: Transaction = serde_json::from_str(&serde_json::to_string(&tx).unwrap()).unwrap();

            assert_eq!(parsed.amount.to_bits(), tx.amount.to_bits(), "amount {}", tx.amount);
            assert_eq!(parsed.timestamp.to_bits(), tx.timestamp.to_bits());
            assert!(parsed.verify(), "signature broke for amount {}", tx.amount);
            assert_eq!(parsed.hash(), tx.hash());
        }

        // Known to come back one ULP off without exact float parsing
        let mut tx = Transaction::new(wallet.address().clone(), Address::from("openbob"), 116_819_382.528_571_43);
        tx.sign(&wallet).unwrap();
        let parsed: Transaction = serde_json::from_str(&serde_json::to_string(&tx).unwrap()).unwrap();
        assert!(parsed.verify());
    }
}
