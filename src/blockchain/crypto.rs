use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

/// Tag every derived address starts with
pub const ADDRESS_PREFIX: &str = "open";

/// Number of hex characters of the public key digest kept in an address
pub const ADDRESS_HASH_LEN: usize = 36;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// An account identifier on the ledger.
///
/// Addresses of key holders are derived from a public key (see
/// [`Address::from_public_key`]); the treasury and validator identifiers are
/// plain configured strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Derives the address owned by a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Self::from_public_key_bytes(public_key.as_bytes())
    }

    /// Derives an address from raw public key bytes.
    ///
    /// The digest is taken over the lowercase hex rendering of the key, so the
    /// same key always maps to the same address regardless of transport.
    pub fn from_public_key_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(hex::encode(bytes).as_bytes());
        let digest_hex = hex::encode(digest);
        Address(format!("{}{}", ADDRESS_PREFIX, &digest_hex[..ADDRESS_HASH_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Decodes a hex encoded Ed25519 public key
pub fn decode_public_key(public_key_hex: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = hex::decode(public_key_hex.trim())
        .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

    let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidPublicKey("Public key must be 32 bytes".to_string())
    })?;

    VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Decodes a hex encoded Ed25519 signature
pub fn decode_signature(signature_hex: &str) -> Result<Signature, CryptoError> {
    let bytes = hex::decode(signature_hex.trim())
        .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

    let bytes: [u8; 64] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidSignature("Signature must be 64 bytes".to_string())
    })?;

    Ok(Signature::from_bytes(&bytes))
}

/// Checks a hex signature over `message` against a hex public key.
///
/// Any decoding failure counts as a failed verification.
pub fn verify_signature(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    let public_key = match decode_public_key(public_key_hex) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match decode_signature(signature_hex) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    public_key.verify(message, &signature).is_ok()
}

/// A key pair able to sign ledger messages
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_signing_key(signing_key)
    }

    /// Creates a wallet from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes_array)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        let address = Address::from_public_key(&verifying_key);

        Wallet {
            signing_key,
            verifying_key,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The public key as lowercase hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Signs a message and returns the signature as lowercase hex
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
