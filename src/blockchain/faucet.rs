use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::account::{AccountError, LedgerState};
use super::chain::BlockchainError;
use super::crypto::{Address, Wallet};
use super::transaction::{Transaction, TransactionError, TransactionKind};

/// The privileged account faucet mints are drawn from
#[derive(Debug, Clone, PartialEq)]
pub struct Treasury {
    pub address: Address,
    /// Hex public key allowed to authorize mints; `None` disables the faucet
    pub public_key: Option<String>,
}

impl Treasury {
    pub fn new(address: Address, public_key: Option<String>) -> Self {
        let public_key = public_key
            .map(|key| key.trim().to_lowercase())
            .filter(|key| !key.is_empty());
        Treasury { address, public_key }
    }

    fn authorizes(&self, public_key: &str) -> bool {
        match &self.public_key {
            Some(key) => key.eq_ignore_ascii_case(public_key.trim()),
            None => false,
        }
    }
}

/// A signed request to mint treasury funds to an address.
///
/// The signature covers the same message as a transfer whose sender is the
/// treasury address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FaucetRequest {
    pub address: Address,
    pub amount: f64,
    pub timestamp: f64,
    pub signature: String,
    #[serde(rename = "pubkey")]
    pub public_key: String,
}

impl FaucetRequest {
    /// Builds and signs a request with the treasury key
    pub fn signed(wallet: &Wallet, treasury: &Address, address: Address, amount: f64) -> Self {
        let mut tx = Transaction::new(treasury.clone(), address, amount);
        tx.signature = wallet.sign(&tx.signing_message());

        FaucetRequest {
            address: tx.receiver,
            amount: tx.amount,
            timestamp: tx.timestamp,
            signature: tx.signature,
            public_key: wallet.public_key_hex(),
        }
    }

    /// The ledger record this request turns into
    pub fn into_transaction(self, treasury: &Treasury) -> Transaction {
        Transaction {
            sender: treasury.address.clone(),
            receiver: self.address,
            amount: self.amount,
            timestamp: self.timestamp,
            signature: self.signature,
            public_key: self.public_key,
            kind: TransactionKind::Faucet,
        }
    }
}

/// Mints `request.amount` from the treasury to `request.address`.
///
/// Same skeleton as a transfer: structure, then authorization, then the
/// treasury balance check. Mints carry no fee.
pub fn mint(
    state: &mut LedgerState,
    request: FaucetRequest,
    treasury: &Treasury,
) -> Result<Transaction, BlockchainError> {
    let tx = request.into_transaction(treasury);
    tx.validate_structure()?;

    if !treasury.authorizes(&tx.public_key) || !tx.has_valid_signature() {
        return Err(TransactionError::Unauthorized(
            "faucet request is not signed by the treasury key".to_string(),
        )
        .into());
    }

    let available = state.balance(&treasury.address);
    if available < tx.amount {
        return Err(AccountError::InsufficientTreasury {
            required: tx.amount,
            available,
        }
        .into());
    }

    state.debit(&treasury.address, tx.amount)?;
    state.credit(&tx.receiver, tx.amount)?;

    Ok(tx)
}
