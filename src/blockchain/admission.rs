use log::debug;

use super::account::{AccountError, LedgerState};
use super::chain::BlockchainError;
use super::crypto::Address;
use super::transaction::{Transaction, TransactionError, TransactionKind};

/// Fee rate and the validators that share collected fees.
///
/// The local node never pays itself: it is excluded from the recipients at
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    rate: f64,
    recipients: Vec<Address>,
}

impl FeeSchedule {
    pub fn new(rate: f64, local_node: &str, validators: &[String]) -> Self {
        let recipients = validators
            .iter()
            .filter(|v| v.as_str() != local_node && !v.trim().is_empty())
            .map(|v| Address(v.clone()))
            .collect();

        FeeSchedule { rate, recipients }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    /// Splits an amount into the fee, the net credited to the receiver and
    /// the per-validator share. With no recipients the share is zero and the
    /// fee is burned.
    pub fn split(&self, amount: f64) -> FeeSplit {
        let fee = amount * self.rate;
        let share = if self.recipients.is_empty() {
            0.0
        } else {
            fee / self.recipients.len() as f64
        };

        FeeSplit {
            fee,
            net: amount - fee,
            share,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSplit {
    pub fee: f64,
    pub net: f64,
    pub share: f64,
}

/// Validates a transfer and applies it to `state`.
///
/// Checks run in order: structure, signature, funds. A failure returns before
/// any balance is touched. On success the sender pays the full amount, the
/// receiver gets the amount net of fee and each fee recipient gets an even
/// share.
pub fn admit_transfer(
    state: &mut LedgerState,
    tx: &Transaction,
    fees: &FeeSchedule,
) -> Result<FeeSplit, BlockchainError> {
    tx.validate_structure()?;

    if tx.kind != TransactionKind::Transfer {
        return Err(TransactionError::Malformed(
            "faucet transactions are only created by the treasury".to_string(),
        )
        .into());
    }

    if !tx.verify() {
        return Err(TransactionError::Unauthorized(
            "signature does not match sender".to_string(),
        )
        .into());
    }

    if !state.has_sufficient_funds(&tx.sender, tx.amount) {
        return Err(AccountError::InsufficientFunds {
            required: tx.amount,
            available: state.balance(&tx.sender),
        }
        .into());
    }

    let split = fees.split(tx.amount);

    state.debit(&tx.sender, tx.amount)?;
    state.credit(&tx.receiver, split.net)?;
    if split.share > 0.0 {
        for validator in fees.recipients() {
            state.credit(validator, split.share)?;
        }
    }

    debug!(
        "Transfer {} -> {}: amount {}, fee {}, share {} x {}",
        tx.sender,
        tx.receiver,
        tx.amount,
        split.fee,
        split.share,
        fees.recipients().len()
    );

    Ok(split)
}
