use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::collections::BTreeMap;

use super::crypto::Address;

/// Errors that can occur during balance operations
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Insufficient treasury funds: required {required}, available {available}")]
    InsufficientTreasury { required: f64, available: f64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Address to balance mapping.
///
/// Unknown addresses read as zero. All balance mutation in the node goes
/// through this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerState {
    balances: BTreeMap<Address, f64>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh ledger where the treasury holds the whole genesis supply
    pub fn with_genesis(treasury: &Address, supply: f64) -> Self {
        let mut balances = BTreeMap::new();
        balances.insert(treasury.clone(), supply);
        LedgerState { balances }
    }

    pub fn from_balances(balances: BTreeMap<Address, f64>) -> Self {
        LedgerState { balances }
    }

    pub fn balance(&self, address: &Address) -> f64 {
        self.balances.get(address).copied().unwrap_or(0.0)
    }

    pub fn has_sufficient_funds(&self, address: &Address, amount: f64) -> bool {
        self.balance(address) >= amount
    }

    /// Adds `amount` to an account, creating it if needed
    pub fn credit(&mut self, address: &Address, amount: f64) -> Result<(), AccountError> {
        check_amount(amount)?;
        *self.balances.entry(address.clone()).or_insert(0.0) += amount;
        Ok(())
    }

    /// Removes `amount` from an account; fails without change when short
    pub fn debit(&mut self, address: &Address, amount: f64) -> Result<(), AccountError> {
        check_amount(amount)?;

        let available = self.balance(address);
        if available < amount {
            return Err(AccountError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        self.balances.insert(address.clone(), available - amount);
        Ok(())
    }

    /// Sum of every balance
    pub fn total_supply(&self) -> f64 {
        self.balances.values().sum()
    }

    pub fn balances(&self) -> &BTreeMap<Address, f64> {
        &self.balances
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

fn check_amount(amount: f64) -> Result<(), AccountError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AccountError::InvalidAmount(format!(
            "Amount must be a non-negative number: {}",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_address_is_zero() {
        let state = LedgerState::new();
        assert_eq!(state.balance(&Address::from("nobody")), 0.0);
        assert!(state.is_empty());
    }

    #[test]
    fn test_genesis() {
        let treasury = Address::from("open_treasury_001");
        let state = LedgerState::with_genesis(&treasury, 500_000_000.0);

        assert_eq!(state.balance(&treasury), 500_000_000.0);
        assert_eq!(state.total_supply(), 500_000_000.0);
    }

    #[test]
    fn test_credit_and_debit() {
        let mut state = LedgerState::new();
        let address = Address::from("alice");

        state.credit(&address, 100.0).unwrap();
        assert_eq!(state.balance(&address), 100.0);

        state.debit(&address, 40.0).unwrap();
        assert_eq!(state.balance(&address), 60.0);
    }

    #[test]
    fn test_debit_insufficient_leaves_balance() {
        let mut state = LedgerState::new();
        let address = Address::from("alice");
        state.credit(&address, 10.0).unwrap();

        let result = state.debit(&address, 10.5);
        assert!(matches!(
            result,
            Err(AccountError::InsufficientFunds { required, available }) if required == 10.5 && available == 10.0
        ));
        assert_eq!(state.balance(&address), 10.0);
    }

    #[test]
    fn test_invalid_amounts_rejected() {
        let mut state = LedgerState::new();
        let address = Address::from("alice");

        assert!(state.credit(&address, -1.0).is_err());
        assert!(state.credit(&address, f64::INFINITY).is_err());
        assert!(state.debit(&address, f64::NAN).is_err());
        assert!(state.is_empty());
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut state = LedgerState::new();
        state.credit(&Address::from("b"), 2.0).unwrap();
        state.credit(&Address::from("a"), 1.0).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"a":1.0,"b":2.0}"#);

        let back: LedgerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
