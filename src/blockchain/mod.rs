// Blockchain module
//
// This module contains the ledger core:
// - Addresses, keys and signature checks
// - Transactions and their signing message
// - Balance state, admission and fee distribution
// - Faucet minting from the treasury
// - Blocks, the chain state object and its persistence

pub mod account;
pub mod admission;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod faucet;
pub mod storage;
pub mod transaction;

use chrono::Utc;
use serde_json::Value;

// Re-export main components for easier access
pub use account::LedgerState;
pub use admission::FeeSchedule;
pub use block::Block;
pub use chain::{Blockchain, BlockchainError, LedgerParams};
pub use crypto::{Address, Wallet};
pub use faucet::{FaucetRequest, Treasury};
pub use transaction::{Transaction, TransactionKind};

/// Current time as Unix seconds with microsecond precision
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Compact JSON with object keys sorted at every level.
///
/// Independent of how `serde_json` orders map keys internally.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let fields: Vec<String> = entries
                .into_iter()
                .map(|(key, value)| {
                    format!("{}:{}", Value::String(key.clone()), canonical_json(value))
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = serde_json::json!({
            "b": [{"z": 1, "a": "x:y"}],
            "a": 1.5,
        });

        assert_eq!(canonical_json(&value), r#"{"a":1.5,"b":[{"a":"x:y","z":1}]}"#);
    }

    #[test]
    fn test_unix_now_is_recent() {
        // 2020-01-01
        assert!(unix_now() > 1_577_836_800.0);
    }
}
