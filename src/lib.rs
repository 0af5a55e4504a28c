//! A minimal account-based ledger node.
//!
//! Signed transfers are admitted against a balance map with a flat fee split
//! among validators, batched into hash-identified blocks and reconciled with
//! peers under the longest-chain rule.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod network;
pub mod node;

#[cfg(test)]
mod testing;

pub use config::NodeConfig;
pub use node::Node;
