//! Shared fixtures for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::blockchain::{Address, Block, FeeSchedule, LedgerParams, Treasury, Wallet};
use crate::network::peer::{PeerClient, PeerError};

/// Ledger parameters for `node1` in a three validator set, faucet disabled
pub fn test_params() -> LedgerParams {
    params(None)
}

/// Same as [`test_params`] with `key` authorized for the faucet
pub fn test_params_with_key(key: &Wallet) -> LedgerParams {
    params(Some(key.public_key_hex()))
}

fn params(treasury_key: Option<String>) -> LedgerParams {
    let validators = vec!["node1".to_string(), "node2".to_string(), "node3".to_string()];
    LedgerParams {
        node_id: "node1".to_string(),
        fees: FeeSchedule::new(0.002, "node1", &validators),
        treasury: Treasury::new(Address::from("open_treasury_001"), treasury_key),
        genesis_supply: 500_000_000.0,
    }
}

/// A well formed chain of empty blocks mined by `miner`
pub fn peer_chain(length: u64, miner: &str) -> Vec<Block> {
    (0..length)
        .map(|index| Block::with_timestamp(index, 1_700_000_000.0 + index as f64, vec![], miner.to_string()))
        .collect()
}

/// In-process [`PeerClient`] with canned chains and unreachable peers
#[derive(Default)]
pub struct MockPeerClient {
    chains: HashMap<String, Vec<Block>>,
    unreachable: HashSet<String>,
    sent: Mutex<Vec<(String, u64)>>,
}

impl MockPeerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, peer: &str, chain: Vec<Block>) -> Self {
        self.chains.insert(peer.to_string(), chain);
        self
    }

    pub fn unreachable(mut self, peer: &str) -> Self {
        self.unreachable.insert(peer.to_string());
        self
    }

    /// `(peer, block index)` for every delivered block
    pub fn sent_blocks(&self) -> Vec<(String, u64)> {
        self.sent.lock().unwrap().clone()
    }

    fn check(&self, peer: &str) -> Result<(), PeerError> {
        if self.unreachable.contains(peer) || !self.chains.contains_key(peer) {
            return Err(PeerError::Unreachable {
                peer: peer.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PeerClient for MockPeerClient {
    async fn send_block(&self, peer: &str, block: &Block) -> Result<(), PeerError> {
        self.check(peer)?;
        self.sent.lock().unwrap().push((peer.to_string(), block.index));
        Ok(())
    }

    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
        self.check(peer)?;
        Ok(self.chains[peer].clone())
    }
}
