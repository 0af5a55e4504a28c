use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::blockchain::chain::TransactionRecord;
use crate::blockchain::{Address, Block, Blockchain, BlockchainError, FaucetRequest, Transaction};
use crate::network::{broadcast_block, ChainReconciler, PeerClient, PeerRegistry, PeerStatus, ReconcileReport};

/// What happened to a block pushed by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Accepted,
    /// Not appended; carries the rejection code
    Ignored(&'static str),
}

/// A running ledger node.
///
/// The ledger sits behind a single `RwLock`: every mutation takes the write
/// lock, queries share the read lock. Peer I/O never happens while either is
/// held. Cloning is cheap and shares the same ledger.
#[derive(Clone)]
pub struct Node {
    blockchain: Arc<RwLock<Blockchain>>,
    client: Arc<dyn PeerClient>,
    registry: Arc<PeerRegistry>,
    reconciler: ChainReconciler,
    peers: Arc<Vec<String>>,
    role: String,
}

impl Node {
    pub fn new(
        blockchain: Blockchain,
        client: Arc<dyn PeerClient>,
        peers: Vec<String>,
        role: String,
        verify_adopted_chains: bool,
    ) -> Self {
        let registry = Arc::new(PeerRegistry::new(&peers));
        let reconciler = ChainReconciler::new(
            client.clone(),
            registry.clone(),
            peers.clone(),
            verify_adopted_chains,
        );

        Node {
            blockchain: Arc::new(RwLock::new(blockchain)),
            client,
            registry,
            reconciler,
            peers: Arc::new(peers),
            role,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub async fn submit_transaction(&self, transaction: Transaction) -> Result<Transaction, BlockchainError> {
        let mut ledger = self.blockchain.write().await;
        ledger.submit_transaction(transaction).map_err(|err| {
            warn!("Rejected transaction ({}): {}", err.reason(), err);
            err
        })
    }

    pub async fn faucet_mint(&self, request: FaucetRequest) -> Result<Transaction, BlockchainError> {
        let mut ledger = self.blockchain.write().await;
        ledger.faucet_mint(request).map_err(|err| {
            warn!("Rejected faucet request ({}): {}", err.reason(), err);
            err
        })
    }

    /// Seals the pending set into a block, then broadcasts it in the background
    pub async fn produce_block(&self) -> Result<Block, BlockchainError> {
        let block = self.blockchain.write().await.produce_block()?;
        self.spawn_broadcast(block.clone());
        Ok(block)
    }

    fn spawn_broadcast(&self, block: Block) {
        if self.peers.is_empty() {
            return;
        }

        let client = self.client.clone();
        let registry = self.registry.clone();
        let peers = self.peers.clone();

        tokio::spawn(async move {
            broadcast_block(client.as_ref(), &registry, &peers, &block).await;
        });
    }

    /// Appends a peer's block when it is the next one and its hash checks out
    pub async fn receive_block(&self, block: Block) -> Result<ReceiveOutcome, BlockchainError> {
        let mut ledger = self.blockchain.write().await;
        let index = block.index;

        match ledger.receive_block(block) {
            Ok(()) => Ok(ReceiveOutcome::Accepted),
            Err(err @ BlockchainError::SequenceMismatch { .. }) => {
                info!("Ignored block {}: {}", index, err);
                Ok(ReceiveOutcome::Ignored(err.reason()))
            }
            Err(err @ BlockchainError::HashMismatch { .. }) => {
                warn!("Ignored block {} with tampered or corrupt content: {}", index, err);
                Ok(ReceiveOutcome::Ignored(err.reason()))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, BlockchainError> {
        self.reconciler.reconcile(&self.blockchain).await
    }

    pub async fn chain(&self) -> Vec<Block> {
        self.blockchain.read().await.chain().to_vec()
    }

    pub async fn chain_length(&self) -> usize {
        self.blockchain.read().await.len()
    }

    /// The last `limit` pending transactions
    pub async fn pending(&self, limit: usize) -> Vec<Transaction> {
        self.blockchain.read().await.recent_pending(limit).to_vec()
    }

    pub async fn balance(&self, address: &Address) -> f64 {
        self.blockchain.read().await.balance(address)
    }

    pub async fn find_transactions(&self, address: &Address) -> Vec<TransactionRecord> {
        self.blockchain.read().await.find_transactions(address)
    }

    pub async fn validate_chain(&self) -> bool {
        self.blockchain.read().await.validate_chain()
    }

    pub fn peer_statuses(&self) -> Vec<PeerStatus> {
        self.registry.statuses()
    }

    /// Starts the optional periodic mining and sync loops
    pub fn spawn_timers(&self, mining: Option<Duration>, sync: Option<Duration>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(period) = mining {
            let node = self.clone();
            info!("Mining every {:?}", period);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match node.produce_block().await {
                        Ok(_) => {}
                        Err(BlockchainError::NothingToMine) => debug!("Mining tick: nothing to mine"),
                        Err(err) => warn!("Mining tick failed: {}", err),
                    }
                }
            }));
        }

        if let Some(period) = sync {
            let node = self.clone();
            info!("Syncing with peers every {:?}", period);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(err) = node.reconcile().await {
                        warn!("Sync tick failed: {}", err);
                    }
                }
            }));
        }

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Wallet;
    use crate::network::PeerOutcome;
    use crate::testing::{peer_chain, test_params_with_key, MockPeerClient};

    fn node_with(client: Arc<MockPeerClient>, peers: &[&str], key: &Wallet) -> Node {
        Node::new(
            Blockchain::in_memory(test_params_with_key(key)),
            client,
            peers.iter().map(|p| p.to_string()).collect(),
            "validator".to_string(),
            false,
        )
    }

    async fn mint(node: &Node, key: &Wallet, address: &str, amount: f64) {
        let request = FaucetRequest::signed(
            key,
            &Address::from("open_treasury_001"),
            Address::from(address),
            amount,
        );
        node.faucet_mint(request).await.unwrap();
    }

    async fn wait_for_sends(client: &MockPeerClient, count: usize) -> Vec<(String, u64)> {
        for _ in 0..100 {
            let sent = client.sent_blocks();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        client.sent_blocks()
    }

    #[tokio::test]
    async fn test_produce_block_broadcasts_to_peers() {
        let key = Wallet::new();
        let client = Arc::new(
            MockPeerClient::new()
                .with_chain("http://node2", vec![])
                .with_chain("http://node3", vec![]),
        );
        let node = node_with(client.clone(), &["http://node2", "http://node3"], &key);
        mint(&node, &key, "openAAA", 10.0).await;

        let block = node.produce_block().await.unwrap();

        assert_eq!(block.index, 0);
        assert!(node.pending(20).await.is_empty());
        assert_eq!(node.chain_length().await, 1);

        let mut sent = wait_for_sends(&client, 2).await;
        sent.sort();
        assert_eq!(sent, vec![("http://node2".to_string(), 0), ("http://node3".to_string(), 0)]);
    }

    #[tokio::test]
    async fn test_broadcast_failure_keeps_local_block() {
        let key = Wallet::new();
        let client = Arc::new(MockPeerClient::new().with_chain("http://node3", vec![]));
        let node = node_with(client.clone(), &["http://node2", "http://node3"], &key);
        mint(&node, &key, "openAAA", 10.0).await;

        assert!(node.produce_block().await.is_ok());
        assert_eq!(wait_for_sends(&client, 1).await.len(), 1);
        assert_eq!(node.chain_length().await, 1);

        // The registry is updated once the background broadcast finishes
        for _ in 0..100 {
            if node.peer_statuses()[0].last_outcome.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let statuses = node.peer_statuses();
        assert_eq!(statuses[0].peer, "http://node2");
        assert_eq!(statuses[0].last_outcome, Some(PeerOutcome::Unreachable));
    }

    #[tokio::test]
    async fn test_receive_block_outcomes() {
        let key = Wallet::new();
        let node = node_with(Arc::new(MockPeerClient::new()), &[], &key);
        let chain = peer_chain(2, "node2");

        assert_eq!(
            node.receive_block(chain[1].clone()).await.unwrap(),
            ReceiveOutcome::Ignored("sequence-mismatch")
        );

        let mut forged = chain[0].clone();
        forged.miner = "mallory".to_string();
        assert_eq!(
            node.receive_block(forged).await.unwrap(),
            ReceiveOutcome::Ignored("hash-mismatch")
        );

        assert_eq!(node.receive_block(chain[0].clone()).await.unwrap(), ReceiveOutcome::Accepted);
        assert_eq!(node.receive_block(chain[1].clone()).await.unwrap(), ReceiveOutcome::Accepted);
        assert_eq!(node.chain().await, chain);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_do_not_overspend() {
        let key = Wallet::new();
        let node = node_with(Arc::new(MockPeerClient::new()), &[], &key);
        let alice = Wallet::new();
        mint(&node, &key, alice.address().as_str(), 100.0).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let node = node.clone();
            let mut tx = Transaction::new(alice.address().clone(), Address::from("openbob"), 30.0);
            tx.timestamp += i as f64;
            tx.sign(&alice).unwrap();
            handles.push(tokio::spawn(async move { node.submit_transaction(tx).await.is_ok() }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 3);
        assert!((node.balance(alice.address()).await - 10.0).abs() < 1e-9);
        assert_eq!(node.pending(20).await.len(), 4);
    }

    #[tokio::test]
    async fn test_reconcile_through_node() {
        let key = Wallet::new();
        let client = Arc::new(MockPeerClient::new().with_chain("http://node2", peer_chain(3, "node2")));
        let node = node_with(client, &["http://node2"], &key);

        let report = node.reconcile().await.unwrap();

        assert!(report.replaced);
        assert_eq!(report.length, 3);
        assert!(node.validate_chain().await);
        assert_eq!(node.peer_statuses()[0].chain_length, Some(3));
    }
}
