use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use super::peer::{PeerClient, PeerError, PeerOutcome, PeerRegistry};
use crate::blockchain::{Block, Blockchain, BlockchainError};

/// What one peer contributed to a reconciliation round
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PeerReport {
    pub peer: String,
    pub outcome: PeerOutcome,
    pub chain_length: Option<usize>,
}

/// Result of [`ChainReconciler::reconcile`]
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReconcileReport {
    /// Local chain length after the round
    pub length: usize,
    pub replaced: bool,
    /// Peer whose chain was adopted
    pub source: Option<String>,
    pub peers: Vec<PeerReport>,
}

/// Sends `block` to every peer concurrently.
///
/// Failures are logged and recorded, never returned.
pub async fn broadcast_block(
    client: &dyn PeerClient,
    registry: &PeerRegistry,
    peers: &[String],
    block: &Block,
) -> Vec<(String, PeerOutcome)> {
    let sends = peers.iter().map(|peer| async move {
        let result = client.send_block(peer, block).await;
        (peer.clone(), result)
    });

    join_all(sends)
        .await
        .into_iter()
        .map(|(peer, result)| match result {
            Ok(()) => {
                debug!("Sent block {} to {}", block.index, peer);
                registry.record_success(&peer, None);
                (peer, PeerOutcome::Ok)
            }
            Err(err) => {
                warn!("Broadcast of block {} failed: {}", block.index, err);
                registry.record_failure(&peer, &err);
                let outcome = PeerOutcome::from(&err);
                (peer, outcome)
            }
        })
        .collect()
}

/// Longest-chain reconciliation against the configured peers.
///
/// Chains are fetched without holding the ledger lock; the write lock is
/// only taken to swap in the winner. Ties keep the local chain, and between
/// peers of equal length the one listed first wins.
#[derive(Clone)]
pub struct ChainReconciler {
    client: Arc<dyn PeerClient>,
    registry: Arc<PeerRegistry>,
    peers: Vec<String>,
    verify: bool,
}

impl ChainReconciler {
    /// # Arguments
    ///
    /// * `verify` - Check index and hash of every block before adopting a chain
    pub fn new(
        client: Arc<dyn PeerClient>,
        registry: Arc<PeerRegistry>,
        peers: Vec<String>,
        verify: bool,
    ) -> Self {
        ChainReconciler {
            client,
            registry,
            peers,
            verify,
        }
    }

    async fn fetch_all(&self) -> Vec<(String, Result<Vec<Block>, PeerError>)> {
        let fetches = self.peers.iter().map(|peer| async move {
            let result = self.client.fetch_chain(peer).await;
            (peer.clone(), result)
        });

        join_all(fetches).await
    }

    pub async fn reconcile(&self, ledger: &RwLock<Blockchain>) -> Result<ReconcileReport, BlockchainError> {
        let local_length = ledger.read().await.len();

        let mut reports = Vec::with_capacity(self.peers.len());
        let mut candidates: Vec<(String, Vec<Block>)> = Vec::new();

        for (peer, result) in self.fetch_all().await {
            match result {
                Ok(chain) => {
                    debug!("Peer {} reports chain length {}", peer, chain.len());
                    self.registry.record_success(&peer, Some(chain.len()));
                    reports.push(PeerReport {
                        peer: peer.clone(),
                        outcome: PeerOutcome::Ok,
                        chain_length: Some(chain.len()),
                    });

                    if chain.len() > local_length {
                        candidates.push((peer, chain));
                    }
                }
                Err(err) => {
                    warn!("Skipping peer during sync: {}", err);
                    self.registry.record_failure(&peer, &err);
                    reports.push(PeerReport {
                        peer,
                        outcome: PeerOutcome::from(&err),
                        chain_length: None,
                    });
                }
            }
        }

        // Stable sort: equal lengths stay in configured peer order
        candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut ledger = ledger.write().await;
        let mut source = None;

        for (peer, chain) in candidates {
            match ledger.adopt_chain(chain, self.verify) {
                Ok(true) => {
                    info!("Adopted chain of length {} from {}", ledger.len(), peer);
                    source = Some(peer);
                    break;
                }
                // Local chain grew while we were fetching
                Ok(false) => break,
                Err(BlockchainError::InvalidChain(reason)) => {
                    warn!("Rejected chain from {}: {}", peer, reason);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(ReconcileReport {
            length: ledger.len(),
            replaced: source.is_some(),
            source,
            peers: reports,
        })
    }
}
