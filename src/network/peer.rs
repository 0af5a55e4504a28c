use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::blockchain::Block;

/// Errors that can occur while talking to a peer
#[derive(Debug, Clone, Error)]
pub enum PeerError {
    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("Peer {peer} timed out")]
    Timeout { peer: String },

    #[error("Peer {peer} sent a bad response: {reason}")]
    BadResponse { peer: String, reason: String },

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Result of the latest exchange with a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PeerOutcome {
    Ok,
    Unreachable,
    Timeout,
    BadResponse,
}

impl From<&PeerError> for PeerOutcome {
    fn from(err: &PeerError) -> Self {
        match err {
            PeerError::Unreachable { .. } | PeerError::Client(_) => PeerOutcome::Unreachable,
            PeerError::Timeout { .. } => PeerOutcome::Timeout,
            PeerError::BadResponse { .. } => PeerOutcome::BadResponse,
        }
    }
}

/// Outbound calls a node makes to its peers
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Pushes a freshly produced block to `peer`
    async fn send_block(&self, peer: &str, block: &Block) -> Result<(), PeerError>;

    /// Downloads the full chain held by `peer`
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError>;
}

/// [`PeerClient`] over the peers' HTTP API.
///
/// Peers are base URLs such as `http://10.0.0.2:8000`; every call is bounded
/// by the client timeout.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PeerError::Client(e.to_string()))?;

        Ok(HttpPeerClient { client })
    }

    fn endpoint(peer: &str, path: &str) -> String {
        format!("{}/api/v1/{}", peer.trim_end_matches('/'), path)
    }
}

fn classify(peer: &str, err: reqwest::Error) -> PeerError {
    if err.is_timeout() {
        PeerError::Timeout {
            peer: peer.to_string(),
        }
    } else if err.is_decode() {
        PeerError::BadResponse {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    } else {
        PeerError::Unreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }
}

fn check_status(peer: &str, response: &reqwest::Response) -> Result<(), PeerError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(PeerError::BadResponse {
            peer: peer.to_string(),
            reason: format!("HTTP {}", status),
        })
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn send_block(&self, peer: &str, block: &Block) -> Result<(), PeerError> {
        let response = self
            .client
            .post(Self::endpoint(peer, "receive_block"))
            .json(block)
            .send()
            .await
            .map_err(|e| classify(peer, e))?;

        check_status(peer, &response)
    }

    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
        let response = self
            .client
            .get(Self::endpoint(peer, "chain"))
            .send()
            .await
            .map_err(|e| classify(peer, e))?;

        check_status(peer, &response)?;

        response
            .json::<Vec<Block>>()
            .await
            .map_err(|e| classify(peer, e))
    }
}

/// Health of one configured peer
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PeerStatus {
    pub peer: String,

    /// `None` until the peer has been contacted
    pub last_outcome: Option<PeerOutcome>,

    /// Consecutive failed exchanges
    pub failures: u64,

    /// Last successful exchange
    #[schema(value_type = Option<String>)]
    pub last_seen: Option<DateTime<Utc>>,

    /// Chain length the peer reported on its last fetch
    pub chain_length: Option<usize>,
}

impl PeerStatus {
    fn new(peer: &str) -> Self {
        PeerStatus {
            peer: peer.to_string(),
            last_outcome: None,
            failures: 0,
            last_seen: None,
            chain_length: None,
        }
    }
}

/// Per-peer health shared between request handlers and background sync
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashMap<String, PeerStatus>,
}

impl PeerRegistry {
    pub fn new(peers: &[String]) -> Self {
        let registry = PeerRegistry::default();
        for peer in peers {
            registry
                .peers
                .insert(peer.clone(), PeerStatus::new(peer));
        }
        registry
    }

    /// Records a successful exchange, with the chain length when one was fetched
    pub fn record_success(&self, peer: &str, chain_length: Option<usize>) {
        let mut status = self
            .peers
            .entry(peer.to_string())
            .or_insert_with(|| PeerStatus::new(peer));

        status.last_outcome = Some(PeerOutcome::Ok);
        status.failures = 0;
        status.last_seen = Some(Utc::now());
        if chain_length.is_some() {
            status.chain_length = chain_length;
        }
    }

    pub fn record_failure(&self, peer: &str, err: &PeerError) {
        let mut status = self
            .peers
            .entry(peer.to_string())
            .or_insert_with(|| PeerStatus::new(peer));

        status.last_outcome = Some(PeerOutcome::from(err));
        status.failures += 1;
    }

    pub fn get(&self, peer: &str) -> Option<PeerStatus> {
        self.peers.get(peer).map(|status| status.clone())
    }

    /// All peers, ordered by address
    pub fn statuses(&self) -> Vec<PeerStatus> {
        let mut statuses: Vec<PeerStatus> = self
            .peers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        statuses.sort_by(|a, b| a.peer.cmp(&b.peer));
        statuses
    }
}
