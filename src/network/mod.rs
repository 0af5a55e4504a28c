// Network module
//
// Peer communication: the HTTP peer client, per-peer health tracking,
// best-effort block broadcast and longest-chain reconciliation.

pub mod peer;
pub mod sync;

pub use peer::{HttpPeerClient, PeerClient, PeerError, PeerOutcome, PeerRegistry, PeerStatus};
pub use sync::{broadcast_block, ChainReconciler, ReconcileReport};
