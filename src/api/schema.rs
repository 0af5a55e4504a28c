use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::transaction::TransactionError;
use crate::blockchain::{Address, Block, BlockchainError, FaucetRequest, Transaction, TransactionKind};
use crate::network::sync::{PeerReport, ReconcileReport};

pub const DEFAULT_PENDING_LIMIT: usize = 20;

fn require<T>(value: Option<T>, field: &str) -> Result<T, TransactionError> {
    value.ok_or_else(|| TransactionError::Malformed(format!("missing {}", field)))
}

/// Request body for submitting a signed transfer
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub amount: Option<f64>,
    /// Unix seconds the client signed at
    pub timestamp: Option<f64>,
    /// Hex Ed25519 signature over `sender:receiver:amount:timestamp`
    pub signature: Option<String>,
    /// Hex Ed25519 public key of the sender
    pub pubkey: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
}

impl TransactionRequest {
    /// Rejects missing fields before the request reaches admission
    pub fn into_transaction(self) -> Result<Transaction, TransactionError> {
        Ok(Transaction {
            sender: Address(require(self.sender, "sender")?),
            receiver: Address(require(self.receiver, "receiver")?),
            amount: require(self.amount, "amount")?,
            timestamp: require(self.timestamp, "timestamp")?,
            signature: require(self.signature, "signature")?,
            public_key: require(self.pubkey, "pubkey")?,
            kind: self.kind.unwrap_or_default(),
        })
    }
}

impl From<&Transaction> for TransactionRequest {
    fn from(tx: &Transaction) -> Self {
        TransactionRequest {
            sender: Some(tx.sender.0.clone()),
            receiver: Some(tx.receiver.0.clone()),
            amount: Some(tx.amount),
            timestamp: Some(tx.timestamp),
            signature: Some(tx.signature.clone()),
            pubkey: Some(tx.public_key.clone()),
            kind: Some(tx.kind),
        }
    }
}

/// Request body for a treasury mint
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct FaucetRequestBody {
    pub address: Option<String>,
    pub amount: Option<f64>,
    pub timestamp: Option<f64>,
    /// Treasury signature over `treasury:address:amount:timestamp`
    pub signature: Option<String>,
    pub pubkey: Option<String>,
}

impl FaucetRequestBody {
    pub fn into_request(self) -> Result<FaucetRequest, TransactionError> {
        Ok(FaucetRequest {
            address: Address(require(self.address, "address")?),
            amount: require(self.amount, "amount")?,
            timestamp: require(self.timestamp, "timestamp")?,
            signature: require(self.signature, "signature")?,
            public_key: require(self.pubkey, "pubkey")?,
        })
    }
}

impl From<&FaucetRequest> for FaucetRequestBody {
    fn from(request: &FaucetRequest) -> Self {
        FaucetRequestBody {
            address: Some(request.address.0.clone()),
            amount: Some(request.amount),
            timestamp: Some(request.timestamp),
            signature: Some(request.signature.clone()),
            pubkey: Some(request.public_key.clone()),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PendingQuery {
    /// How many of the most recent pending transactions to return (default 20)
    pub limit: Option<usize>,
}

/// Response for an accepted transfer or a granted mint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// `accepted` for transfers, `granted` for faucet mints
    pub status: String,
    pub transaction: Transaction,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub status: String,
    pub block: Block,
}

/// Response to a pushed block
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReceiveResponse {
    /// `accepted` or `ignored`
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    pub status: String,
    /// Local chain length after the sync
    pub length: usize,
    pub replaced: bool,
    pub source: Option<String>,
    pub peers: Vec<PeerReport>,
}

impl From<ReconcileReport> for SyncResponse {
    fn from(report: ReconcileReport) -> Self {
        SyncResponse {
            status: "synced".to_string(),
            length: report.length,
            replaced: report.replaced,
            source: report.source,
            peers: report.peers,
        }
    }
}

/// Node role and the most recent pending transactions
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingResponse {
    pub role: String,
    pub data: Vec<Transaction>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

/// Body of every rejected operation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RejectionResponse {
    pub status: String,
    /// Machine readable code, e.g. `bad-signature`
    pub reason: String,
    pub error: String,
}

impl RejectionResponse {
    pub fn new(reason: &str, error: impl ToString) -> Self {
        RejectionResponse {
            status: "rejected".to_string(),
            reason: reason.to_string(),
            error: error.to_string(),
        }
    }
}

impl From<&BlockchainError> for RejectionResponse {
    fn from(err: &BlockchainError) -> Self {
        RejectionResponse::new(err.reason(), err)
    }
}

/// HTTP status for a rejection code
pub fn status_for(reason: &str) -> StatusCode {
    match reason {
        "bad-signature" => StatusCode::UNAUTHORIZED,
        "insufficient-funds" | "insufficient-treasury-funds" => StatusCode::FORBIDDEN,
        "duplicate" => StatusCode::CONFLICT,
        "storage" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}
