use actix_web::{web, HttpResponse, Responder};

use super::schema::{
    status_for, BalanceResponse, FaucetRequestBody, MineResponse, PendingQuery, PendingResponse,
    ReceiveResponse, RejectionResponse, SyncResponse, TransactionRequest, TransactionResponse,
    DEFAULT_PENDING_LIMIT,
};
use crate::blockchain::chain::TransactionRecord;
use crate::blockchain::{Address, Block, BlockchainError, Transaction};
use crate::network::PeerStatus;
use crate::node::{Node, ReceiveOutcome};

/// Shared node handle
pub type NodeData = web::Data<Node>;

fn reject(err: BlockchainError) -> HttpResponse {
    let body = RejectionResponse::from(&err);
    HttpResponse::build(status_for(&body.reason)).json(body)
}

/// Submit a signed transfer
///
/// Validates structure, signature and funds, applies the transfer with its
/// fee split and queues it for the next block
#[utoipa::path(
    post,
    path = "/api/v1/tx",
    request_body = TransactionRequest,
    responses(
        (status = 200, description = "Transaction accepted", body = TransactionResponse),
        (status = 400, description = "Malformed transaction", body = RejectionResponse),
        (status = 401, description = "Signature does not match sender", body = RejectionResponse),
        (status = 403, description = "Insufficient funds", body = RejectionResponse),
        (status = 409, description = "Transaction already submitted", body = RejectionResponse),
        (status = 500, description = "Ledger could not be persisted", body = RejectionResponse)
    )
)]
pub async fn submit_transaction(node: NodeData, request: web::Json<TransactionRequest>) -> impl Responder {
    let transaction = match request.into_inner().into_transaction() {
        Ok(transaction) => transaction,
        Err(err) => return reject(err.into()),
    };

    match node.submit_transaction(transaction).await {
        Ok(transaction) => HttpResponse::Ok().json(TransactionResponse {
            status: "accepted".to_string(),
            transaction,
        }),
        Err(err) => reject(err),
    }
}

/// Mine a block
///
/// Seals every pending transaction into the next block and broadcasts it to
/// peers in the background
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    responses(
        (status = 200, description = "Block mined", body = MineResponse),
        (status = 400, description = "Nothing to mine", body = RejectionResponse),
        (status = 500, description = "Ledger could not be persisted", body = RejectionResponse)
    )
)]
pub async fn mine_block(node: NodeData) -> impl Responder {
    match node.produce_block().await {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            status: "mined".to_string(),
            block,
        }),
        Err(err) => reject(err),
    }
}

/// Accept a block from a peer
///
/// Only the next index with a matching content hash is appended; anything
/// else is ignored
#[utoipa::path(
    post,
    path = "/api/v1/receive_block",
    request_body = Block,
    responses(
        (status = 200, description = "Block accepted or ignored", body = ReceiveResponse),
        (status = 400, description = "No block data", body = RejectionResponse),
        (status = 500, description = "Ledger could not be persisted", body = RejectionResponse)
    )
)]
pub async fn receive_block(node: NodeData, block: Option<web::Json<Block>>) -> impl Responder {
    let block = match block {
        Some(block) => block.into_inner(),
        None => {
            return HttpResponse::BadRequest().json(RejectionResponse::new("malformed", "No block data"));
        }
    };

    match node.receive_block(block).await {
        Ok(ReceiveOutcome::Accepted) => HttpResponse::Ok().json(ReceiveResponse {
            status: "accepted".to_string(),
            reason: None,
        }),
        Ok(ReceiveOutcome::Ignored(reason)) => HttpResponse::Ok().json(ReceiveResponse {
            status: "ignored".to_string(),
            reason: Some(reason.to_string()),
        }),
        Err(err) => reject(err),
    }
}

/// Sync with peers
///
/// Fetches every peer's chain and adopts the longest one if it beats the
/// local chain
#[utoipa::path(
    post,
    path = "/api/v1/fullsync",
    responses(
        (status = 200, description = "Sync finished", body = SyncResponse),
        (status = 500, description = "Ledger could not be persisted", body = RejectionResponse)
    )
)]
pub async fn full_sync(node: NodeData) -> impl Responder {
    match node.reconcile().await {
        Ok(report) => HttpResponse::Ok().json(SyncResponse::from(report)),
        Err(err) => reject(err),
    }
}

/// Get the full chain
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Every block, oldest first", body = Vec<Block>)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.chain().await)
}

/// Get recent pending transactions
#[utoipa::path(
    get,
    path = "/api/v1/index",
    params(PendingQuery),
    responses(
        (status = 200, description = "Node role and pending transactions", body = PendingResponse)
    )
)]
pub async fn get_pending(node: NodeData, query: web::Query<PendingQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_PENDING_LIMIT);

    HttpResponse::Ok().json(PendingResponse {
        role: node.role().to_string(),
        data: node.pending(limit).await,
    })
}

/// Get an account balance
///
/// Unknown addresses have a balance of zero
#[utoipa::path(
    get,
    path = "/api/v1/balance/{address}",
    params(("address" = String, Path, description = "Account address")),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse)
    )
)]
pub async fn get_balance(node: NodeData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = node.balance(&address).await;

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

/// List transactions touching an address
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{address}",
    params(("address" = String, Path, description = "Account address")),
    responses(
        (status = 200, description = "Sealed transactions first, then pending", body = Vec<TransactionRecord>)
    )
)]
pub async fn get_transactions(node: NodeData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    HttpResponse::Ok().json(node.find_transactions(&address).await)
}

/// Mint from the treasury
///
/// Requires a signature from the configured treasury key
#[utoipa::path(
    post,
    path = "/api/v1/faucet",
    request_body = FaucetRequestBody,
    responses(
        (status = 200, description = "Mint granted", body = TransactionResponse),
        (status = 400, description = "Malformed request", body = RejectionResponse),
        (status = 401, description = "Not signed by the treasury key", body = RejectionResponse),
        (status = 403, description = "Insufficient treasury funds", body = RejectionResponse),
        (status = 409, description = "Request already granted", body = RejectionResponse),
        (status = 500, description = "Ledger could not be persisted", body = RejectionResponse)
    )
)]
pub async fn faucet(node: NodeData, request: web::Json<FaucetRequestBody>) -> impl Responder {
    let request = match request.into_inner().into_request() {
        Ok(request) => request,
        Err(err) => return reject(err.into()),
    };

    match node.faucet_mint(request).await {
        Ok(transaction) => HttpResponse::Ok().json(TransactionResponse {
            status: "granted".to_string(),
            transaction,
        }),
        Err(err) => reject(err),
    }
}

/// Check the local chain
///
/// Every block must sit at its index and carry its own content hash
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.validate_chain().await)
}

/// Peer health
#[utoipa::path(
    get,
    path = "/api/v1/peers",
    responses(
        (status = 200, description = "Last outcome per configured peer", body = Vec<PeerStatus>)
    )
)]
pub async fn get_peers(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.peer_statuses())
}
