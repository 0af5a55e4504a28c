use std::mem;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::account::{AccountError, LedgerState};
use super::admission::{self, FeeSchedule};
use super::block::Block;
use super::crypto::Address;
use super::faucet::{self, FaucetRequest, Treasury};
use super::storage::{MemoryStorage, SnapshotView, Storage, StorageError};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Account error: {0}")]
    AccountError(#[from] AccountError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Nothing to mine")]
    NothingToMine,

    #[error("Block index mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("Block hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: String, got: String },

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

impl BlockchainError {
    /// Stable machine readable rejection code
    pub fn reason(&self) -> &'static str {
        match self {
            BlockchainError::TransactionError(TransactionError::Unauthorized(_)) => "bad-signature",
            BlockchainError::TransactionError(TransactionError::Duplicate(_)) => "duplicate",
            BlockchainError::TransactionError(_) => "malformed",
            BlockchainError::AccountError(AccountError::InsufficientFunds { .. }) => "insufficient-funds",
            BlockchainError::AccountError(AccountError::InsufficientTreasury { .. }) => {
                "insufficient-treasury-funds"
            }
            BlockchainError::AccountError(AccountError::InvalidAmount(_)) => "malformed",
            BlockchainError::StorageError(_) => "storage",
            BlockchainError::NothingToMine => "nothing-to-mine",
            BlockchainError::SequenceMismatch { .. } => "sequence-mismatch",
            BlockchainError::HashMismatch { .. } => "hash-mismatch",
            BlockchainError::InvalidChain(_) => "invalid-chain",
        }
    }
}

/// Values fixed at process start that shape every ledger decision
#[derive(Debug, Clone)]
pub struct LedgerParams {
    /// Identifier written as `miner` on produced blocks
    pub node_id: String,
    pub fees: FeeSchedule,
    pub treasury: Treasury,
    pub genesis_supply: f64,
}

/// Where a transaction was found by [`Blockchain::find_transactions`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionRecord {
    /// Index of the sealing block, `None` while pending
    pub block_index: Option<u64>,
    pub transaction: Transaction,
}

/// The ledger state object: chain, pending set and balances.
///
/// Every mutating method persists the would-be state first and only then
/// makes it visible, so a failed write leaves the ledger exactly as it was.
/// Callers serialize access; see [`crate::node::Node`].
#[derive(Debug)]
pub struct Blockchain {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    state: LedgerState,
    params: LedgerParams,
    storage: Box<dyn Storage>,
}

impl Blockchain {
    /// Opens the ledger from storage, or starts from genesis
    ///
    /// # Arguments
    ///
    /// * `params` - Node identity, fee schedule and treasury
    /// * `storage` - Durable home of the snapshot
    ///
    /// # Returns
    ///
    /// The restored ledger, or a fresh one whose treasury holds the genesis supply
    pub fn open(params: LedgerParams, storage: Box<dyn Storage>) -> Result<Self, BlockchainError> {
        match storage.load()? {
            Some(snapshot) => {
                info!(
                    "Loaded ledger from storage: {} blocks, {} pending, {} accounts",
                    snapshot.chain.len(),
                    snapshot.pending.len(),
                    snapshot.balances.len()
                );

                Ok(Blockchain {
                    chain: snapshot.chain,
                    pending: snapshot.pending,
                    state: LedgerState::from_balances(snapshot.balances),
                    params,
                    storage,
                })
            }
            None => {
                info!(
                    "No ledger found in storage, seeding treasury {} with {}",
                    params.treasury.address, params.genesis_supply
                );

                let blockchain = Self::genesis(params, storage);
                blockchain.save(&blockchain.state)?;
                Ok(blockchain)
            }
        }
    }

    /// A fresh ledger kept only in memory
    pub fn in_memory(params: LedgerParams) -> Self {
        Self::genesis(params, Box::new(MemoryStorage::new()))
    }

    fn genesis(params: LedgerParams, storage: Box<dyn Storage>) -> Self {
        let state = LedgerState::with_genesis(&params.treasury.address, params.genesis_supply);
        Blockchain {
            chain: Vec::new(),
            pending: Vec::new(),
            state,
            params,
            storage,
        }
    }

    fn save(&self, state: &LedgerState) -> Result<(), StorageError> {
        self.storage.save(&SnapshotView {
            chain: &self.chain,
            pending: &self.pending,
            balances: state.balances(),
        })
    }

    /// Admits a signed transfer and appends it to the pending set
    ///
    /// # Arguments
    ///
    /// * `transaction` - The signed transfer
    ///
    /// # Returns
    ///
    /// The accepted transaction, or the rejection with balances untouched
    pub fn submit_transaction(&mut self, transaction: Transaction) -> Result<Transaction, BlockchainError> {
        let mut state = self.state.clone();
        let split = admission::admit_transfer(&mut state, &transaction, &self.params.fees)?;
        self.reject_replay(&transaction)?;

        self.commit_pending(state, transaction.clone())?;

        info!(
            "Accepted transaction {}: {} -> {} amount {} (fee {})",
            transaction.hash(),
            transaction.sender,
            transaction.receiver,
            transaction.amount,
            split.fee
        );
        Ok(transaction)
    }

    /// Mints treasury funds to an address; the mint joins the pending set
    pub fn faucet_mint(&mut self, request: FaucetRequest) -> Result<Transaction, BlockchainError> {
        let mut state = self.state.clone();
        let transaction = faucet::mint(&mut state, request, &self.params.treasury)?;
        self.reject_replay(&transaction)?;

        self.commit_pending(state, transaction.clone())?;

        info!(
            "Faucet granted {} to {}",
            transaction.amount, transaction.receiver
        );
        Ok(transaction)
    }

    /// A signed record is admitted at most once: it must not already be
    /// pending or sealed in a block
    fn reject_replay(&self, transaction: &Transaction) -> Result<(), TransactionError> {
        let hash = transaction.hash();
        let known = self
            .pending
            .iter()
            .chain(self.chain.iter().flat_map(|block| block.transactions.iter()))
            .any(|tx| tx.hash() == hash);

        if known {
            return Err(TransactionError::Duplicate(hash));
        }
        Ok(())
    }

    fn commit_pending(&mut self, state: LedgerState, transaction: Transaction) -> Result<(), BlockchainError> {
        self.pending.push(transaction);
        if let Err(err) = self.save(&state) {
            self.pending.pop();
            return Err(err.into());
        }

        self.state = state;
        Ok(())
    }

    /// Seals every pending transaction into the next block
    ///
    /// # Returns
    ///
    /// The appended block, or `NothingToMine` when the pending set is empty
    pub fn produce_block(&mut self) -> Result<Block, BlockchainError> {
        if self.pending.is_empty() {
            return Err(BlockchainError::NothingToMine);
        }

        let block = Block::new(
            self.chain.len() as u64,
            self.pending.clone(),
            self.params.node_id.clone(),
        );

        let pending = mem::take(&mut self.pending);
        self.chain.push(block.clone());

        if let Err(err) = self.save(&self.state) {
            self.chain.pop();
            self.pending = pending;
            return Err(err.into());
        }

        info!(
            "Mined block {} with {} transactions, hash {}",
            block.index,
            block.transactions.len(),
            block.hash
        );
        Ok(block)
    }

    /// Appends a block produced elsewhere.
    ///
    /// Only the next index is accepted and the declared hash must match the
    /// content. Balances are not replayed; the pending set is cleared.
    pub fn receive_block(&mut self, block: Block) -> Result<(), BlockchainError> {
        let expected = self.chain.len() as u64;
        if block.index != expected {
            return Err(BlockchainError::SequenceMismatch {
                expected,
                got: block.index,
            });
        }

        let computed = block.calculate_hash();
        if computed != block.hash {
            return Err(BlockchainError::HashMismatch {
                expected: computed,
                got: block.hash,
            });
        }

        let index = block.index;
        let miner = block.miner.clone();
        let pending = mem::take(&mut self.pending);
        self.chain.push(block);

        if let Err(err) = self.save(&self.state) {
            self.chain.pop();
            self.pending = pending;
            return Err(err.into());
        }

        info!("Accepted block {} from {}", index, miner);
        Ok(())
    }

    /// Replaces the chain wholesale when `candidate` is strictly longer.
    ///
    /// With `verify` unset the candidate is taken as-is, internal hashes
    /// included. Returns whether the chain was replaced.
    pub fn adopt_chain(&mut self, candidate: Vec<Block>, verify: bool) -> Result<bool, BlockchainError> {
        if candidate.len() <= self.chain.len() {
            return Ok(false);
        }

        if verify {
            validate_blocks(&candidate)?;
        }

        let length = candidate.len();
        let previous_chain = mem::replace(&mut self.chain, candidate);
        let previous_pending = mem::take(&mut self.pending);

        if let Err(err) = self.save(&self.state) {
            self.chain = previous_chain;
            self.pending = previous_pending;
            return Err(err.into());
        }

        info!(
            "Adopted peer chain: length {} -> {}",
            previous_chain.len(),
            length
        );
        Ok(true)
    }

    /// Whether every local block sits at its index and carries its own hash
    pub fn validate_chain(&self) -> bool {
        match validate_blocks(&self.chain) {
            Ok(()) => true,
            Err(err) => {
                warn!("Local chain failed validation: {}", err);
                false
            }
        }
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// The last `limit` pending transactions, oldest first
    pub fn recent_pending(&self, limit: usize) -> &[Transaction] {
        let start = self.pending.len().saturating_sub(limit);
        &self.pending[start..]
    }

    pub fn balance(&self, address: &Address) -> f64 {
        self.state.balance(address)
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    /// Every transaction touching `address`, sealed blocks first, then pending
    pub fn find_transactions(&self, address: &Address) -> Vec<TransactionRecord> {
        let sealed = self.chain.iter().flat_map(move |block| {
            block
                .transactions
                .iter()
                .filter(move |tx| tx.involves(address))
                .map(move |tx| TransactionRecord {
                    block_index: Some(block.index),
                    transaction: tx.clone(),
                })
        });

        let pending = self
            .pending
            .iter()
            .filter(|tx| tx.involves(address))
            .map(|tx| TransactionRecord {
                block_index: None,
                transaction: tx.clone(),
            });

        sealed.chain(pending).collect()
    }
}

/// Checks that each block sits at its position and carries its own content hash
pub fn validate_blocks(blocks: &[Block]) -> Result<(), BlockchainError> {
    for (position, block) in blocks.iter().enumerate() {
        if block.index != position as u64 {
            return Err(BlockchainError::InvalidChain(format!(
                "block at position {} declares index {}",
                position, block.index
            )));
        }

        if !block.has_valid_hash() {
            return Err(BlockchainError::InvalidChain(format!(
                "block {} has a hash that does not match its content",
                block.index
            )));
        }
    }

    Ok(())
}
