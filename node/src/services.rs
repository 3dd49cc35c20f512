//! Collaborator seams the ingestion pipeline calls across.
//!
//! Persistence, coin validation, signatures, contract execution and the
//! protocol-version registry are other subsystems; the pipeline only sees
//! these traits. [`crate::memory`] provides in-memory implementations for
//! wiring and tests.

use std::sync::Arc;

use thiserror::Error;
use vela_types::{Block, BlockHash, BlockHeader, Transaction, TxKind};

/// Failures surfaced by a collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("coin validation failed: {0}")]
    Ledger(String),

    #[error("conflicting transactions: {0}")]
    Conflict(String),

    #[error("contract execution failed: {0}")]
    Contract(String),

    #[error("malformed block: {0}")]
    Malformed(String),
}

/// Block persistence and relay.
pub trait BlockService: Send + Sync {
    fn save_block(&self, block: &Block) -> Result<(), ServiceError>;
    fn rollback_block(&self, block: &Block) -> Result<(), ServiceError>;
    fn get_block(&self, hash: &BlockHash) -> Option<Block>;

    /// Highest block currently persisted, if any. A restarting node
    /// resumes its master chain from here.
    fn get_best_block(&self) -> Option<Block>;

    /// Relay an accepted block to peers. Only called for blocks that
    /// arrived live from a peer, never during bulk download.
    fn forward_block(&self, hash: &BlockHash);
}

/// Coin-level validation against the ledger.
pub trait LedgerService: Send + Sync {
    /// Evidence bytes if the block spends an output the ledger already
    /// saw spent, `None` when clean.
    fn double_spend_evidence(&self, block: &Block) -> Option<Vec<u8>>;

    /// Validate every non-system transaction's coin data, accumulating
    /// intra-block spends so a block cannot double-spend against itself.
    fn verify_block_coins(&self, block: &Block) -> Result<(), ServiceError>;
}

/// Signature verification and cross-transaction conflict detection for
/// user transactions.
pub trait TransactionService: Send + Sync {
    fn verify_signature(&self, tx: &Transaction) -> bool;

    /// Detect transactions within one block that conflict with each other
    /// (duplicate hashes, two withdrawals of the same deposit, two stops
    /// of the same agent). Distinct from ledger-wide double-spend checks.
    fn conflict_detect(&self, txs: &[Transaction]) -> Result<(), ServiceError>;
}

/// Structural block verification and equivocation tracking.
pub trait VerificationService: Send + Sync {
    /// Check the block's internal shape before any chain-state work:
    /// header fields, transaction-list limits, hash integrity.
    fn verify_structure(&self, block: &Block) -> Result<(), ServiceError>;

    /// Evidence bytes if this header's packer already produced a
    /// different block for the same height and slot, `None` otherwise.
    /// Implementations record the header as a side effect so the second
    /// signing is caught.
    fn bifurcation_evidence(&self, header: &BlockHeader) -> Option<Vec<u8>>;
}

/// Smart-contract execution hook. Implementations replay the block's
/// contract transactions and check the resulting state root themselves.
pub trait ContractService: Send + Sync {
    fn execute_block(&self, block: &Block) -> Result<(), ServiceError>;
}

/// Protocol versioning: which version is active and which transaction
/// kinds a given version admits.
pub trait ProtocolRegistry: Send + Sync {
    /// The protocol version this node runs. Blocks declaring an older
    /// version are dropped.
    fn active_version(&self) -> u32;

    fn supports(&self, version: u32, kind: TxKind) -> bool;
}

/// The collaborator bundle threaded through the pipeline.
pub struct Services {
    pub blocks: Arc<dyn BlockService>,
    pub ledger: Arc<dyn LedgerService>,
    pub txs: Arc<dyn TransactionService>,
    pub verification: Arc<dyn VerificationService>,
    pub contracts: Arc<dyn ContractService>,
    pub protocol: Arc<dyn ProtocolRegistry>,
}

impl Clone for Services {
    fn clone(&self) -> Self {
        Self {
            blocks: Arc::clone(&self.blocks),
            ledger: Arc::clone(&self.ledger),
            txs: Arc::clone(&self.txs),
            verification: Arc::clone(&self.verification),
            contracts: Arc::clone(&self.contracts),
            protocol: Arc::clone(&self.protocol),
        }
    }
}
