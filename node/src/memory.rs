//! In-memory collaborator implementations.
//!
//! Enough to run a node without external subsystems: tests and local
//! development wire these in, deployments substitute real services.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use vela_types::{Address, Block, BlockHash, BlockHeader, Transaction, TxHash, TxKind, TxPayload};

use crate::services::{
    BlockService, ContractService, LedgerService, ProtocolRegistry, ServiceError,
    TransactionService, VerificationService,
};

/// Blocks persisted into a hash map.
#[derive(Default)]
pub struct MemoryBlockStore {
    saved: Mutex<HashMap<BlockHash, Block>>,
    forwarded: Mutex<Vec<BlockHash>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.saved.lock().map(|s| s.contains_key(hash)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.saved.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hashes handed to `forward_block`, in relay order.
    pub fn forwarded(&self) -> Vec<BlockHash> {
        self.forwarded.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl BlockService for MemoryBlockStore {
    fn save_block(&self, block: &Block) -> Result<(), ServiceError> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| ServiceError::Storage("store lock poisoned".into()))?;
        saved.insert(block.hash(), block.clone());
        Ok(())
    }

    fn rollback_block(&self, block: &Block) -> Result<(), ServiceError> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| ServiceError::Storage("store lock poisoned".into()))?;
        saved.remove(&block.hash());
        Ok(())
    }

    fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        self.saved.lock().ok()?.get(hash).cloned()
    }

    fn get_best_block(&self) -> Option<Block> {
        let saved = self.saved.lock().ok()?;
        saved.values().max_by_key(|b| b.height()).cloned()
    }

    fn forward_block(&self, hash: &BlockHash) {
        if let Ok(mut forwarded) = self.forwarded.lock() {
            forwarded.push(*hash);
        }
    }
}

/// Ledger that tracks spent outputs and flags repeats as double spends.
///
/// Tests can pre-flag a transaction hash to simulate a peer relaying a
/// block that spends an already-spent coin.
#[derive(Default)]
pub struct MemoryLedger {
    spent: Mutex<HashSet<(TxHash, u32)>>,
    flagged: Mutex<HashSet<TxHash>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a transaction as conflicting with ledger state.
    pub fn flag_double_spend(&self, tx: TxHash) {
        if let Ok(mut flagged) = self.flagged.lock() {
            flagged.insert(tx);
        }
    }

    pub fn mark_spent(&self, source: TxHash, index: u32) {
        if let Ok(mut spent) = self.spent.lock() {
            spent.insert((source, index));
        }
    }
}

impl LedgerService for MemoryLedger {
    fn double_spend_evidence(&self, block: &Block) -> Option<Vec<u8>> {
        let flagged = self.flagged.lock().ok()?;
        let spent = self.spent.lock().ok()?;
        let mut conflicting: Vec<TxHash> = Vec::new();
        for tx in &block.txs {
            if flagged.contains(&tx.hash) {
                conflicting.push(tx.hash);
                continue;
            }
            if let TxPayload::Transfer { inputs, .. } = &tx.payload {
                if inputs.iter().any(|i| spent.contains(&(i.source, i.index))) {
                    conflicting.push(tx.hash);
                }
            }
        }
        if conflicting.is_empty() {
            None
        } else {
            serde_json::to_vec(&conflicting).ok()
        }
    }

    fn verify_block_coins(&self, block: &Block) -> Result<(), ServiceError> {
        let mut seen: HashSet<(TxHash, u32)> = HashSet::new();
        for tx in &block.txs {
            if let TxPayload::Transfer { inputs, .. } = &tx.payload {
                for input in inputs {
                    if !seen.insert((input.source, input.index)) {
                        return Err(ServiceError::Ledger(format!(
                            "output {}#{} spent twice within block",
                            input.source, input.index
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Signature checker with an injectable reject set.
#[derive(Default)]
pub struct MemorySignatures {
    rejected: Mutex<HashSet<TxHash>>,
}

impl MemorySignatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, tx: TxHash) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(tx);
        }
    }
}

impl TransactionService for MemorySignatures {
    fn verify_signature(&self, tx: &Transaction) -> bool {
        self.rejected
            .lock()
            .map(|r| !r.contains(&tx.hash))
            .unwrap_or(false)
    }

    fn conflict_detect(&self, txs: &[Transaction]) -> Result<(), ServiceError> {
        let mut seen_hashes: HashSet<TxHash> = HashSet::new();
        let mut cancelled: HashSet<TxHash> = HashSet::new();
        let mut stopped: HashSet<TxHash> = HashSet::new();
        for tx in txs {
            if !seen_hashes.insert(tx.hash) {
                return Err(ServiceError::Conflict(format!(
                    "transaction {} appears twice",
                    tx.hash
                )));
            }
            match &tx.payload {
                TxPayload::CancelDeposit { join_tx } => {
                    if !cancelled.insert(*join_tx) {
                        return Err(ServiceError::Conflict(format!(
                            "deposit {join_tx} withdrawn twice"
                        )));
                    }
                }
                TxPayload::StopAgent { register_tx } => {
                    if !stopped.insert(*register_tx) {
                        return Err(ServiceError::Conflict(format!(
                            "agent {register_tx} stopped twice"
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Structural checker with an equivocation table keyed by packer and slot.
///
/// Equivocation tracking is opt-in: a development chain where one seed
/// address packs every slot signs competing branches with the same key,
/// which is indistinguishable from equivocation at this layer.
pub struct MemoryVerifier {
    max_block_txs: usize,
    track_equivocation: bool,
    signed_slots: Mutex<HashMap<(u64, u64, u32, Address), BlockHash>>,
}

impl MemoryVerifier {
    pub fn new(max_block_txs: usize) -> Self {
        Self {
            max_block_txs,
            track_equivocation: false,
            signed_slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_equivocation_tracking(mut self) -> Self {
        self.track_equivocation = true;
        self
    }
}

impl Default for MemoryVerifier {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl VerificationService for MemoryVerifier {
    fn verify_structure(&self, block: &Block) -> Result<(), ServiceError> {
        let header = &block.header;
        if header.hash == BlockHash::ZERO {
            return Err(ServiceError::Malformed("block hash is zero".into()));
        }
        if header.hash == header.pre_hash {
            return Err(ServiceError::Malformed("block links to itself".into()));
        }
        if header.round.member_count == 0 {
            return Err(ServiceError::Malformed("round has no members".into()));
        }
        let slot = header.round.packing_index;
        if slot == 0 || slot > header.round.member_count {
            return Err(ServiceError::Malformed(format!(
                "packing index {slot} outside a round of {} members",
                header.round.member_count
            )));
        }
        if block.txs.len() > self.max_block_txs {
            return Err(ServiceError::Malformed(format!(
                "{} transactions exceeds the {} per-block limit",
                block.txs.len(),
                self.max_block_txs
            )));
        }
        Ok(())
    }

    fn bifurcation_evidence(&self, header: &BlockHeader) -> Option<Vec<u8>> {
        if !self.track_equivocation {
            return None;
        }
        let mut signed = self.signed_slots.lock().ok()?;
        let key = (
            header.height,
            header.round.round_index,
            header.round.packing_index,
            header.packing_address,
        );
        match signed.get(&key) {
            Some(prior) if *prior != header.hash => {
                serde_json::to_vec(&[*prior, header.hash]).ok()
            }
            Some(_) => None,
            None => {
                signed.insert(key, header.hash);
                None
            }
        }
    }
}

/// Contract hook that executes nothing.
#[derive(Default)]
pub struct NoopContracts;

impl ContractService for NoopContracts {
    fn execute_block(&self, _block: &Block) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Registry that admits every kind from a minimum version upward.
pub struct OpenProtocol {
    min_version: u32,
}

impl OpenProtocol {
    pub fn new(min_version: u32) -> Self {
        Self { min_version }
    }
}

impl Default for OpenProtocol {
    fn default() -> Self {
        Self { min_version: 1 }
    }
}

impl ProtocolRegistry for OpenProtocol {
    fn active_version(&self) -> u32 {
        self.min_version
    }

    fn supports(&self, version: u32, _kind: TxKind) -> bool {
        version >= self.min_version
    }
}
