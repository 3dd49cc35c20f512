//! Unconfirmed transaction pool.
//!
//! Holds user transactions waiting for a block plus protocol transactions
//! the node synthesizes itself (double-spend red punishes). Confirmed
//! transactions are evicted when their block lands on the master chain.

use std::collections::HashMap;

use vela_types::{Block, Transaction, TxHash};

#[derive(Debug, Default)]
pub struct TxMemoryPool {
    txs: HashMap<TxHash, Transaction>,
}

impl TxMemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction; returns false if it was already pooled.
    pub fn add(&mut self, tx: Transaction) -> bool {
        self.txs.insert(tx.hash, tx).is_none()
    }

    pub fn remove(&mut self, hash: &TxHash) -> Option<Transaction> {
        self.txs.remove(hash)
    }

    pub fn get(&self, hash: &TxHash) -> Option<&Transaction> {
        self.txs.get(hash)
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.txs.contains_key(hash)
    }

    /// Evict everything the block confirmed.
    pub fn remove_confirmed(&mut self, block: &Block) {
        for tx in &block.txs {
            self.txs.remove(&tx.hash);
        }
    }

    /// Re-pool the user transactions of a rolled-back block so they can
    /// be packed again.
    pub fn restore_from(&mut self, block: &Block) {
        for tx in &block.txs {
            if !tx.is_system() {
                self.txs.insert(tx.hash, tx.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}
