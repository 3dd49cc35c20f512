//! One chain's blocks and derived working set.
//!
//! A `Chain` is a contiguous block sequence plus the agent/deposit/punish
//! lists derived from its special transactions. Exactly one
//! [`ChainContainer`](crate::container::ChainContainer) owns each chain;
//! all mutation goes through the container.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use vela_types::{Block, BlockHash, BlockHeader};

use crate::agent::{Agent, Deposit};
use crate::punish::PunishEntry;

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(1);

fn next_chain_id() -> u64 {
    NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed)
}

/// An ordered, contiguous block sequence with its derived consensus state.
///
/// Invariant: `blocks[i].pre_hash == blocks[i-1].hash` and heights are
/// strictly sequential; `end_header` is always the last block's header.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chain {
    /// Container identity; fork bookkeeping compares chains by id.
    pub id: u64,
    /// Id of the chain this one forked away from, if any.
    pub parent_id: Option<u64>,
    pub start_header: BlockHeader,
    pub end_header: BlockHeader,
    pub headers: Vec<BlockHeader>,
    pub blocks: Vec<Block>,
    // Derived working set — only meaningful on the master chain and on
    // fork-replay sandboxes; plain fork/orphan chains leave these empty.
    pub agents: Vec<Agent>,
    pub deposits: Vec<Deposit>,
    pub yellow_punishes: Vec<PunishEntry>,
    pub red_punishes: Vec<PunishEntry>,
}

impl Chain {
    /// A single-block chain (new fork or orphan, or a genesis master).
    pub fn from_block(block: Block) -> Self {
        let header = block.header.clone();
        Self {
            id: next_chain_id(),
            parent_id: None,
            start_header: header.clone(),
            end_header: header.clone(),
            headers: vec![header],
            blocks: vec![block],
            agents: Vec::new(),
            deposits: Vec::new(),
            yellow_punishes: Vec::new(),
            red_punishes: Vec::new(),
        }
    }

    /// A chain over an already-contiguous block run.
    ///
    /// Callers guarantee linkage; used when slicing fork suffixes.
    pub fn from_blocks(blocks: Vec<Block>) -> Option<Self> {
        let first = blocks.first()?.header.clone();
        let last = blocks.last()?.header.clone();
        Some(Self {
            id: next_chain_id(),
            parent_id: None,
            start_header: first,
            end_header: last,
            headers: blocks.iter().map(|b| b.header.clone()).collect(),
            blocks,
            agents: Vec::new(),
            deposits: Vec::new(),
            yellow_punishes: Vec::new(),
            red_punishes: Vec::new(),
        })
    }

    /// A deep copy carrying a fresh id.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = next_chain_id();
        copy
    }

    pub fn tip(&self) -> &BlockHeader {
        &self.end_header
    }

    pub fn height(&self) -> u64 {
        self.end_header.height
    }

    pub fn start_height(&self) -> u64 {
        self.start_header.height
    }

    /// Append a block without touching the derived working set.
    pub fn push_block(&mut self, block: Block) {
        self.end_header = block.header.clone();
        self.headers.push(block.header.clone());
        self.blocks.push(block);
    }

    /// Search headers from the tail for a hash (recent blocks first).
    pub fn find_header(&self, hash: &BlockHash) -> Option<&BlockHeader> {
        self.headers.iter().rev().find(|h| h.hash == *hash)
    }

    /// Index into `headers` of the block with the given hash.
    pub fn position_of(&self, hash: &BlockHash) -> Option<usize> {
        self.headers.iter().rposition(|h| h.hash == *hash)
    }

    /// Whether the chain's linkage invariant holds (test support).
    pub fn linkage_ok(&self) -> bool {
        self.headers.windows(2).all(|w| w[0].is_parent_of(&w[1]))
            && self.end_header == *self.headers.last().expect("chain never empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_types::{Address, RoundInfo, Timestamp};

    fn block(height: u64, hash: u8, pre: u8) -> Block {
        Block {
            header: BlockHeader {
                height,
                hash: BlockHash::new([hash; 32]),
                pre_hash: BlockHash::new([pre; 32]),
                packing_address: Address::ZERO,
                time: Timestamp::EPOCH,
                round: RoundInfo {
                    round_index: 1,
                    round_start_time: Timestamp::EPOCH,
                    member_count: 1,
                    packing_index: 1,
                    protocol_version: 1,
                },
                signature: Vec::new(),
            },
            txs: Vec::new(),
        }
    }

    #[test]
    fn push_maintains_linkage() {
        let mut chain = Chain::from_block(block(1, 1, 0));
        chain.push_block(block(2, 2, 1));
        chain.push_block(block(3, 3, 2));
        assert!(chain.linkage_ok());
        assert_eq!(chain.height(), 3);
        assert_eq!(chain.start_height(), 1);
    }

    #[test]
    fn find_header_prefers_tail() {
        let mut chain = Chain::from_block(block(1, 1, 0));
        chain.push_block(block(2, 2, 1));
        let found = chain.find_header(&BlockHash::new([2; 32])).unwrap();
        assert_eq!(found.height, 2);
        assert!(chain.find_header(&BlockHash::new([9; 32])).is_none());
    }

    #[test]
    fn duplicate_gets_fresh_id() {
        let chain = Chain::from_block(block(1, 1, 0));
        let copy = chain.duplicate();
        assert_ne!(chain.id, copy.id);
        assert_eq!(chain.blocks.len(), copy.blocks.len());
    }
}
