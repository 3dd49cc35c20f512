//! Block and header types.
//!
//! The round-extension bytes a header carries on the wire arrive here
//! already decoded as [`RoundInfo`] — the byte layout is a non-goal for
//! this engine, the scheduling fields are not.

use crate::address::Address;
use crate::hash::BlockHash;
use crate::time::Timestamp;
use crate::transaction::{Transaction, TxKind};
use serde::{Deserialize, Serialize};

/// Decoded round-extension data from a block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    /// Index of the meeting round this block was packed in.
    pub round_index: u64,
    /// Declared start time of that round.
    pub round_start_time: Timestamp,
    /// Number of members the packer saw in the round.
    pub member_count: u32,
    /// 1-based slot of the packer within the round.
    pub packing_index: u32,
    /// Protocol version the packer was running.
    pub protocol_version: u32,
}

impl RoundInfo {
    /// Position of this block in round order: rounds first, slots within.
    pub fn slot_key(&self) -> (u64, u32) {
        (self.round_index, self.packing_index)
    }
}

/// A block header. Identity = `hash`; immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: BlockHash,
    pub pre_hash: BlockHash,
    /// Address the slot owner packs with (may differ from its agent address).
    pub packing_address: Address,
    /// Block time — must equal the packer's slot end time.
    pub time: Timestamp,
    pub round: RoundInfo,
    /// Opaque packer signature over the header.
    pub signature: Vec<u8>,
}

impl BlockHeader {
    /// Whether `child` directly extends this header.
    pub fn is_parent_of(&self, child: &BlockHeader) -> bool {
        child.pre_hash == self.hash && child.height == self.height + 1
    }
}

/// A block: header plus ordered transaction list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl Block {
    /// The coinbase, if the block leads with one.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.txs.first().filter(|tx| tx.kind() == TxKind::CoinBase)
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }
}
