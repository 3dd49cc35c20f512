//! Consensus transaction kinds.
//!
//! The byte-level wire format is out of scope for this engine; a
//! [`Transaction`] is the decoded in-memory shape. The signature is carried
//! as opaque bytes and checked by the transaction-service collaborator.
//!
//! Kinds split into two families:
//! - system transactions, produced by the packer itself (coinbase, yellow
//!   punish, red punish) — these are recomputed and checked during block
//!   verification and never go through per-coin ledger validation;
//! - user transactions (transfer, agent/deposit lifecycle) — validated by
//!   the ledger and signature collaborators.

use crate::address::Address;
use crate::hash::TxHash;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Why a red punish was issued against an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PunishReason {
    /// The packer signed a block containing a double-spend.
    DoubleSpend,
    /// The packer signed two distinct blocks for the same slot.
    Bifurcation,
    /// The agent accumulated enough yellow punishes to drop its credit
    /// below the red-punish threshold.
    TooMuchYellowPunish,
}

/// A coin spent by a transaction — a reference into prior outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInput {
    pub owner: Address,
    /// Transaction that created the spent output.
    pub source: TxHash,
    /// Output index within the source transaction.
    pub index: u32,
    pub amount: u128,
}

/// A coin created by a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinOutput {
    pub owner: Address,
    pub amount: u128,
    /// Height before which the output cannot be spent (reward maturity).
    pub lock_height: u64,
}

/// Discriminant for [`Transaction`], used by the protocol registry to gate
/// blocks carrying kinds the active version does not recognize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    CoinBase,
    Transfer,
    RegisterAgent,
    JoinConsensus,
    CancelDeposit,
    StopAgent,
    YellowPunish,
    RedPunish,
}

/// Kind-specific transaction content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPayload {
    /// Block reward distribution, always the first transaction of a block.
    CoinBase { outputs: Vec<CoinOutput> },
    /// Ordinary coin movement.
    Transfer {
        inputs: Vec<CoinInput>,
        outputs: Vec<CoinOutput>,
        fee: u128,
    },
    /// Register a new validator candidate.
    RegisterAgent {
        agent_address: Address,
        packing_address: Address,
        own_stake: u128,
        /// Commission the agent takes from delegated rewards, basis points.
        commission_bps: u32,
    },
    /// Delegate stake to an agent (refers to its register transaction).
    JoinConsensus {
        depositor: Address,
        agent_tx: TxHash,
        amount: u128,
    },
    /// Withdraw a delegation (refers to the join transaction).
    CancelDeposit { join_tx: TxHash },
    /// Deregister an agent (refers to its register transaction).
    StopAgent { register_tx: TxHash },
    /// Missed-slot penalties for the listed agent addresses.
    YellowPunish { addresses: Vec<Address> },
    /// Severe-fault penalty deactivating an agent.
    RedPunish {
        address: Address,
        reason: PunishReason,
        /// Serialized conflicting-transaction digest set (double-spend) or
        /// empty (excess yellows).
        evidence: Vec<u8>,
    },
}

/// A decoded transaction. Identity = `hash`; immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TxHash,
    pub time: Timestamp,
    /// Opaque signature bytes, verified by the transaction-service
    /// collaborator. System transactions carry none.
    pub signature: Vec<u8>,
    pub payload: TxPayload,
}

impl Transaction {
    pub fn kind(&self) -> TxKind {
        match self.payload {
            TxPayload::CoinBase { .. } => TxKind::CoinBase,
            TxPayload::Transfer { .. } => TxKind::Transfer,
            TxPayload::RegisterAgent { .. } => TxKind::RegisterAgent,
            TxPayload::JoinConsensus { .. } => TxKind::JoinConsensus,
            TxPayload::CancelDeposit { .. } => TxKind::CancelDeposit,
            TxPayload::StopAgent { .. } => TxKind::StopAgent,
            TxPayload::YellowPunish { .. } => TxKind::YellowPunish,
            TxPayload::RedPunish { .. } => TxKind::RedPunish,
        }
    }

    /// System transactions are produced by the packer as part of the
    /// protocol and skip coin-data and signature validation.
    pub fn is_system(&self) -> bool {
        matches!(
            self.kind(),
            TxKind::CoinBase | TxKind::YellowPunish | TxKind::RedPunish
        )
    }

    /// Fee paid by this transaction (zero for everything but transfers).
    pub fn fee(&self) -> u128 {
        match &self.payload {
            TxPayload::Transfer { fee, .. } => *fee,
            _ => 0,
        }
    }
}
