//! Consensus error types.

use thiserror::Error;

/// Errors surfaced by the consensus core.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("round scheduling failed: {0}")]
    Round(#[from] RoundError),

    #[error("block verification failed: {0}")]
    Verify(#[from] VerifyFailure),
}

/// Round computation cannot proceed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoundError {
    /// The candidate set is empty. Fatal for progress: no block can be
    /// validly produced until an agent qualifies, so callers must surface
    /// this as a stall, never swallow it.
    #[error("no eligible round members — consensus cannot progress")]
    NoEligibleMembers,
}

/// Why a block failed verification against a chain container.
///
/// Linkage failures route to fork/orphan handling upstream; everything
/// else rejects the block.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyFailure {
    #[error("parent linkage mismatch")]
    BadLinkage,

    #[error("round/slot did not advance past the chain tip")]
    SlotNotMonotonic,

    #[error("declared round start time is in the future")]
    RoundInFuture,

    #[error("slot time is still in the future")]
    SlotInFuture,

    #[error("declared round start does not follow the tracked round")]
    RoundStartBeforeTracked,

    #[error("round index or start time does not match the schedule")]
    RoundMismatch,

    #[error("round {0} is no longer in the round cache")]
    UnknownRound(u64),

    #[error("declared member count does not match the schedule")]
    MemberCountMismatch,

    #[error("slot {0} has no member")]
    NoSuchSlot(u32),

    #[error("block packed by the wrong slot owner")]
    WrongPacker,

    #[error("block time does not equal the slot end time")]
    WrongSlotTime,

    #[error("first transaction is not the coinbase")]
    MissingCoinbase,

    #[error("more than one coinbase transaction")]
    DuplicateCoinbase,

    #[error("more than one yellow-punish transaction")]
    DuplicateYellowPunish,

    #[error("yellow-punish address list does not match the missed slots")]
    YellowPunishMismatch,

    #[error("red-punish set does not match the members at the credit floor")]
    RedPunishMismatch,

    #[error("coinbase reward distribution mismatch")]
    CoinbaseMismatch,
}
