//! Fundamental types for the Vela consensus engine.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: addresses, hashes, timestamps, blocks and headers, the
//! consensus transaction kinds, and protocol parameters.

pub mod address;
pub mod block;
pub mod hash;
pub mod params;
pub mod time;
pub mod transaction;

pub use address::Address;
pub use block::{Block, BlockHeader, RoundInfo};
pub use hash::{BlockHash, TxHash};
pub use params::ConsensusParams;
pub use time::Timestamp;
pub use transaction::{
    CoinInput, CoinOutput, PunishReason, Transaction, TxKind, TxPayload,
};
