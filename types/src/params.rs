//! Consensus parameters.
//!
//! Everything tunable lives here rather than in constants: the original
//! deployments retuned the red-punish threshold and the credit lookback
//! window over time, so both are configuration, not invariants.

use crate::address::Address;
use serde::{Deserialize, Serialize};

/// Tunable parameters of the round-scheduling consensus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    // ── Round scheduling ─────────────────────────────────────────────────
    /// Seconds per packing slot.
    #[serde(default = "default_block_interval")]
    pub block_interval_secs: u64,

    /// Lookback window K, in rounds, for the credit formula.
    #[serde(default = "default_round_lookback")]
    pub round_lookback: u64,

    /// Numerator of the yellow-punish penalty term:
    /// penalty = yellows × credit_penalty_numerator / K².
    #[serde(default = "default_penalty_numerator")]
    pub credit_penalty_numerator: f64,

    /// Minimum own + delegated stake for an agent to enter a round.
    #[serde(default = "default_min_agent_stake")]
    pub min_agent_stake: u128,

    /// Credit at or below which a yellow-punished member earns a red punish.
    #[serde(default = "default_red_punish_credit")]
    pub red_punish_credit_threshold: f64,

    /// Addresses of the seed validators (fixed credit 1.0, no stake needed).
    #[serde(default)]
    pub seed_addresses: Vec<Address>,

    /// How many past rounds the round cache retains.
    #[serde(default = "default_round_cache")]
    pub round_cache_count: usize,

    // ── Rewards ──────────────────────────────────────────────────────────
    /// Base reward per block, before fees.
    #[serde(default = "default_block_reward")]
    pub base_block_reward: u128,

    /// Heights a coinbase output stays locked after its block.
    #[serde(default = "default_coinbase_lock")]
    pub coinbase_lock_heights: u64,

    // ── Ingestion ────────────────────────────────────────────────────────
    /// Clock-skew tolerance: blocks further in the future are dropped.
    #[serde(default = "default_future_tolerance")]
    pub discard_future_secs: u64,

    // ── Fork reconciliation ──────────────────────────────────────────────
    /// Height lead a fork needs over the master tip to force a switch.
    #[serde(default = "default_switch_margin")]
    pub chain_switch_margin: u64,

    /// Height lag behind the master tip at which forks/orphans expire.
    #[serde(default = "default_max_fork_lag")]
    pub max_fork_lag: u64,

    /// Seconds between expiry/pruning sweeps inside the reconciliation loop.
    #[serde(default = "default_clear_interval")]
    pub clear_interval_secs: u64,

    /// Heights an invalidated agent/deposit stays in the working set
    /// before being physically pruned.
    #[serde(default = "default_retention")]
    pub retention_heights: u64,

    /// In-memory block window kept on the master chain.
    #[serde(default = "default_block_window")]
    pub master_block_window: usize,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_block_interval() -> u64 {
    10
}

fn default_round_lookback() -> u64 {
    100
}

fn default_penalty_numerator() -> f64 {
    100.0
}

fn default_min_agent_stake() -> u128 {
    20_000
}

fn default_red_punish_credit() -> f64 {
    -0.1
}

fn default_round_cache() -> usize {
    5
}

fn default_block_reward() -> u128 {
    500
}

fn default_coinbase_lock() -> u64 {
    100
}

fn default_future_tolerance() -> u64 {
    60
}

fn default_switch_margin() -> u64 {
    3
}

fn default_max_fork_lag() -> u64 {
    1_000
}

fn default_clear_interval() -> u64 {
    60
}

fn default_retention() -> u64 {
    1_000
}

fn default_block_window() -> usize {
    1_000
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            block_interval_secs: default_block_interval(),
            round_lookback: default_round_lookback(),
            credit_penalty_numerator: default_penalty_numerator(),
            min_agent_stake: default_min_agent_stake(),
            red_punish_credit_threshold: default_red_punish_credit(),
            seed_addresses: Vec::new(),
            round_cache_count: default_round_cache(),
            base_block_reward: default_block_reward(),
            coinbase_lock_heights: default_coinbase_lock(),
            discard_future_secs: default_future_tolerance(),
            chain_switch_margin: default_switch_margin(),
            max_fork_lag: default_max_fork_lag(),
            clear_interval_secs: default_clear_interval(),
            retention_heights: default_retention(),
            master_block_window: default_block_window(),
        }
    }
}

impl ConsensusParams {
    /// Duration of a full round of `member_count` slots, in seconds.
    pub fn round_duration_secs(&self, member_count: u32) -> u64 {
        self.block_interval_secs * member_count as u64
    }
}
