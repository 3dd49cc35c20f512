//! Agents and deposits — the staked identities a round is built from.
//!
//! Both are small value types. Fork sandboxes deep-copy them with plain
//! `Clone` so a fork's replay can never alias master-chain state.

use serde::{Deserialize, Serialize};
use vela_types::{Address, Timestamp, TxHash};

/// A registered validator candidate.
///
/// Created by a register-agent transaction, invalidated (not removed) by a
/// stop-agent or red-punish transaction, physically pruned only after the
/// retention window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_address: Address,
    /// Address this agent signs packed blocks with.
    pub packing_address: Address,
    pub own_stake: u128,
    /// Commission taken from delegated rewards, in basis points.
    pub commission_bps: u32,
    /// Hash of the register-agent transaction — deposits reference it.
    pub register_tx: TxHash,
    /// Height of the block that carried the register transaction.
    pub register_height: u64,
    pub time: Timestamp,
    /// Height at which the agent became invalid; `None` = alive.
    pub del_height: Option<u64>,
}

impl Agent {
    /// Whether the agent was registered and not yet invalidated at `height`.
    pub fn alive_at(&self, height: u64) -> bool {
        self.register_height <= height && self.del_height.map_or(true, |del| del > height)
    }

    pub fn is_alive(&self) -> bool {
        self.del_height.is_none()
    }
}

/// Stake delegated to an agent, linked to it by the register-tx hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub depositor: Address,
    /// Register-tx hash of the agent this stake backs.
    pub agent_tx: TxHash,
    /// Hash of the join-consensus transaction that created this deposit.
    pub join_tx: TxHash,
    pub amount: u128,
    pub register_height: u64,
    pub time: Timestamp,
    /// Height at which the deposit was withdrawn; `None` = active.
    pub del_height: Option<u64>,
}

impl Deposit {
    pub fn alive_at(&self, height: u64) -> bool {
        self.register_height <= height && self.del_height.map_or(true, |del| del > height)
    }

    pub fn is_alive(&self) -> bool {
        self.del_height.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(register: u64, del: Option<u64>) -> Agent {
        Agent {
            agent_address: Address::repeat(1),
            packing_address: Address::repeat(2),
            own_stake: 50_000,
            commission_bps: 1_000,
            register_tx: TxHash::ZERO,
            register_height: register,
            time: Timestamp::EPOCH,
            del_height: del,
        }
    }

    #[test]
    fn liveness_window() {
        let a = agent(10, Some(20));
        assert!(!a.alive_at(9), "not yet registered");
        assert!(a.alive_at(10));
        assert!(a.alive_at(19));
        assert!(!a.alive_at(20), "invalid from its deletion height");
        assert!(agent(10, None).alive_at(1_000_000));
    }
}
