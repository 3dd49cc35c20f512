//! Meeting rounds and their members.
//!
//! A round is a fixed sequence of packing slots handed to the ranked
//! member set. Rounds are plain values: the scheduler computes them, the
//! round cache retains a bounded history of them, containers clone them
//! into verification results.

use serde::{Deserialize, Serialize};
use vela_types::{Address, Timestamp, TxHash};

/// One packer's slot within a round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeetingMember {
    pub agent_address: Address,
    pub packing_address: Address,
    /// Register-tx hash of the backing agent; zero for seed validators.
    pub agent_tx: TxHash,
    pub own_stake: u128,
    /// Own + delegated stake backing this member.
    pub total_stake: u128,
    pub commission_bps: u32,
    /// Production-rate minus penalty score used for ranking and red-punish
    /// eligibility.
    pub credit: f64,
    /// 1-based slot within the round.
    pub packing_index: u32,
    pub pack_start_time: Timestamp,
    pub pack_end_time: Timestamp,
    pub is_seed: bool,
}

/// A computed meeting round: ordered members with slot boundaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeetingRound {
    pub index: u64,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Members in slot order; `members[i].packing_index == i + 1`.
    pub members: Vec<MeetingMember>,
    /// Sum of member stakes, kept for weight queries.
    pub total_stake: u128,
}

impl MeetingRound {
    pub fn member_count(&self) -> u32 {
        self.members.len() as u32
    }

    /// Member at the given 1-based slot.
    pub fn member(&self, packing_index: u32) -> Option<&MeetingMember> {
        if packing_index == 0 {
            return None;
        }
        self.members.get(packing_index as usize - 1)
    }

    pub fn member_by_agent_address(&self, address: &Address) -> Option<&MeetingMember> {
        self.members.iter().find(|m| m.agent_address == *address)
    }

    pub fn member_by_packing_address(&self, address: &Address) -> Option<&MeetingMember> {
        self.members.iter().find(|m| m.packing_address == *address)
    }
}
