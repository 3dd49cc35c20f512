//! Reward distribution and punish-set derivation.
//!
//! Both functions answer "what must the packer have put in the block":
//! verification recomputes the coinbase outputs and the yellow-punish
//! address list from chain state and compares against what arrived.

use vela_types::{Address, CoinOutput, ConsensusParams, RoundInfo};

use crate::chain::Chain;
use crate::round::{MeetingMember, MeetingRound};

const BPS_DENOM: u128 = 10_000;

/// The coinbase outputs a block at `height` packed by `member` must carry.
///
/// The reward pool is the base block reward plus the block's transfer
/// fees. Delegated stake earns its pro-rata share net of the agent's
/// commission; the agent collects its own-stake share, all commission,
/// and any integer-division remainder. Output order is fixed: agent
/// first, then deposits in working-set order, so the comparison is a
/// plain equality.
pub fn expected_coinbase(
    chain: &Chain,
    params: &ConsensusParams,
    member: &MeetingMember,
    height: u64,
    fees: u128,
) -> Vec<CoinOutput> {
    let total = params.base_block_reward + fees;
    let lock_height = height + params.coinbase_lock_heights;

    // Deposits as of the parent height; the block being verified cannot
    // fund its own reward split.
    let reference = height.saturating_sub(1);
    let deposits: Vec<_> = chain
        .deposits
        .iter()
        .filter(|d| d.agent_tx == member.agent_tx && d.alive_at(reference))
        .collect();

    if member.is_seed || deposits.is_empty() || member.total_stake == 0 {
        return vec![CoinOutput {
            owner: member.agent_address,
            amount: total,
            lock_height,
        }];
    }

    let mut outputs = Vec::with_capacity(deposits.len() + 1);
    let mut distributed: u128 = 0;
    // Placeholder; the agent amount is settled once the remainder is known.
    outputs.push(CoinOutput {
        owner: member.agent_address,
        amount: 0,
        lock_height,
    });
    for deposit in &deposits {
        let share = total * deposit.amount / member.total_stake;
        let commission = share * member.commission_bps as u128 / BPS_DENOM;
        let net = share - commission;
        distributed += net;
        outputs.push(CoinOutput {
            owner: deposit.depositor,
            amount: net,
            lock_height,
        });
    }
    // Own share, commission, and rounding dust all land with the agent.
    outputs[0].amount = total - distributed;
    outputs
}

/// Agent addresses of every member whose slot was skipped between the
/// chain-tip block and the block being verified.
///
/// When the rounds differ, the tail of the previous round is only
/// chargeable if that round is still cached; an evicted round yields no
/// retroactive punishes.
pub fn expected_yellow_addresses(
    tip: &RoundInfo,
    round: &MeetingRound,
    packing_index: u32,
    pre_round: Option<&MeetingRound>,
) -> Vec<Address> {
    let mut out = Vec::new();

    if tip.round_index == round.index {
        push_slot_range(&mut out, round, tip.packing_index + 1, packing_index);
        return out;
    }

    if let Some(prev) = pre_round {
        if prev.index == tip.round_index {
            push_slot_range(
                &mut out,
                prev,
                tip.packing_index + 1,
                prev.member_count() + 1,
            );
        }
    }
    push_slot_range(&mut out, round, 1, packing_index);
    out
}

/// Append agent addresses for slots in `[from, to)` of `round`.
fn push_slot_range(out: &mut Vec<Address>, round: &MeetingRound, from: u32, to: u32) {
    for slot in from..to {
        if let Some(member) = round.member(slot) {
            out.push(member.agent_address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_types::{Block, BlockHash, BlockHeader, Timestamp, TxHash};

    use crate::agent::Deposit;
    use crate::round::MeetingMember;

    fn member(agent: u8, slot: u32, seed: bool) -> MeetingMember {
        MeetingMember {
            agent_address: Address::repeat(agent),
            packing_address: Address::repeat(agent + 100),
            agent_tx: TxHash::new([agent; 32]),
            own_stake: 30_000,
            total_stake: 30_000,
            commission_bps: 1_000,
            credit: 1.0,
            packing_index: slot,
            pack_start_time: Timestamp::EPOCH,
            pack_end_time: Timestamp::EPOCH,
            is_seed: seed,
        }
    }

    fn round(index: u64, agents: &[u8]) -> MeetingRound {
        MeetingRound {
            index,
            start_time: Timestamp::EPOCH,
            end_time: Timestamp::EPOCH,
            members: agents
                .iter()
                .enumerate()
                .map(|(i, a)| member(*a, i as u32 + 1, false))
                .collect(),
            total_stake: 0,
        }
    }

    fn chain_with_deposits(deposits: Vec<Deposit>) -> Chain {
        let mut chain = Chain::from_block(Block {
            header: BlockHeader {
                height: 0,
                hash: BlockHash::new([1; 32]),
                pre_hash: BlockHash::ZERO,
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
        });
        chain.deposits = deposits;
        chain
    }

    fn deposit(depositor: u8, agent_tx: u8, amount: u128) -> Deposit {
        Deposit {
            depositor: Address::repeat(depositor),
            agent_tx: TxHash::new([agent_tx; 32]),
            join_tx: TxHash::new([depositor; 32]),
            amount,
            register_height: 0,
            time: Timestamp::EPOCH,
            del_height: None,
        }
    }

    #[test]
    fn seed_takes_whole_reward() {
        let chain = chain_with_deposits(Vec::new());
        let params = ConsensusParams::default();
        let m = member(1, 1, true);
        let outputs = expected_coinbase(&chain, &params, &m, 50, 25);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].owner, Address::repeat(1));
        assert_eq!(outputs[0].amount, params.base_block_reward + 25);
        assert_eq!(outputs[0].lock_height, 50 + params.coinbase_lock_heights);
    }

    #[test]
    fn delegated_reward_splits_with_commission() {
        // Agent 1: own 30_000, one deposit of 10_000 → total 40_000.
        let chain = chain_with_deposits(vec![deposit(9, 1, 10_000)]);
        let params = ConsensusParams {
            base_block_reward: 400,
            ..ConsensusParams::default()
        };
        let mut m = member(1, 1, false);
        m.total_stake = 40_000;
        let outputs = expected_coinbase(&chain, &params, &m, 50, 0);
        assert_eq!(outputs.len(), 2);
        // Depositor share: 400 × 10000/40000 = 100, commission 10% → 90.
        assert_eq!(outputs[1].owner, Address::repeat(9));
        assert_eq!(outputs[1].amount, 90);
        // Agent keeps the rest, commission included.
        assert_eq!(outputs[0].owner, Address::repeat(1));
        assert_eq!(outputs[0].amount, 310);
        let sum: u128 = outputs.iter().map(|o| o.amount).sum();
        assert_eq!(sum, 400, "rounding dust never leaks");
    }

    #[test]
    fn withdrawn_deposit_earns_nothing() {
        let mut d = deposit(9, 1, 10_000);
        d.del_height = Some(40);
        let chain = chain_with_deposits(vec![d]);
        let params = ConsensusParams::default();
        let m = member(1, 1, false);
        let outputs = expected_coinbase(&chain, &params, &m, 50, 0);
        assert_eq!(outputs.len(), 1, "dead deposit falls back to agent-only");
    }

    #[test]
    fn same_round_gap_names_skipped_slots() {
        let r = round(7, &[1, 2, 3, 4]);
        let tip = RoundInfo {
            round_index: 7,
            round_start_time: Timestamp::EPOCH,
            member_count: 4,
            packing_index: 1,
            protocol_version: 1,
        };
        let missed = expected_yellow_addresses(&tip, &r, 4, None);
        assert_eq!(missed, vec![Address::repeat(2), Address::repeat(3)]);
    }

    #[test]
    fn cross_round_gap_charges_cached_previous_tail() {
        let prev = round(7, &[1, 2, 3]);
        let cur = round(8, &[4, 5, 6]);
        let tip = RoundInfo {
            round_index: 7,
            round_start_time: Timestamp::EPOCH,
            member_count: 3,
            packing_index: 2,
            protocol_version: 1,
        };
        let missed = expected_yellow_addresses(&tip, &cur, 2, Some(&prev));
        // Slot 3 of round 7, slot 1 of round 8.
        assert_eq!(missed, vec![Address::repeat(3), Address::repeat(4)]);

        let without_cache = expected_yellow_addresses(&tip, &cur, 2, None);
        assert_eq!(
            without_cache,
            vec![Address::repeat(4)],
            "evicted rounds yield no retroactive punishes"
        );
    }

    #[test]
    fn adjacent_slots_miss_nobody() {
        let r = round(7, &[1, 2, 3]);
        let tip = RoundInfo {
            round_index: 7,
            round_start_time: Timestamp::EPOCH,
            member_count: 3,
            packing_index: 2,
            protocol_version: 1,
        };
        assert!(expected_yellow_addresses(&tip, &r, 3, None).is_empty());
    }
}
