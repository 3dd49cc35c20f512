//! End-to-end container behavior: packing a seed chain, replaying agent
//! lifecycles, rolling back, and historical round determinism.

use proptest::prelude::*;
use vela_consensus::chain::Chain;
use vela_consensus::container::ChainContainer;
use vela_consensus::scheduler::RoundScheduler;
use vela_types::{
    Address, Block, BlockHash, BlockHeader, ConsensusParams, RoundInfo, Timestamp, Transaction,
    TxHash, TxPayload,
};

const SEED: u8 = 1;

fn params() -> ConsensusParams {
    ConsensusParams {
        seed_addresses: vec![Address::repeat(SEED)],
        // Keep rounds seed-only so helper blocks can declare member_count 1
        // regardless of what the working set accumulates.
        min_agent_stake: u128::MAX,
        round_cache_count: 50,
        ..ConsensusParams::default()
    }
}

fn genesis() -> Block {
    Block {
        header: BlockHeader {
            height: 0,
            hash: BlockHash::new([0xAA; 32]),
            pre_hash: BlockHash::ZERO,
            packing_address: Address::repeat(SEED),
            time: Timestamp::new(1_000),
            round: RoundInfo {
                round_index: 1,
                round_start_time: Timestamp::new(990),
                member_count: 1,
                packing_index: 1,
                protocol_version: 1,
            },
            signature: Vec::new(),
        },
        txs: Vec::new(),
    }
}

fn tx(hash: u8, payload: TxPayload) -> Transaction {
    Transaction {
        hash: TxHash::new([hash; 32]),
        time: Timestamp::new(1_000),
        signature: Vec::new(),
        payload,
    }
}

fn coinbase(hash: u8) -> Transaction {
    tx(hash, TxPayload::CoinBase { outputs: Vec::new() })
}

/// Build and verify the next seed block, carrying `user_txs` after the
/// coinbase. One block per round, always slot 1.
fn pack_next(container: &mut ChainContainer, hash: u8, user_txs: Vec<Transaction>) -> Block {
    let tip = container.chain.tip().clone();
    // Coinbase hashes live in a disjoint range from user tx hashes.
    let mut txs = vec![coinbase(hash ^ 0x80)];
    txs.extend(user_txs);
    let block = Block {
        header: BlockHeader {
            height: tip.height + 1,
            hash: BlockHash::new([hash; 32]),
            pre_hash: tip.hash,
            packing_address: Address::repeat(SEED),
            time: tip.time.plus(10),
            round: RoundInfo {
                round_index: tip.round.round_index + 1,
                round_start_time: tip.time,
                member_count: 1,
                packing_index: 1,
                protocol_version: 1,
            },
            signature: Vec::new(),
        },
        txs,
    };
    container
        .verify_and_add_block(block.clone(), Timestamp::new(u64::MAX / 2), true, false)
        .expect("seed block must verify");
    block
}

fn register(hash: u8, agent: u8) -> Transaction {
    tx(
        hash,
        TxPayload::RegisterAgent {
            agent_address: Address::repeat(agent),
            packing_address: Address::repeat(agent + 100),
            own_stake: 30_000,
            commission_bps: 500,
        },
    )
}

#[test]
fn seed_chain_grows_block_by_block() {
    let mut container = ChainContainer::new(Chain::from_block(genesis()), params());
    for i in 0..5u8 {
        pack_next(&mut container, 10 + i, Vec::new());
    }
    assert_eq!(container.chain.height(), 5);
    assert!(container.chain.linkage_ok());
}

#[test]
fn rollback_restores_exact_working_set() {
    let mut container = ChainContainer::new(Chain::from_block(genesis()), params());
    pack_next(&mut container, 10, vec![register(70, 5)]);
    let join = tx(
        71,
        TxPayload::JoinConsensus {
            depositor: Address::repeat(9),
            agent_tx: TxHash::new([70; 32]),
            amount: 4_000,
        },
    );
    pack_next(&mut container, 11, vec![join]);

    let agents_before = container.chain.agents.clone();
    let deposits_before = container.chain.deposits.clone();
    let height_before = container.chain.height();

    let b3 = pack_next(
        &mut container,
        12,
        vec![tx(72, TxPayload::StopAgent { register_tx: TxHash::new([70; 32]) })],
    );
    assert_eq!(container.chain.agents[0].del_height, Some(3));

    assert!(container.rollback(&b3));
    assert_eq!(container.chain.height(), height_before);
    assert_eq!(container.chain.agents, agents_before);
    assert_eq!(container.chain.deposits, deposits_before);
}

#[test]
fn historical_rounds_are_deterministic() {
    let mut container = ChainContainer::new(Chain::from_block(genesis()), params());
    for i in 0..4u8 {
        pack_next(&mut container, 10 + i, Vec::new());
    }
    let scheduler = RoundScheduler::new(params());
    let tip_round = container.chain.tip().round;

    let first = scheduler
        .compute_round(&container.chain, tip_round.round_index, tip_round.round_start_time)
        .unwrap();

    // Appending later rounds must not change an already-packed round.
    for i in 0..3u8 {
        pack_next(&mut container, 20 + i, Vec::new());
    }
    let again = scheduler
        .compute_round(&container.chain, tip_round.round_index, tip_round.round_start_time)
        .unwrap();
    assert_eq!(first, again);
}

#[test]
fn membership_changes_only_from_earlier_rounds() {
    let lowered = ConsensusParams {
        min_agent_stake: 10_000,
        ..params()
    };
    let mut container = ChainContainer::new(Chain::from_block(genesis()), params());
    let b1 = pack_next(&mut container, 10, vec![register(70, 5)]);

    let scheduler = RoundScheduler::new(lowered);
    // The round the registration block itself belongs to must not see the
    // new agent; the following round must.
    let same = scheduler
        .compute_round(&container.chain, b1.header.round.round_index, Timestamp::new(1_000))
        .unwrap();
    assert_eq!(same.member_count(), 1);

    let next = scheduler
        .compute_round(&container.chain, b1.header.round.round_index + 1, Timestamp::new(1_010))
        .unwrap();
    assert_eq!(next.member_count(), 2);
    assert!(next.member_by_agent_address(&Address::repeat(5)).is_some());
}

proptest! {
    // Any run of register/stop blocks, rolled back in reverse, restores
    // the pre-run working set exactly.
    #[test]
    fn replay_then_unwind_is_identity(ops in prop::collection::vec(0u8..3, 1..6)) {
        let mut container = ChainContainer::new(Chain::from_block(genesis()), params());
        pack_next(&mut container, 200, vec![register(250, 5)]);

        let agents_before = container.chain.agents.clone();
        let deposits_before = container.chain.deposits.clone();

        let mut packed = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            let hash = 100 + i as u8;
            let user_txs = match op {
                0 => vec![register(hash, 20 + i as u8)],
                1 => vec![tx(hash, TxPayload::JoinConsensus {
                    depositor: Address::repeat(40 + i as u8),
                    agent_tx: TxHash::new([250; 32]),
                    amount: 1_000,
                })],
                _ => Vec::new(),
            };
            packed.push(pack_next(&mut container, hash, user_txs));
        }
        for block in packed.iter().rev() {
            prop_assert!(container.rollback(block));
        }
        prop_assert_eq!(&container.chain.agents, &agents_before);
        prop_assert_eq!(&container.chain.deposits, &deposits_before);
    }
}
