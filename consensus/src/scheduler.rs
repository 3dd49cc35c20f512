//! Round scheduling — who packs, in what order, and when.
//!
//! [`RoundScheduler`] is pure: a round is a deterministic function of the
//! chain state as of a reference height and the (index, start time) pair.
//! [`RoundManager`] wraps it with a bounded cache of recent rounds indexed
//! by round number — the singly-linked `preRound` history flattened into a
//! slice, so "walk back to an older round" is a lookup, not a pointer chase.

use std::collections::VecDeque;

use tracing::debug;
use vela_types::{Address, ConsensusParams, Timestamp, TxHash};

use crate::chain::Chain;
use crate::error::RoundError;
use crate::punish::PunishKind;
use crate::round::{MeetingMember, MeetingRound};

/// A ranked candidate before slot assignment.
struct Candidate {
    agent_address: Address,
    packing_address: Address,
    agent_tx: TxHash,
    own_stake: u128,
    total_stake: u128,
    commission_bps: u32,
    credit: f64,
    is_seed: bool,
}

/// Pure round computation over chain state.
#[derive(Clone, Debug)]
pub struct RoundScheduler {
    params: ConsensusParams,
}

impl RoundScheduler {
    pub fn new(params: ConsensusParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Compute the round with the given index and start time.
    ///
    /// Membership is evaluated as of the reference height: the height of
    /// the last block packed in an earlier round, so blocks inside the
    /// round being computed cannot change its membership. Historical
    /// reconstruction and live scheduling share this path, which is what
    /// makes replayed rounds bit-identical to the rounds that were live.
    pub fn compute_round(
        &self,
        chain: &Chain,
        index: u64,
        start_time: Timestamp,
    ) -> Result<MeetingRound, RoundError> {
        let reference_height = self.reference_height(chain, index);
        let mut candidates = self.candidates(chain, index, reference_height);
        if candidates.is_empty() {
            return Err(RoundError::NoEligibleMembers);
        }

        // Total order: credit desc, stake desc, address asc. The address
        // key pins the order when the first two tie, so every node ranks
        // identically.
        candidates.sort_by(|a, b| {
            b.credit
                .total_cmp(&a.credit)
                .then_with(|| b.total_stake.cmp(&a.total_stake))
                .then_with(|| a.agent_address.cmp(&b.agent_address))
        });

        let interval = self.params.block_interval_secs;
        let total_stake: u128 = candidates.iter().map(|c| c.total_stake).sum();
        let members: Vec<MeetingMember> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| MeetingMember {
                agent_address: c.agent_address,
                packing_address: c.packing_address,
                agent_tx: c.agent_tx,
                own_stake: c.own_stake,
                total_stake: c.total_stake,
                commission_bps: c.commission_bps,
                credit: c.credit,
                packing_index: i as u32 + 1,
                pack_start_time: start_time.plus(i as u64 * interval),
                pack_end_time: start_time.plus((i as u64 + 1) * interval),
                is_seed: c.is_seed,
            })
            .collect();

        let end_time = start_time.plus(members.len() as u64 * interval);
        debug!(
            round = index,
            members = members.len(),
            start = %start_time,
            "computed meeting round"
        );
        Ok(MeetingRound {
            index,
            start_time,
            end_time,
            members,
            total_stake,
        })
    }

    /// Fast-forward a round to cover `now`, skipping rounds nobody packed.
    ///
    /// Membership can only change when blocks arrive, and none did while
    /// the node idled, so the recomputed round differs only in index and
    /// start time.
    pub fn advance_to(
        &self,
        chain: &Chain,
        round: &MeetingRound,
        now: Timestamp,
    ) -> Result<MeetingRound, RoundError> {
        let mut current = round.clone();
        while current.end_time <= now {
            // Whole rounds missed beyond the current one, in one jump.
            let duration = current
                .start_time
                .until(current.end_time)
                .max(self.params.block_interval_secs)
                .max(1);
            let missed = current.end_time.until(now) / duration;
            let index = current.index + 1 + missed;
            let start = current.end_time.plus(missed * duration);
            current = self.compute_round(chain, index, start)?;
        }
        Ok(current)
    }

    /// Height whose state seeds membership for round `index`: the last
    /// block packed in an earlier round (blocks of the round itself must
    /// not affect it).
    fn reference_height(&self, chain: &Chain, index: u64) -> u64 {
        chain
            .headers
            .iter()
            .rev()
            .find(|h| h.round.round_index < index)
            .map(|h| h.height)
            .unwrap_or_else(|| chain.start_height())
    }

    fn candidates(&self, chain: &Chain, index: u64, reference_height: u64) -> Vec<Candidate> {
        let mut out = Vec::new();

        for seed in &self.params.seed_addresses {
            out.push(Candidate {
                agent_address: *seed,
                packing_address: *seed,
                agent_tx: TxHash::ZERO,
                own_stake: 0,
                total_stake: 0,
                commission_bps: 0,
                credit: 1.0,
                is_seed: true,
            });
        }

        for agent in &chain.agents {
            if !agent.alive_at(reference_height) {
                continue;
            }
            let delegated: u128 = chain
                .deposits
                .iter()
                .filter(|d| d.agent_tx == agent.register_tx && d.alive_at(reference_height))
                .map(|d| d.amount)
                .sum();
            let total = agent.own_stake + delegated;
            if total < self.params.min_agent_stake {
                continue;
            }
            out.push(Candidate {
                agent_address: agent.agent_address,
                packing_address: agent.packing_address,
                agent_tx: agent.register_tx,
                own_stake: agent.own_stake,
                total_stake: total,
                commission_bps: agent.commission_bps,
                credit: self.credit(chain, agent.packing_address, agent.agent_address, index),
                is_seed: false,
            });
        }

        out
    }

    /// Credit = production rate − penalty over the last K rounds:
    /// blocks packed / K − yellows × penalty-numerator / K².
    fn credit(
        &self,
        chain: &Chain,
        packing_address: Address,
        agent_address: Address,
        index: u64,
    ) -> f64 {
        let k = self.params.round_lookback.max(1);
        let window_start = index.saturating_sub(k);
        let in_window = |round_index: u64| round_index >= window_start && round_index < index;

        let packed = chain
            .headers
            .iter()
            .filter(|h| in_window(h.round.round_index) && h.packing_address == packing_address)
            .count() as f64;

        let yellows = chain
            .yellow_punishes
            .iter()
            .filter(|p| {
                p.kind == PunishKind::Yellow
                    && in_window(p.round_index)
                    && p.address == agent_address
            })
            .count() as f64;

        let kf = k as f64;
        packed / kf - yellows * self.params.credit_penalty_numerator / (kf * kf)
    }
}

/// Bounded cache of recent rounds for one chain container.
///
/// Rounds are kept in ascending index order; the history a block
/// verification may regress into is exactly what remains cached.
#[derive(Debug)]
pub struct RoundManager {
    scheduler: RoundScheduler,
    rounds: VecDeque<MeetingRound>,
}

impl Clone for RoundManager {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            rounds: self.rounds.clone(),
        }
    }
}

impl RoundManager {
    pub fn new(params: ConsensusParams) -> Self {
        Self {
            scheduler: RoundScheduler::new(params),
            rounds: VecDeque::new(),
        }
    }

    pub fn scheduler(&self) -> &RoundScheduler {
        &self.scheduler
    }

    pub fn current(&self) -> Option<&MeetingRound> {
        self.rounds.back()
    }

    pub fn round_by_index(&self, index: u64) -> Option<&MeetingRound> {
        self.rounds.iter().rev().find(|r| r.index == index)
    }

    /// Cache a round, keeping ascending order and the retention bound.
    pub fn push(&mut self, round: MeetingRound) {
        if let Some(pos) = self.rounds.iter().position(|r| r.index == round.index) {
            self.rounds[pos] = round;
        } else {
            self.rounds.push_back(round);
            self.rounds
                .make_contiguous()
                .sort_by_key(|r| r.index);
        }
        let cap = self.scheduler.params().round_cache_count.max(1);
        while self.rounds.len() > cap {
            self.rounds.pop_front();
        }
    }

    /// Rebuild the cache from the chain tip: the tip block's own round,
    /// reconstructed exactly as it was live (historical-deterministic mode).
    pub fn init_round(&mut self, chain: &Chain) -> Result<MeetingRound, RoundError> {
        self.rounds.clear();
        let tip = chain.tip();
        let round = self
            .scheduler
            .compute_round(chain, tip.round.round_index, tip.round.round_start_time)?;
        self.push(round.clone());
        Ok(round)
    }

    /// The round covering `now`, fast-forwarding in real-time mode.
    pub fn current_round(
        &mut self,
        chain: &Chain,
        now: Timestamp,
        real_time: bool,
    ) -> Result<MeetingRound, RoundError> {
        let base = match self.current() {
            Some(round) => round.clone(),
            None => self.init_round(chain)?,
        };
        if !real_time || base.end_time > now {
            return Ok(base);
        }
        let advanced = self.scheduler.advance_to(chain, &base, now)?;
        self.push(advanced.clone());
        Ok(advanced)
    }

    /// Drop cached rounds the chain no longer reaches after a rollback.
    /// If the tip regressed below everything cached, the cache resets
    /// lazily on next use.
    pub fn reset_after_rollback(&mut self, tip_round_index: u64) {
        self.rounds.retain(|r| r.index <= tip_round_index);
    }

    pub fn cached_len(&self) -> usize {
        self.rounds.len()
    }
}
