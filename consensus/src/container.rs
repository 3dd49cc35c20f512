//! Chain containers — a chain plus its round cache and replay logic.
//!
//! The container is the only writer of its chain. `add_block` replays the
//! block's special transactions into the derived working set, `rollback`
//! reverses exactly that replay, and `verify_block` checks a candidate
//! block against the deterministic schedule before it is admitted.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};
use vela_types::{
    Address, Block, ConsensusParams, PunishReason, Timestamp, TxKind, TxPayload,
};

use crate::agent::{Agent, Deposit};
use crate::chain::Chain;
use crate::error::{ConsensusError, VerifyFailure};
use crate::punish::{PunishEntry, PunishKind};
use crate::rewards;
use crate::round::{MeetingMember, MeetingRound};
use crate::scheduler::RoundManager;

/// Result of a successful block verification: the round the block belongs
/// to and the member that packed it.
#[derive(Clone, Debug)]
pub struct VerifiedSlot {
    pub round: MeetingRound,
    pub member: MeetingMember,
}

/// A chain and the machinery to verify and apply blocks to it.
#[derive(Debug)]
pub struct ChainContainer {
    pub chain: Chain,
    params: ConsensusParams,
    // Interior mutability: verification is logically read-only on the
    // chain but may fault rounds into the cache.
    rounds: Mutex<RoundManager>,
}

impl Clone for ChainContainer {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            params: self.params.clone(),
            rounds: Mutex::new(self.lock_rounds().clone()),
        }
    }
}

impl PartialEq for ChainContainer {
    fn eq(&self, other: &Self) -> bool {
        self.chain.id == other.chain.id
    }
}

impl ChainContainer {
    pub fn new(chain: Chain, params: ConsensusParams) -> Self {
        let rounds = RoundManager::new(params.clone());
        Self {
            chain,
            params,
            rounds: Mutex::new(rounds),
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    fn lock_rounds(&self) -> std::sync::MutexGuard<'_, RoundManager> {
        self.rounds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Applying blocks ──────────────────────────────────────────────────

    /// Append a block, replaying its special transactions into the
    /// working set. The block must link onto the current tip.
    pub fn add_block(&mut self, block: Block) -> Result<(), ConsensusError> {
        if !self.chain.tip().is_parent_of(&block.header) {
            return Err(VerifyFailure::BadLinkage.into());
        }
        self.apply_special_txs(&block);
        self.chain.push_block(block);
        Ok(())
    }

    /// Remove the tip block, reversing its working-set effects. Returns
    /// false (and leaves the chain untouched) if `block` is not the tip.
    pub fn rollback(&mut self, block: &Block) -> bool {
        if self.chain.tip().hash != block.header.hash {
            warn!(
                height = block.height(),
                hash = %block.hash(),
                "rollback target is not the chain tip"
            );
            return false;
        }
        let height = block.height();

        self.chain.yellow_punishes.retain(|p| p.height != height);
        self.chain.red_punishes.retain(|p| p.height != height);
        for agent in &mut self.chain.agents {
            if agent.del_height == Some(height) {
                agent.del_height = None;
            }
        }
        for deposit in &mut self.chain.deposits {
            if deposit.del_height == Some(height) {
                deposit.del_height = None;
            }
        }
        self.chain.agents.retain(|a| a.register_height != height);
        self.chain.deposits.retain(|d| d.register_height != height);

        self.chain.blocks.pop();
        self.chain.headers.pop();
        if let Some(last) = self.chain.headers.last() {
            self.chain.end_header = last.clone();
            let tip_round = last.round.round_index;
            self.lock_rounds().reset_after_rollback(tip_round);
        }
        true
    }

    fn apply_special_txs(&mut self, block: &Block) {
        let height = block.height();
        for tx in &block.txs {
            match &tx.payload {
                TxPayload::RegisterAgent {
                    agent_address,
                    packing_address,
                    own_stake,
                    commission_bps,
                } => {
                    self.chain.agents.push(Agent {
                        agent_address: *agent_address,
                        packing_address: *packing_address,
                        own_stake: *own_stake,
                        commission_bps: *commission_bps,
                        register_tx: tx.hash,
                        register_height: height,
                        time: tx.time,
                        del_height: None,
                    });
                }
                TxPayload::JoinConsensus {
                    depositor,
                    agent_tx,
                    amount,
                } => {
                    self.chain.deposits.push(Deposit {
                        depositor: *depositor,
                        agent_tx: *agent_tx,
                        join_tx: tx.hash,
                        amount: *amount,
                        register_height: height,
                        time: tx.time,
                        del_height: None,
                    });
                }
                TxPayload::CancelDeposit { join_tx } => {
                    if let Some(d) = self
                        .chain
                        .deposits
                        .iter_mut()
                        .find(|d| d.join_tx == *join_tx && d.is_alive())
                    {
                        d.del_height = Some(height);
                    }
                }
                TxPayload::StopAgent { register_tx } => {
                    if let Some(a) = self
                        .chain
                        .agents
                        .iter_mut()
                        .find(|a| a.register_tx == *register_tx && a.is_alive())
                    {
                        a.del_height = Some(height);
                    }
                }
                TxPayload::RedPunish { address, reason, .. } => {
                    debug!(agent = %address, ?reason, height, "red punish applied");
                    self.chain.red_punishes.push(PunishEntry {
                        address: *address,
                        height,
                        round_index: block.header.round.round_index,
                        time: tx.time,
                        kind: PunishKind::Red,
                    });
                    self.cascade_red_punish(*address, height);
                }
                TxPayload::YellowPunish { addresses } => {
                    for address in addresses {
                        self.chain.yellow_punishes.push(PunishEntry {
                            address: *address,
                            height,
                            round_index: block.header.round.round_index,
                            time: tx.time,
                            kind: PunishKind::Yellow,
                        });
                    }
                }
                TxPayload::CoinBase { .. } | TxPayload::Transfer { .. } => {}
            }
        }
    }

    /// A red punish deactivates the agent and every live deposit on it.
    fn cascade_red_punish(&mut self, address: Address, height: u64) {
        let mut punished_tx = None;
        if let Some(agent) = self
            .chain
            .agents
            .iter_mut()
            .find(|a| a.agent_address == address && a.is_alive())
        {
            agent.del_height = Some(height);
            punished_tx = Some(agent.register_tx);
        }
        if let Some(register_tx) = punished_tx {
            for deposit in &mut self.chain.deposits {
                if deposit.agent_tx == register_tx && deposit.is_alive() {
                    deposit.del_height = Some(height);
                }
            }
        }
    }

    // ── Verification ─────────────────────────────────────────────────────

    /// Verify a candidate block against the chain and its schedule.
    ///
    /// `downloading` relaxes the wall-clock checks during initial sync.
    /// `check_coinbase` additionally recomputes the reward distribution;
    /// fork-replay sandboxes defer that until the whole candidate is known.
    pub fn verify_block(
        &self,
        block: &Block,
        now: Timestamp,
        downloading: bool,
        check_coinbase: bool,
    ) -> Result<VerifiedSlot, ConsensusError> {
        let tip = self.chain.tip().clone();
        let header = &block.header;

        if !tip.is_parent_of(header) {
            return Err(VerifyFailure::BadLinkage.into());
        }
        if header.round.slot_key() <= tip.round.slot_key() {
            return Err(VerifyFailure::SlotNotMonotonic.into());
        }

        let round = self.reconcile_round(block, now, downloading)?;

        if round.index != header.round.round_index
            || round.start_time != header.round.round_start_time
        {
            return Err(VerifyFailure::RoundMismatch.into());
        }
        if round.member_count() != header.round.member_count {
            return Err(VerifyFailure::MemberCountMismatch.into());
        }
        let member = round
            .member(header.round.packing_index)
            .ok_or(VerifyFailure::NoSuchSlot(header.round.packing_index))?
            .clone();
        if member.packing_address != header.packing_address {
            return Err(VerifyFailure::WrongPacker.into());
        }
        if member.pack_end_time != header.time {
            return Err(VerifyFailure::WrongSlotTime.into());
        }

        self.verify_base_txs(block, &round, &member, check_coinbase)?;

        Ok(VerifiedSlot { round, member })
    }

    /// Verify, then apply. The round a successful verification produced is
    /// cached so consecutive blocks of one round verify against the same
    /// object.
    pub fn verify_and_add_block(
        &mut self,
        block: Block,
        now: Timestamp,
        downloading: bool,
        check_coinbase: bool,
    ) -> Result<VerifiedSlot, ConsensusError> {
        let slot = self.verify_block(&block, now, downloading, check_coinbase)?;
        self.add_block(block)?;
        Ok(slot)
    }

    /// Resolve the round a block claims to belong to: advance the tracked
    /// round forward through the scheduler, or regress into the cached
    /// history.
    fn reconcile_round(
        &self,
        block: &Block,
        now: Timestamp,
        downloading: bool,
    ) -> Result<MeetingRound, ConsensusError> {
        let header = &block.header;
        let mut rounds = self.lock_rounds();
        let current = match rounds.current() {
            Some(r) => r.clone(),
            None => rounds.init_round(&self.chain)?,
        };

        if header.round.round_index > current.index {
            // A round cannot start later than the clock says, even during
            // download; only the slot-end check below is download-relaxed.
            if header.round.round_start_time > now {
                return Err(VerifyFailure::RoundInFuture.into());
            }
            let slot_end = header
                .round
                .round_start_time
                .plus(header.round.packing_index as u64 * self.params.block_interval_secs);
            if slot_end > now && !downloading {
                return Err(VerifyFailure::SlotInFuture.into());
            }
            if header.round.round_start_time < current.end_time {
                return Err(VerifyFailure::RoundStartBeforeTracked.into());
            }
            let next = rounds.scheduler().compute_round(
                &self.chain,
                header.round.round_index,
                header.round.round_start_time,
            )?;
            rounds.push(next.clone());
            return Ok(next);
        }

        if header.round.round_index < current.index {
            return rounds
                .round_by_index(header.round.round_index)
                .cloned()
                .ok_or_else(|| VerifyFailure::UnknownRound(header.round.round_index).into());
        }

        Ok(current)
    }

    /// Check the block's protocol-generated transactions: the leading
    /// coinbase, the yellow-punish list, and the derived red punishes.
    fn verify_base_txs(
        &self,
        block: &Block,
        round: &MeetingRound,
        member: &MeetingMember,
        check_coinbase: bool,
    ) -> Result<(), ConsensusError> {
        let header = &block.header;

        if block.coinbase().is_none() {
            return Err(VerifyFailure::MissingCoinbase.into());
        }
        if block.txs[1..].iter().any(|t| t.kind() == TxKind::CoinBase) {
            return Err(VerifyFailure::DuplicateCoinbase.into());
        }

        let yellows: Vec<&Vec<Address>> = block
            .txs
            .iter()
            .filter_map(|t| match &t.payload {
                TxPayload::YellowPunish { addresses } => Some(addresses),
                _ => None,
            })
            .collect();
        if yellows.len() > 1 {
            return Err(VerifyFailure::DuplicateYellowPunish.into());
        }

        let tip = self.chain.tip();
        let pre_round = if tip.round.round_index != round.index {
            self.lock_rounds().round_by_index(tip.round.round_index).cloned()
        } else {
            None
        };
        let expected = rewards::expected_yellow_addresses(
            &tip.round,
            round,
            header.round.packing_index,
            pre_round.as_ref(),
        );
        let actual: &[Address] = yellows.first().map(|v| v.as_slice()).unwrap_or(&[]);
        if actual != expected.as_slice() {
            return Err(VerifyFailure::YellowPunishMismatch.into());
        }

        // Members just yellow-punished past the credit floor must be red
        // punished in the same block, and nobody else may be.
        let mut expected_reds: Vec<Address> = expected
            .iter()
            .filter(|addr| {
                round
                    .member_by_agent_address(addr)
                    .map_or(false, |m| m.credit <= self.params.red_punish_credit_threshold)
            })
            .copied()
            .collect();
        expected_reds.sort();
        expected_reds.dedup();
        let mut actual_reds: Vec<Address> = block
            .txs
            .iter()
            .filter_map(|t| match &t.payload {
                TxPayload::RedPunish {
                    address,
                    reason: PunishReason::TooMuchYellowPunish,
                    ..
                } => Some(*address),
                _ => None,
            })
            .collect();
        actual_reds.sort();
        actual_reds.dedup();
        if actual_reds != expected_reds {
            return Err(VerifyFailure::RedPunishMismatch.into());
        }

        if check_coinbase {
            self.verify_coinbase(block, member)?;
        }
        Ok(())
    }

    /// Recompute the reward split and compare against the block's coinbase.
    pub fn verify_coinbase(
        &self,
        block: &Block,
        member: &MeetingMember,
    ) -> Result<(), ConsensusError> {
        let fees: u128 = block.txs.iter().map(|t| t.fee()).sum();
        let expected =
            rewards::expected_coinbase(&self.chain, &self.params, member, block.height(), fees);
        let actual = match block.coinbase().map(|t| &t.payload) {
            Some(TxPayload::CoinBase { outputs }) => outputs,
            _ => return Err(VerifyFailure::MissingCoinbase.into()),
        };
        if *actual != expected {
            return Err(VerifyFailure::CoinbaseMismatch.into());
        }
        Ok(())
    }

    // ── Fork support ─────────────────────────────────────────────────────

    /// A sandbox copy of this container rolled back to just before `fork`
    /// branches off. Returns `None` if the fork point is not on this chain
    /// or the rollback runs past the retained window.
    pub fn before_fork_chain(&self, fork: &Chain) -> Option<ChainContainer> {
        let fork_parent = fork.start_header.pre_hash;
        self.chain.find_header(&fork_parent)?;

        let mut sandbox = ChainContainer::new(self.chain.duplicate(), self.params.clone());
        while sandbox.chain.tip().hash != fork_parent {
            if sandbox.chain.blocks.len() <= 1 {
                return None;
            }
            let tip_block = sandbox.chain.blocks.last()?.clone();
            if !sandbox.rollback(&tip_block) {
                return None;
            }
        }
        if sandbox.lock_rounds().init_round(&sandbox.chain).is_err() {
            return None;
        }
        Some(sandbox)
    }

    /// The blocks of this chain strictly after `fork`'s branch point, as a
    /// standalone chain. `None` when the tip itself is the branch point.
    pub fn after_fork_chain(&self, fork: &Chain) -> Option<Chain> {
        let pos = self.chain.position_of(&fork.start_header.pre_hash)?;
        let suffix: Vec<Block> = self.chain.blocks.get(pos + 1..)?.to_vec();
        Chain::from_blocks(suffix)
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Drop invalidated agents/deposits and punish entries that fell out
    /// of the retention window, and trim the in-memory block window.
    pub fn prune_working_set(&mut self) {
        let height = self.chain.height();
        let keep_from = height.saturating_sub(self.params.retention_heights);
        self.chain
            .agents
            .retain(|a| a.del_height.map_or(true, |del| del >= keep_from));
        self.chain
            .deposits
            .retain(|d| d.del_height.map_or(true, |del| del >= keep_from));
        self.chain.yellow_punishes.retain(|p| p.height >= keep_from);
        self.chain.red_punishes.retain(|p| p.height >= keep_from);

        // Blocks and headers prune together so positional lookups stay
        // aligned; fork points older than the window are unreachable, but
        // such forks expire before they could switch anyway.
        let window = self.params.master_block_window.max(1);
        if self.chain.blocks.len() > window {
            let drop = self.chain.blocks.len() - window;
            self.chain.blocks.drain(..drop);
            self.chain.headers.drain(..drop);
            if let Some(first) = self.chain.headers.first() {
                self.chain.start_header = first.clone();
            }
        }
    }

    /// The round covering `now`, advancing the tracked round in real time.
    pub fn current_round(
        &self,
        now: Timestamp,
        real_time: bool,
    ) -> Result<MeetingRound, ConsensusError> {
        let mut rounds = self.lock_rounds();
        Ok(rounds.current_round(&self.chain, now, real_time)?)
    }
}
