//! Fork reconciliation.
//!
//! One periodic cycle over the chain state: reconnect orphans, switch to
//! a better fork when one has outgrown the master by the configured
//! margin, expire branches that fell too far behind, and prune the master
//! working set. A switch is all-or-nothing: any failure mid-way restores
//! the master chain and storage to their pre-switch state.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};
use vela_consensus::{Chain, ChainManager};
use vela_types::{Block, ConsensusParams, Timestamp};

use crate::block_process::verify_block_txs;
use crate::error::NodeError;
use crate::services::Services;
use crate::tx_pool::TxMemoryPool;

pub struct ForkChainProcess {
    services: Services,
    pool: Arc<Mutex<TxMemoryPool>>,
    params: ConsensusParams,
}

impl ForkChainProcess {
    pub fn new(services: Services, pool: Arc<Mutex<TxMemoryPool>>, params: ConsensusParams) -> Self {
        Self {
            services,
            pool,
            params,
        }
    }

    /// Run one reconciliation cycle.
    pub fn run_cycle(&self, manager: &mut ChainManager, now: Timestamp) -> Result<(), NodeError> {
        self.promote_orphans(manager);
        while self.try_switch(manager, now)? {}
        self.expire_stale(manager);
        manager.master.prune_working_set();

        let alive_agents = manager
            .master
            .chain
            .agents
            .iter()
            .filter(|a| a.is_alive())
            .count();
        info!(
            target: "vela::status",
            height = manager.best_height(),
            forks = manager.forks.len(),
            orphans = manager.orphans.len(),
            agents = alive_agents,
            "reconciliation cycle complete"
        );
        Ok(())
    }

    // ── Orphan handling ──────────────────────────────────────────────────

    /// Merge orphan chains that link to each other, then promote orphans
    /// whose parent turned up on the master or a fork.
    fn promote_orphans(&self, manager: &mut ChainManager) {
        loop {
            let mut merged = false;
            'scan: for i in 0..manager.orphans.len() {
                for j in 0..manager.orphans.len() {
                    if i != j
                        && manager.orphans[i]
                            .tip()
                            .is_parent_of(&manager.orphans[j].start_header)
                    {
                        let child = manager.orphans.remove(j);
                        let parent = if j < i { i - 1 } else { i };
                        for block in child.blocks {
                            manager.orphans[parent].push_block(block);
                        }
                        merged = true;
                        break 'scan;
                    }
                }
            }
            if !merged {
                break;
            }
        }

        let mut i = 0;
        while i < manager.orphans.len() {
            let pre = manager.orphans[i].start_header.pre_hash;
            let parent_id = if manager.master.chain.find_header(&pre).is_some() {
                Some(manager.master.chain.id)
            } else {
                manager
                    .forks
                    .iter()
                    .find(|f| f.find_header(&pre).is_some())
                    .map(|f| f.id)
            };
            match parent_id {
                Some(pid) => {
                    let mut chain = manager.orphans.remove(i);
                    chain.parent_id = Some(pid);
                    info!(
                        chain = chain.id,
                        parent = pid,
                        height = chain.start_height(),
                        "orphan chain reconnected"
                    );
                    manager.forks.push(chain);
                }
                None => i += 1,
            }
        }
    }

    // ── Chain switching ──────────────────────────────────────────────────

    /// Switch to the best qualifying fork, if any. Returns true when the
    /// chain state changed (switched, or an invalid fork was discarded),
    /// so the caller loops until quiescent.
    fn try_switch(&self, manager: &mut ChainManager, now: Timestamp) -> Result<bool, NodeError> {
        let master_tip = manager.best_header().clone();
        let mut best: Option<(u64, Chain)> = None;
        for fork in &manager.forks {
            let Some(full) = resolve_full(manager, fork) else {
                continue;
            };
            if !beats_master(&full, &master_tip, self.params.chain_switch_margin) {
                continue;
            }
            let replace = match &best {
                Some((_, current)) => prefer(&full, current),
                None => true,
            };
            if replace {
                best = Some((fork.id, full));
            }
        }
        let Some((fork_id, full)) = best else {
            return Ok(false);
        };

        if self.switch_to(manager, &full, now)? {
            info!(
                height = manager.best_height(),
                fork = fork_id,
                "switched master to a longer chain"
            );
        } else {
            warn!(fork = fork_id, "fork failed replay, discarding");
        }
        // Either way the fork is consumed; loop again for the next one.
        manager.remove_fork(fork_id);
        Ok(true)
    }

    /// Perform the switch. Returns `Ok(false)` when the candidate failed
    /// verification (the master is left exactly as it was).
    fn switch_to(
        &self,
        manager: &mut ChainManager,
        full: &Chain,
        now: Timestamp,
    ) -> Result<bool, NodeError> {
        // Probe the full candidate in a sandbox first. Coinbase checks are
        // deferred to the real replay where storage effects are applied.
        let Some(mut sandbox) = manager.master.before_fork_chain(full) else {
            return Ok(false);
        };
        for block in &full.blocks {
            if verify_block_txs(&self.services, block).is_err() {
                return Ok(false);
            }
            if sandbox
                .verify_and_add_block(block.clone(), now, true, false)
                .is_err()
            {
                return Ok(false);
            }
        }

        // Roll the master back to the branch point, storage included.
        // A failure anywhere restores whatever was already rolled back.
        let suffix = manager.master.after_fork_chain(full);
        let mut rolled: Vec<Block> = Vec::new();
        if let Some(sfx) = &suffix {
            for block in sfx.blocks.iter().rev() {
                if !manager.master.rollback(block) {
                    self.restore_rolled_back(manager, &rolled);
                    warn!(height = block.height(), "rollback halted mid-switch");
                    return Ok(false);
                }
                if let Err(e) = self.services.blocks.rollback_block(block) {
                    // Storage kept the block; put the chain back in step
                    // with it before restoring the rest.
                    let _ = manager.master.add_block(block.clone());
                    self.restore_rolled_back(manager, &rolled);
                    warn!(height = block.height(), error = %e, "storage rollback failed mid-switch");
                    return Err(e.into());
                }
                rolled.push(block.clone());
            }
        }

        // Replay the candidate, re-running the full per-transaction checks
        // now that storage effects are applied.
        let mut replayed: Vec<Block> = Vec::new();
        for block in &full.blocks {
            let admitted = verify_block_txs(&self.services, block).and_then(|_| {
                manager
                    .master
                    .verify_and_add_block(block.clone(), now, true, true)
                    .map(|_| ())
                    .map_err(NodeError::from)
            });
            if let Err(e) = &admitted {
                debug!(height = block.height(), error = %e, "replay rejected block");
                self.unwind_replay(manager, &replayed, &rolled);
                return Ok(false);
            }
            if let Err(e) = self.services.blocks.save_block(block) {
                manager.master.rollback(block);
                self.unwind_replay(manager, &replayed, &rolled);
                return Err(e.into());
            }
            replayed.push(block.clone());
        }

        // The displaced suffix stays around as a fork until it expires.
        let mut pool = self.lock_pool();
        for block in &rolled {
            pool.restore_from(block);
        }
        for block in &full.blocks {
            pool.remove_confirmed(block);
        }
        drop(pool);
        if let Some(mut sfx) = suffix {
            sfx.parent_id = Some(manager.master.chain.id);
            manager.forks.push(sfx);
        }
        Ok(true)
    }

    /// Reverse a partial candidate replay, then restore the displaced
    /// master suffix. Best effort by intent: the switch already failed.
    fn unwind_replay(&self, manager: &mut ChainManager, replayed: &[Block], rolled: &[Block]) {
        for b in replayed.iter().rev() {
            manager.master.rollback(b);
            if let Err(e) = self.services.blocks.rollback_block(b) {
                warn!(height = b.height(), error = %e, "storage rollback failed during unwind");
            }
        }
        self.restore_rolled_back(manager, rolled);
    }

    /// Re-apply blocks removed during a failed switch, oldest first.
    fn restore_rolled_back(&self, manager: &mut ChainManager, rolled: &[Block]) {
        for block in rolled.iter().rev() {
            if manager.master.add_block(block.clone()).is_err() {
                warn!(
                    height = block.height(),
                    "could not restore block after failed switch"
                );
                return;
            }
            if let Err(e) = self.services.blocks.save_block(block) {
                warn!(height = block.height(), error = %e, "re-save failed");
            }
        }
    }

    // ── Expiry ───────────────────────────────────────────────────────────

    /// Drop forks and orphans that fell further behind the master tip
    /// than the configured lag.
    fn expire_stale(&self, manager: &mut ChainManager) {
        let master_height = manager.best_height();
        let lag = self.params.max_fork_lag;
        let live = |chain: &Chain| master_height.saturating_sub(chain.height()) <= lag;
        manager.forks.retain(|c| {
            if !live(c) {
                debug!(chain = c.id, height = c.height(), "fork expired");
            }
            live(c)
        });
        manager.orphans.retain(live);
    }

    fn lock_pool(&self) -> std::sync::MutexGuard<'_, TxMemoryPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolve a fork into the contiguous block run from its master branch
/// point to its tip, splicing in parent-fork prefixes for forks of forks.
fn resolve_full(manager: &ChainManager, fork: &Chain) -> Option<Chain> {
    let master_id = manager.master.chain.id;
    let mut segments: Vec<Vec<Block>> = vec![fork.blocks.clone()];
    let mut current = fork;
    let mut depth = 0;
    while current.parent_id != Some(master_id) {
        let pid = current.parent_id?;
        let parent = manager.forks.iter().find(|c| c.id == pid)?;
        let pos = parent.position_of(&current.start_header.pre_hash)?;
        segments.push(parent.blocks.get(..=pos)?.to_vec());
        current = parent;
        depth += 1;
        if depth > 64 {
            return None;
        }
    }
    manager
        .master
        .chain
        .find_header(&current.start_header.pre_hash)?;
    let mut blocks = Vec::new();
    for segment in segments.into_iter().rev() {
        blocks.extend(segment);
    }
    Chain::from_blocks(blocks)
}

/// Whether a candidate chain displaces the master: a height lead past the
/// margin, or an at-least-equal height with an earlier tip, or the smaller
/// tip hash at exactly equal height. Every node evaluates the same rule,
/// so equal-height splits resolve without communication.
fn beats_master(candidate: &Chain, master_tip: &vela_types::BlockHeader, margin: u64) -> bool {
    let tip = candidate.tip();
    if tip.height > master_tip.height + margin {
        return true;
    }
    if tip.height >= master_tip.height && tip.time < master_tip.time {
        return true;
    }
    tip.height == master_tip.height && tip.hash < master_tip.hash
}

/// Fork preference: height first, then earlier tip time, then the
/// lexicographically smaller tip hash. Total, so all nodes agree.
fn prefer(a: &Chain, b: &Chain) -> bool {
    if a.height() != b.height() {
        return a.height() > b.height();
    }
    if a.tip().time != b.tip().time {
        return a.tip().time < b.tip().time;
    }
    a.tip().hash < b.tip().hash
}
