//! Chain-state container: one master chain, competing forks, orphans.
//!
//! The manager owns no verification logic. It answers "where does this
//! block belong" for blocks that failed to extend the master tip, and
//! gives the reconciliation loop a single structure to lock.

use tracing::{debug, info};
use vela_types::{Block, BlockHash, BlockHeader, ConsensusParams};

use crate::chain::Chain;
use crate::container::ChainContainer;

/// Where a non-master block ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkRouting {
    /// Already known on the master, a fork, or an orphan.
    Duplicate,
    /// Appended to the tip of an existing fork (chain id).
    ExtendedFork(u64),
    /// Started a new fork chain (chain id).
    NewFork(u64),
    /// No known parent anywhere; held as an orphan (chain id).
    Orphaned(u64),
}

/// All chain state of one node.
#[derive(Debug)]
pub struct ChainManager {
    pub master: ChainContainer,
    pub forks: Vec<Chain>,
    pub orphans: Vec<Chain>,
}

impl ChainManager {
    pub fn new(master: ChainContainer) -> Self {
        Self {
            master,
            forks: Vec::new(),
            orphans: Vec::new(),
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        self.master.params()
    }

    pub fn best_height(&self) -> u64 {
        self.master.chain.height()
    }

    pub fn best_header(&self) -> &BlockHeader {
        self.master.chain.tip()
    }

    pub fn best_block(&self) -> Option<&Block> {
        self.master.chain.blocks.last()
    }

    /// Whether a block hash is known anywhere: master, fork, or orphan.
    pub fn contains_block(&self, hash: &BlockHash) -> bool {
        self.master.chain.find_header(hash).is_some()
            || self.forks.iter().any(|c| c.find_header(hash).is_some())
            || self.orphans.iter().any(|c| c.find_header(hash).is_some())
    }

    /// File a block that does not extend the master tip.
    ///
    /// Routing order mirrors likelihood: extending a tracked fork is the
    /// common case during a reorg, a brand-new branch point the rare one,
    /// a parentless block the fallback.
    pub fn route_fork_block(&mut self, block: Block) -> ForkRouting {
        let header = &block.header;
        if self.contains_block(&header.hash) {
            return ForkRouting::Duplicate;
        }

        // Extend a fork whose tip is the parent.
        if let Some(fork) = self
            .forks
            .iter_mut()
            .find(|c| c.tip().is_parent_of(header))
        {
            let id = fork.id;
            fork.push_block(block);
            debug!(chain = id, "extended fork chain");
            return ForkRouting::ExtendedFork(id);
        }

        // Branch off a fork interior: fork of a fork.
        if let Some(parent_id) = self
            .forks
            .iter()
            .find(|c| c.find_header(&header.pre_hash).is_some())
            .map(|c| c.id)
        {
            let mut chain = Chain::from_block(block);
            chain.parent_id = Some(parent_id);
            let id = chain.id;
            info!(chain = id, parent = parent_id, "new fork off a fork");
            self.forks.push(chain);
            return ForkRouting::NewFork(id);
        }

        // Branch off the master below its tip.
        if self.master.chain.find_header(&header.pre_hash).is_some() {
            let mut chain = Chain::from_block(block);
            chain.parent_id = Some(self.master.chain.id);
            let id = chain.id;
            info!(
                chain = id,
                height = chain.start_height(),
                "new fork off the master chain"
            );
            self.forks.push(chain);
            return ForkRouting::NewFork(id);
        }

        // Extend an orphan whose tip is the parent, else hold a new one.
        if let Some(orphan) = self
            .orphans
            .iter_mut()
            .find(|c| c.tip().is_parent_of(header))
        {
            let id = orphan.id;
            orphan.push_block(block);
            return ForkRouting::Orphaned(id);
        }
        let chain = Chain::from_block(block);
        let id = chain.id;
        debug!(chain = id, "holding orphan block");
        self.orphans.push(chain);
        ForkRouting::Orphaned(id)
    }

    pub fn remove_fork(&mut self, id: u64) -> Option<Chain> {
        let pos = self.forks.iter().position(|c| c.id == id)?;
        Some(self.forks.remove(pos))
    }

    pub fn remove_orphan(&mut self, id: u64) -> Option<Chain> {
        let pos = self.orphans.iter().position(|c| c.id == id)?;
        Some(self.orphans.remove(pos))
    }
}
