//! Block ingestion pipeline.
//!
//! Every block a peer hands us flows through [`BlockProcess::ingest`]:
//! cheap gates first (future clock, duplicates, protocol version), then
//! structural checks and the equivocation and double-spend tripwires,
//! then either full master-chain admission or routing into the
//! fork/orphan working set.

use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use vela_consensus::{ChainManager, ForkRouting};
use vela_types::{
    Block, ConsensusParams, PunishReason, Timestamp, Transaction, TxHash, TxPayload,
};

use crate::error::NodeError;
use crate::services::Services;
use crate::tx_pool::TxMemoryPool;

/// What became of an ingested block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Appended to the master chain and persisted.
    Accepted,
    /// Timestamped too far in the future; dropped without prejudice.
    Discarded,
    /// Already known.
    Duplicate,
    /// Did not extend the master tip; filed for reconciliation.
    Routed(ForkRouting),
    /// Its packer misbehaved; a red-punish transaction was pooled.
    Punished(TxHash),
    /// Failed verification against the master chain.
    Rejected(String),
}

pub struct BlockProcess {
    services: Services,
    pool: Arc<Mutex<TxMemoryPool>>,
    params: ConsensusParams,
}

impl BlockProcess {
    pub fn new(services: Services, pool: Arc<Mutex<TxMemoryPool>>, params: ConsensusParams) -> Self {
        Self {
            services,
            pool,
            params,
        }
    }

    /// Run a block through the pipeline against the given chain state.
    ///
    /// `downloading` relaxes wall-clock checks during initial sync.
    pub fn ingest(
        &self,
        manager: &mut ChainManager,
        block: Block,
        now: Timestamp,
        downloading: bool,
    ) -> Result<IngestOutcome, NodeError> {
        let header = &block.header;

        if header.time > now.plus(self.params.discard_future_secs) {
            warn!(
                height = header.height,
                time = %header.time,
                "discarding block from the future"
            );
            return Ok(IngestOutcome::Discarded);
        }
        if manager.contains_block(&header.hash) {
            return Ok(IngestOutcome::Duplicate);
        }

        let version = header.round.protocol_version;
        if version < self.services.protocol.active_version() {
            debug!(
                height = header.height,
                version, "discarding block from an outdated protocol"
            );
            return Ok(IngestOutcome::Discarded);
        }
        for tx in &block.txs {
            if !self.services.protocol.supports(version, tx.kind()) {
                return Ok(IngestOutcome::Rejected(format!(
                    "protocol v{version} does not admit {:?} transactions",
                    tx.kind()
                )));
            }
        }

        if let Err(e) = self.services.verification.verify_structure(&block) {
            debug!(height = header.height, error = %e, "malformed block");
            return Ok(IngestOutcome::Rejected(e.to_string()));
        }
        if let Some(evidence) = self.services.verification.bifurcation_evidence(header) {
            return Ok(self.punish_packer(manager, &block, PunishReason::Bifurcation, evidence));
        }

        if let Some(evidence) = self.services.ledger.double_spend_evidence(&block) {
            return Ok(self.punish_packer(manager, &block, PunishReason::DoubleSpend, evidence));
        }

        if manager.master.chain.tip().is_parent_of(header) {
            return self.add_to_master(manager, block, now, downloading);
        }
        Ok(IngestOutcome::Routed(manager.route_fork_block(block)))
    }

    fn add_to_master(
        &self,
        manager: &mut ChainManager,
        block: Block,
        now: Timestamp,
        downloading: bool,
    ) -> Result<IngestOutcome, NodeError> {
        if let Err(e) = verify_block_txs(&self.services, &block) {
            return Ok(IngestOutcome::Rejected(e.to_string()));
        }
        match manager
            .master
            .verify_and_add_block(block.clone(), now, downloading, true)
        {
            Ok(slot) => {
                if let Err(e) = self.services.blocks.save_block(&block) {
                    // Chain state and storage must not diverge.
                    manager.master.rollback(&block);
                    return Err(e.into());
                }
                self.lock_pool().remove_confirmed(&block);
                if !downloading {
                    self.services.blocks.forward_block(&block.hash());
                }
                debug!(
                    height = block.height(),
                    round = slot.round.index,
                    slot = slot.member.packing_index,
                    "block accepted"
                );
                Ok(IngestOutcome::Accepted)
            }
            Err(e) => Ok(IngestOutcome::Rejected(e.to_string())),
        }
    }

    /// Synthesize a red punish against the agent behind the block's packer
    /// and pool it for inclusion in an upcoming block. A packer with no
    /// live agent on the master chain cannot be punished on chain, so the
    /// block is rejected outright instead.
    fn punish_packer(
        &self,
        manager: &ChainManager,
        block: &Block,
        reason: PunishReason,
        evidence: Vec<u8>,
    ) -> IngestOutcome {
        let packer = block.header.packing_address;
        let Some(agent_address) = manager
            .master
            .chain
            .agents
            .iter()
            .find(|a| a.packing_address == packer && a.is_alive())
            .map(|a| a.agent_address)
        else {
            warn!(
                packer = %packer,
                block = %block.hash(),
                ?reason,
                "misbehaving packer has no live agent, rejecting block"
            );
            return IngestOutcome::Rejected(format!(
                "packer {packer} of misbehaving block is not a live agent"
            ));
        };

        // Derived from the offending block, and stamped with its header
        // time, so every node that sees the block pools the identical
        // punish and repeated relays collapse to one.
        let hash = TxHash::new(*block.hash().as_bytes());
        let punish = Transaction {
            hash,
            time: block.header.time,
            signature: Vec::new(),
            payload: TxPayload::RedPunish {
                address: agent_address,
                reason,
                evidence,
            },
        };
        info!(
            agent = %agent_address,
            block = %block.hash(),
            ?reason,
            "misbehaving packer, red punish pooled"
        );
        self.lock_pool().add(punish);
        IngestOutcome::Punished(hash)
    }

    fn lock_pool(&self) -> std::sync::MutexGuard<'_, TxMemoryPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Transaction-level checks shared by ingestion and fork replay:
/// signatures in parallel, then coin data, then contract execution.
pub(crate) fn verify_block_txs(services: &Services, block: &Block) -> Result<(), NodeError> {
    let bad: Option<TxHash> = block
        .txs
        .par_iter()
        .filter(|tx| !tx.is_system())
        .find_map_any(|tx| {
            if services.txs.verify_signature(tx) {
                None
            } else {
                Some(tx.hash)
            }
        });
    if let Some(hash) = bad {
        return Err(NodeError::InvalidBlock(format!(
            "invalid signature on transaction {hash}"
        )));
    }
    services.ledger.verify_block_coins(block)?;
    services.contracts.execute_block(block)?;
    services.txs.conflict_detect(&block.txs)?;
    Ok(())
}
