//! Node wiring: chain state behind one lock, ingestion on demand, fork
//! reconciliation on a timer.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vela_consensus::{Chain, ChainContainer, ChainManager, MeetingRound};
use vela_types::{Block, BlockHeader, ConsensusParams, Timestamp};

use crate::block_process::{BlockProcess, IngestOutcome};
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::fork_process::ForkChainProcess;
use crate::services::Services;
use crate::tx_pool::TxMemoryPool;

/// A running Vela node: chain state plus the two pipelines over it.
///
/// All chain access funnels through one async lock; the ingestion path
/// and the reconciliation timer never interleave mid-operation.
pub struct VelaNode {
    config: NodeConfig,
    state: Arc<Mutex<ChainManager>>,
    pool: Arc<StdMutex<TxMemoryPool>>,
    block_process: BlockProcess,
    fork_process: ForkChainProcess,
}

impl VelaNode {
    /// Wire a node from configuration, collaborators, and a genesis block.
    /// A node restarting over non-empty storage resumes its master chain
    /// from stored blocks instead.
    pub fn new(config: NodeConfig, services: Services, genesis: Block) -> Self {
        let params = config.consensus.clone();
        let master = resume_master(&services, genesis, &params);
        let manager = ChainManager::new(master);
        let pool = Arc::new(StdMutex::new(TxMemoryPool::new()));
        let block_process = BlockProcess::new(services.clone(), Arc::clone(&pool), params.clone());
        let fork_process = ForkChainProcess::new(services, Arc::clone(&pool), params);
        info!(height = manager.best_height(), "node state initialized");
        Self {
            config,
            state: Arc::new(Mutex::new(manager)),
            pool,
            block_process,
            fork_process,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<StdMutex<TxMemoryPool>> {
        &self.pool
    }

    /// Feed a block from the network into the ingestion pipeline.
    pub async fn ingest_block(
        &self,
        block: Block,
        now: Timestamp,
        downloading: bool,
    ) -> Result<IngestOutcome, NodeError> {
        let mut manager = self.state.lock().await;
        self.block_process.ingest(&mut manager, block, now, downloading)
    }

    pub async fn best_height(&self) -> u64 {
        self.state.lock().await.best_height()
    }

    pub async fn best_header(&self) -> BlockHeader {
        self.state.lock().await.best_header().clone()
    }

    /// The meeting round covering `now` on the master chain.
    pub async fn current_round(&self, now: Timestamp) -> Result<MeetingRound, NodeError> {
        let manager = self.state.lock().await;
        Ok(manager.master.current_round(now, true)?)
    }

    /// Run one reconciliation cycle immediately (tests, shutdown flush).
    pub async fn reconcile_once(&self, now: Timestamp) -> Result<(), NodeError> {
        let mut manager = self.state.lock().await;
        self.fork_process.run_cycle(&mut manager, now)
    }

    /// Spawn the periodic reconciliation task. The task ends when
    /// `shutdown` flips to true.
    pub fn spawn_reconciler(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        let period = Duration::from_secs(node.config.consensus.clear_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = node.reconcile_once(Timestamp::now()).await {
                            warn!(error = %e, "reconciliation cycle failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("reconciliation task stopping");
                            return;
                        }
                    }
                }
            }
        })
    }
}

/// Rebuild the master chain from storage, or start at genesis on an empty
/// store. Stored blocks are walked back from the best block through their
/// parent links, up to the working window, then replayed in order so the
/// agent, deposit and punish sets are rebuilt rather than starting empty.
/// History deeper than the window stays on disk only; working-set entries
/// created there are out of reach, matching what pruning keeps in memory.
fn resume_master(services: &Services, genesis: Block, params: &ConsensusParams) -> ChainContainer {
    let Some(best) = services.blocks.get_best_block() else {
        return ChainContainer::new(Chain::from_block(genesis), params.clone());
    };

    let mut blocks = vec![best];
    while blocks.len() < params.master_block_window.max(1) {
        let earliest = &blocks[blocks.len() - 1];
        if earliest.height() == 0 {
            break;
        }
        if earliest.header.pre_hash == genesis.header.hash {
            // Genesis itself may live outside storage.
            blocks.push(genesis.clone());
            break;
        }
        match services.blocks.get_block(&earliest.header.pre_hash) {
            Some(parent) => blocks.push(parent),
            None => break,
        }
    }
    blocks.reverse();

    // The earliest resumed block anchors the chain; its own transactions
    // are history from the container's point of view, like genesis is on
    // a fresh start.
    let mut resumed = blocks.into_iter();
    let start = resumed.next().unwrap_or(genesis);
    let mut container = ChainContainer::new(Chain::from_block(start), params.clone());
    for block in resumed {
        let height = block.height();
        if let Err(e) = container.add_block(block) {
            // Storage handed back a broken sequence; keep the prefix that
            // did replay and let the network fill in the rest.
            warn!(height, error = %e, "stored block failed to replay, truncating resume");
            break;
        }
    }
    info!(
        height = container.chain.height(),
        agents = container.chain.agents.len(),
        "master chain resumed from storage"
    );
    container
}
