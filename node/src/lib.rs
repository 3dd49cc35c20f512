//! Vela node: ingestion and reconciliation around the consensus core.
//!
//! - [`block_process`] — the block ingestion pipeline.
//! - [`fork_process`] — the periodic fork reconciliation cycle.
//! - [`node`] — wiring: one lock over the chain state, a tokio timer for
//!   reconciliation.
//! - [`services`] — collaborator traits (persistence, ledger, signatures,
//!   structural verification, contracts, protocol registry); [`memory`]
//!   has in-memory versions.
//! - [`tx_pool`] — unconfirmed transaction pool.
//! - [`config`] / [`logging`] — TOML configuration and tracing setup.

pub mod block_process;
pub mod config;
pub mod error;
pub mod fork_process;
pub mod logging;
pub mod memory;
pub mod node;
pub mod services;
pub mod tx_pool;

pub use block_process::{BlockProcess, IngestOutcome};
pub use config::NodeConfig;
pub use error::NodeError;
pub use fork_process::ForkChainProcess;
pub use logging::{init_logging, LogFormat};
pub use node::VelaNode;
pub use services::{
    BlockService, ContractService, LedgerService, ProtocolRegistry, ServiceError, Services,
    TransactionService, VerificationService,
};
pub use tx_pool::TxMemoryPool;
