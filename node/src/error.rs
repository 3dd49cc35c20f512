use thiserror::Error;

use crate::services::ServiceError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("consensus error: {0}")]
    Consensus(#[from] vela_consensus::ConsensusError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("config error: {0}")]
    Config(String),
}
