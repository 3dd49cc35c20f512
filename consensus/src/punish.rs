//! Punishment log entries.

use serde::{Deserialize, Serialize};
use vela_types::{Address, Timestamp};

/// Severity of a punishment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PunishKind {
    /// Missed-slot penalty. Feeds the credit formula.
    Yellow,
    /// Severe fault (double-spend, excessive yellows). Deactivates the agent.
    Red,
}

/// One entry in a chain's punish log. Append-only apart from
/// retention-window pruning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishEntry {
    /// Agent address the punishment names.
    pub address: Address,
    /// Height of the block that carried the punish transaction.
    pub height: u64,
    /// Round the offence belongs to.
    pub round_index: u64,
    pub time: Timestamp,
    pub kind: PunishKind,
}
