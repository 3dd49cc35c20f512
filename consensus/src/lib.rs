//! Round-scheduled delegated consensus core.
//!
//! Agents stake their way into a meeting round, the round ranks them by
//! credit, and each member gets one packing slot. This crate owns the
//! in-memory chain state machine built around that schedule:
//!
//! - [`scheduler`] — pure round computation plus the bounded round cache.
//! - [`round`] — `MeetingRound` / `MeetingMember`.
//! - [`chain`] — one chain's blocks and its derived agent/deposit/punish
//!   working set.
//! - [`container`] — `ChainContainer`: verify, apply and roll back blocks
//!   against the schedule; slice chains at fork points.
//! - [`manager`] — master chain plus competing fork and orphan containers.
//! - [`rewards`] — deterministic coinbase distribution and expected
//!   punishment sets.

pub mod agent;
pub mod chain;
pub mod container;
pub mod error;
pub mod manager;
pub mod punish;
pub mod rewards;
pub mod round;
pub mod scheduler;

pub use agent::{Agent, Deposit};
pub use chain::Chain;
pub use container::{ChainContainer, VerifiedSlot};
pub use error::{ConsensusError, RoundError, VerifyFailure};
pub use manager::{ChainManager, ForkRouting};
pub use punish::{PunishEntry, PunishKind};
pub use round::{MeetingMember, MeetingRound};
pub use scheduler::{RoundManager, RoundScheduler};
