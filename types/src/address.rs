//! Account address type.
//!
//! Addresses identify agents, packers and depositors. They are opaque
//! 20-byte values here — derivation from a public key lives with the
//! signature collaborator, outside this engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-byte account address.
///
/// `Ord` is the plain byte order and serves as the deterministic secondary
/// sort key when ranking round members with equal credit and stake.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Convenience constructor for tests and fixtures: the byte `tag`
    /// repeated across the address.
    pub fn repeat(tag: u8) -> Self {
        Self([tag; 20])
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
