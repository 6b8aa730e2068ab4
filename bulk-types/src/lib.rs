#![deny(missing_docs)]
//! Shared data model for the shuffle-plus-bulk anonymous data exchange
//! protocol.
//!
//! This crate groups together the strongly-typed values and message
//! structures a bulk node passes between its phases and across the wire:
//!
//! * Thin wrappers around primitive values such as node ids and round ids
//!   (see below).
//! * The [`descriptor`] record produced in phase 1 and the key directory
//!   built in phase 0.
//! * The [`wire`] messages exchanged during key exchange.
//! * The [`error`] taxonomy shared by every other crate in the workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod descriptor;
pub mod error;
pub mod wire;

pub use descriptor::{Descriptor, KeyDirectory, NodePublicKeys};
pub use error::ProtocolError;

/// The id of a node within a round, in `0..n_nodes`. Node `0` is always the
/// leader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u16);

impl NodeId {
    /// Wraps a raw node id.
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw node id.
    pub fn into_inner(self) -> u16 {
        self.0
    }

    /// Returns `true` iff this is the leader's id (`0`).
    pub fn is_leader(self) -> bool {
        self.0 == 0
    }
}

impl From<u16> for NodeId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one run of the protocol. Distinct rounds must never be
/// cross-wired; every message carries a `RoundId` so peers can detect and
/// reject a mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(u64);

impl RoundId {
    /// Wraps a raw round id.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw round id.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl From<u64> for RoundId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-1 produces a 20-byte digest; every hash commitment in a descriptor
/// has this fixed width.
pub type Sha1Digest = [u8; 20];
