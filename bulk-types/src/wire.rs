//! Phase 0 key-exchange messages and the transport-error kinds raised while
//! sending or receiving them.
//!
//! Wire messages are encoded with CBOR (`ciborium`) by the crates that send
//! them; this crate only defines their shape so `bulk-types`, `bulk-net` and
//! `bulk-node` agree on it without a dependency cycle.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{NodeId, RoundId};

/// Message A: sent by every non-leader node to the leader during phase 0.
///
/// Carries the sender's identity, address (so the leader can later
/// broadcast back to it) and both of its public keys in DER form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyExchangeHello {
    /// The sender's node id.
    pub id: NodeId,
    /// The round this hello belongs to.
    pub round_id: RoundId,
    /// The address the leader should remember this node at.
    pub addr: SocketAddr,
    /// DER-encoded primary public key (`pk1`), used for seed encryption.
    pub pk1_der: Vec<u8>,
    /// DER-encoded secondary public key (`pk2`), reserved for the shuffle
    /// subroutine.
    pub pk2_der: Vec<u8>,
}

/// Message B: sent by the leader to every non-leader once phase 0's
/// directory is complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyExchangeBroadcast {
    /// The round this broadcast belongs to.
    pub round_id: RoundId,
    /// Every node's public keys, indexed by node id.
    pub keys: BTreeMap<NodeId, (Vec<u8>, Vec<u8>)>,
}

/// The kind of failure observed by the transport layer (`bulk-net`).
///
/// Kept dependency-free of `tokio`/`std::io` specifics so it can be stored
/// directly in [`crate::ProtocolError`] without the types crate depending on
/// the transport crate.
#[derive(Debug, thiserror::Error)]
pub enum TransportErrorKind {
    /// The peer refused the connection.
    #[error("connection refused to {0}")]
    ConnectionRefused(SocketAddr),
    /// The connection closed before a full frame was read.
    #[error("connection closed before framing completed")]
    ShortRead,
    /// A received length prefix exceeded the configured maximum frame size.
    #[error("frame of {got} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// The length the peer claimed to be sending.
        got: u64,
        /// The configured maximum.
        max: u64,
    },
    /// Accepted fewer inbound connections than requested before the
    /// listener was exhausted or timed out.
    #[error("expected {expected} inbound connections, got {got}")]
    IncompleteGather {
        /// How many connections were expected.
        expected: usize,
        /// How many were actually accepted.
        got: usize,
    },
    /// Wraps the underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
