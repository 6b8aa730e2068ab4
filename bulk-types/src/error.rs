//! The error taxonomy shared across every crate in the workspace.
//!
//! All variants are fatal at the round level: the orchestrator never
//! retries a phase, it aborts the round and surfaces the error with enough
//! context (phase, slot, contributor) to diagnose what went wrong.

use crate::NodeId;

/// Errors that can abort a round of the bulk protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Node configuration was invalid (bad id, `n_nodes < 2`, missing
    /// message file, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A peer's message carried a `round_id` different from ours.
    #[error("round id mismatch: expected {expected}, got {got}")]
    RoundMismatch {
        /// Our own round id.
        expected: crate::RoundId,
        /// The round id found in the offending message.
        got: crate::RoundId,
    },

    /// A public key failed its consistency check, or the key directory
    /// never reached `n_nodes` entries.
    #[error("key error: {0}")]
    Key(String),

    /// A reconstructed or generated byte stream's SHA-1 digest does not
    /// match the descriptor's commitment.
    #[error("commitment mismatch at slot {slot} for contributor {contributor}")]
    CommitmentMismatch {
        /// The slot being processed.
        slot: usize,
        /// The node whose contribution failed to verify.
        contributor: NodeId,
    },

    /// After processing every slot, this node never recognized one of them
    /// as its own.
    #[error("my ciphertext is missing: the shuffle dropped or mutated my descriptor")]
    SelfAbsent,

    /// A tar archive was missing an expected member, or had the wrong
    /// number of members.
    #[error("archive error: {0}")]
    Archive(String),

    /// A network send/receive failed (connection refused, short read, EOF
    /// before framing completed, ...).
    #[error("transport error: {0}")]
    Transport(#[from] crate::wire::TransportErrorKind),

    /// The shuffle subroutine failed or returned a malformed result.
    #[error("shuffle error: {0}")]
    Shuffle(String),

    /// Wraps an I/O error encountered while streaming a file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wraps a CBOR (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The round was cancelled cooperatively by its caller before it
    /// reached phase 4.
    #[error("round cancelled")]
    Cancelled,
}
