#![deny(missing_docs)]
//! The anonymizing shuffle subroutine, behind a swappable trait.
//!
//! The core protocol only ever talks to a [`Shuffle`] implementation; it
//! never has its own opinion about how descriptors get anonymously
//! reordered among nodes. [`RingShuffle`] is the shipped implementation —
//! demo-grade, documented as such — so the workspace builds and runs
//! end-to-end without pulling in a production mix-net.

mod error;
mod ring;
mod wire;

pub use error::ShuffleError;
pub use ring::RingShuffle;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bulk_types::{NodeId, RoundId};
use tempfile::TempDir;

/// Everything one shuffle invocation needs: this node's contribution, the
/// ring topology around it, and a scratch directory for the shuffle's own
/// temporary state.
pub struct ShuffleInput {
    /// Path to this node's blob to contribute to the shuffle.
    pub blob_path: PathBuf,
    /// Uniform padding ceiling every blob is expanded to on the wire, so
    /// blob sizes leak no information about authorship.
    pub max_blob_len: u64,
    /// Address of the node immediately before this one in ring order.
    pub prev_addr: SocketAddr,
    /// Address of the node immediately after this one in ring order.
    pub next_addr: SocketAddr,
    /// Address of the ring's leader (node 0).
    pub leader_addr: SocketAddr,
    /// This node's own listening address.
    pub self_addr: SocketAddr,
    /// This node's id.
    pub id: NodeId,
    /// Total number of nodes participating in the round.
    pub n_nodes: usize,
    /// The round this shuffle invocation belongs to.
    pub round_id: RoundId,
    /// Scratch directory, shared with and released by the orchestrator at
    /// round end.
    pub temp_dir: Arc<TempDir>,
}

/// An anonymizing permutation of N equal-size blobs across a ring of nodes.
///
/// Implementations anonymize authorship up to their own threat model; the
/// core only relies on the postcondition that every node ends up holding
/// the same permuted set of blobs with no reliable way to map a blob back
/// to the node that contributed it (beyond whatever the implementation's
/// documentation concedes).
pub trait Shuffle {
    /// Runs one shuffle invocation to completion, returning the paths of
    /// the `n_nodes` shuffled output blobs in the order this node observed
    /// them.
    fn run(&self, input: ShuffleInput) -> Result<Vec<PathBuf>, ShuffleError>;
}
