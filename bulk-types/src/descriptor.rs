//! The phase-1 descriptor record and the phase-0 public key directory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{NodeId, RoundId, Sha1Digest};

/// One author's public keys, as exchanged during phase 0.
///
/// `pk1` is used to encrypt per-recipient seeds; `pk2` is reserved for the
/// shuffle subroutine and is opaque to the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodePublicKeys {
    /// DER-encoded primary public key.
    pub pk1_der: Vec<u8>,
    /// DER-encoded secondary public key.
    pub pk2_der: Vec<u8>,
}

/// Maps every node id in the round to its public keys.
///
/// Populated during phase 0. By the time phase 1 starts this must contain
/// exactly `n_nodes` entries, identical at every node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeyDirectory(BTreeMap<NodeId, NodePublicKeys>);

impl KeyDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites an entry.
    pub fn insert(&mut self, id: NodeId, keys: NodePublicKeys) {
        self.0.insert(id, keys);
    }

    /// Looks up a node's public keys.
    pub fn get(&self, id: NodeId) -> Option<&NodePublicKeys> {
        self.0.get(&id)
    }

    /// The number of entries currently in the directory.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` iff the directory has exactly `n_nodes` entries, one
    /// for every id in `0..n_nodes`.
    pub fn is_complete(&self, n_nodes: usize) -> bool {
        self.0.len() == n_nodes
            && (0..n_nodes).all(|i| self.0.contains_key(&NodeId::new(i as u16)))
    }

    /// Iterates over the directory in ascending node-id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodePublicKeys)> {
        self.0.iter().map(|(id, keys)| (*id, keys))
    }
}

/// The record one author produces in phase 1 and submits to the shuffle.
///
/// After the shuffle, every node holds all `n_nodes` descriptors in the same
/// (permuted) order; `author_id` is never used past phase 1 to decide
/// anything anonymity-sensitive — slot processing only looks at `enc_seeds`
/// and `hashes`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Descriptor {
    /// The id of the node that produced this descriptor. Present for
    /// diagnostics; the shuffle is what's responsible for unlinking this
    /// from the slot's eventual position.
    pub author_id: NodeId,
    /// The round this descriptor belongs to.
    pub round_id: RoundId,
    /// Length in bytes of the author's plaintext message (and of the
    /// masked ciphertext, since XOR preserves length).
    pub msg_len: u64,
    /// `enc_seeds[i]` is the seed for recipient `i`, encrypted under that
    /// recipient's primary public key.
    pub enc_seeds: Vec<Vec<u8>>,
    /// `hashes[i]` is the SHA-1 commitment recipient `i` must reproduce:
    /// the hash of `PRNG(seed_i)` truncated to `msg_len` bytes, except at
    /// `i == author_id` where it instead commits to the masked ciphertext.
    pub hashes: Vec<Sha1Digest>,
}

impl Descriptor {
    /// Validates the structural invariants every descriptor must satisfy:
    /// `enc_seeds` and `hashes` both have exactly `n_nodes` entries, and
    /// `author_id` is in range.
    pub fn validate(&self, n_nodes: usize) -> Result<(), String> {
        if self.author_id.into_inner() as usize >= n_nodes {
            return Err(format!(
                "author id {} out of range for {n_nodes} nodes",
                self.author_id
            ));
        }
        if self.enc_seeds.len() != n_nodes {
            return Err(format!(
                "expected {n_nodes} encrypted seeds, got {}",
                self.enc_seeds.len()
            ));
        }
        if self.hashes.len() != n_nodes {
            return Err(format!(
                "expected {n_nodes} hash commitments, got {}",
                self.hashes.len()
            ));
        }
        Ok(())
    }
}
