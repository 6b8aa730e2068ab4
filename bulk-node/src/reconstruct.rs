//! Phases 3 and 4: per-slot contribution and cross-node reconstruction.
//!
//! Phase 3 ([`contribute_slot`]) decides, for one shuffled descriptor, what
//! this node adds to its own tar: either the masked ciphertext it produced
//! in phase 1 (if it recognizes the slot as its own) or an expansion of the
//! seed it was handed, verified against the descriptor's published
//! commitment. Phase 4 ([`reconstruct_slot`]) runs once every node holds
//! every contribution for a slot: it XORs them back together and checks
//! every contributor's commitment along the way.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bulk_crypto::{HashingPrng, RsaKeyPair};
use bulk_types::{Descriptor, NodeId, ProtocolError};
use sha1::{Digest as _, Sha1};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

use crate::streaming::{self, RECONSTRUCT_BLOCK};

/// Processes one shuffled slot for this node's phase-3 contribution.
///
/// Returns the path to contribute to this node's tar under its own id, and
/// whether this slot was recognized as the node's own (self-recognition
/// happens at most once per round; the caller is responsible for checking
/// it happened exactly once across all slots).
pub async fn contribute_slot(
    own_id: NodeId,
    own_sk1: &RsaKeyPair,
    own_encrypted_seed: &[u8],
    own_cip_file: &Path,
    slot_index: usize,
    descriptor: &Descriptor,
    temp_dir: &Path,
) -> Result<(PathBuf, bool), ProtocolError> {
    let self_idx = own_id.into_inner() as usize;
    let my_enc_seed = descriptor.enc_seeds.get(self_idx).ok_or_else(|| {
        ProtocolError::Archive(format!(
            "descriptor at slot {slot_index} has no entry for node {self_idx}"
        ))
    })?;

    if my_enc_seed.as_slice() == own_encrypted_seed {
        return Ok((own_cip_file.to_path_buf(), true));
    }

    let seed = own_sk1
        .decrypt(my_enc_seed)
        .map_err(|err| ProtocolError::Key(err.to_string()))?;
    let prng = HashingPrng::new(seed);
    let out_path = temp_dir.join(format!("expanded-slot-{slot_index}.bin"));
    let digest = streaming::expand_seed_stream(&out_path, descriptor.msg_len, prng)
        .await
        .map_err(ProtocolError::Io)?;

    let expected = descriptor.hashes.get(self_idx).ok_or_else(|| {
        ProtocolError::Archive(format!(
            "descriptor at slot {slot_index} has no hash for node {self_idx}"
        ))
    })?;
    if digest != *expected {
        return Err(ProtocolError::CommitmentMismatch {
            slot: slot_index,
            contributor: own_id,
        });
    }

    Ok((out_path, false))
}

/// Reconstructs one slot's plaintext from every contributor's file.
///
/// Reads all `n_nodes` contributor handles in lockstep, XORing corresponding
/// blocks together and accumulating a running SHA-1 per contributor. Once
/// the full `descriptor.msg_len` bytes have been consumed, every
/// accumulator's digest is checked against the descriptor's published hash
/// for that contributor.
pub async fn reconstruct_slot(
    slot_index: usize,
    n_nodes: usize,
    descriptor: &Descriptor,
    contributor_files: &BTreeMap<NodeId, PathBuf>,
    out_path: &Path,
) -> Result<(), ProtocolError> {
    let mut handles = Vec::with_capacity(n_nodes);
    for i in 0..n_nodes {
        let id = NodeId::new(i as u16);
        let path = contributor_files.get(&id).ok_or_else(|| {
            ProtocolError::Archive(format!(
                "slot {slot_index} is missing a contribution from node {i}"
            ))
        })?;
        let file = tokio::fs::File::open(path).await.map_err(ProtocolError::Io)?;
        handles.push(file);
    }

    let mut hashers: Vec<Sha1> = (0..n_nodes).map(|_| Sha1::new()).collect();
    let mut out = tokio::fs::File::create(out_path)
        .await
        .map_err(ProtocolError::Io)?;

    let mut remaining = descriptor.msg_len;
    while remaining > 0 {
        let chunk = remaining.min(RECONSTRUCT_BLOCK as u64) as usize;
        let mut combined: Option<Vec<u8>> = None;

        for (handle, hasher) in handles.iter_mut().zip(hashers.iter_mut()) {
            let mut buf = vec![0u8; chunk];
            handle.read_exact(&mut buf).await.map_err(ProtocolError::Io)?;
            hasher.update(&buf);
            combined = Some(match combined.take() {
                None => buf,
                Some(mut acc) => {
                    bulk_crypto::xor_in_place(&mut acc, &buf);
                    acc
                }
            });
        }

        out.write_all(&combined.expect("n_nodes >= 1"))
            .await
            .map_err(ProtocolError::Io)?;
        remaining -= chunk as u64;
    }
    out.flush().await.map_err(ProtocolError::Io)?;

    for (i, hasher) in hashers.into_iter().enumerate() {
        let digest: bulk_types::Sha1Digest = hasher.finalize().into();
        let expected = descriptor.hashes.get(i).ok_or_else(|| {
            ProtocolError::Archive(format!("descriptor at slot {slot_index} has no hash for node {i}"))
        })?;
        if digest != *expected {
            return Err(ProtocolError::CommitmentMismatch {
                slot: slot_index,
                contributor: NodeId::new(i as u16),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulk_crypto::random_seed;
    use bulk_types::RoundId;

    fn descriptor_for(n_nodes: usize, msg_len: u64) -> (Descriptor, Vec<RsaKeyPair>) {
        let sks: Vec<RsaKeyPair> = (0..n_nodes).map(|_| RsaKeyPair::generate(512).unwrap()).collect();
        let enc_seeds = vec![Vec::new(); n_nodes];
        let hashes = vec![[0u8; 20]; n_nodes];
        let descriptor = Descriptor {
            author_id: NodeId::new(0),
            round_id: RoundId::new(1),
            msg_len,
            enc_seeds,
            hashes,
        };
        (descriptor, sks)
    }

    #[tokio::test]
    async fn contribute_slot_recognizes_its_own_ciphertext() {
        let (mut descriptor, _sks) = descriptor_for(3, 10);
        let own_id = NodeId::new(1);
        let own_encrypted_seed = b"own-ciphertext-bytes".to_vec();
        descriptor.enc_seeds[1] = own_encrypted_seed.clone();

        let tmp = tempfile::tempdir().unwrap();
        let cip_file = tmp.path().join("cip.bin");
        std::fs::write(&cip_file, b"masked message bytes").unwrap();

        let sk1 = RsaKeyPair::generate(512).unwrap();
        let (path, is_self) = contribute_slot(
            own_id,
            &sk1,
            &own_encrypted_seed,
            &cip_file,
            0,
            &descriptor,
            tmp.path(),
        )
        .await
        .unwrap();

        assert!(is_self);
        assert_eq!(path, cip_file);
    }

    #[tokio::test]
    async fn contribute_slot_expands_and_verifies_someone_elses_slot() {
        let n_nodes = 3;
        let (mut descriptor, sks) = descriptor_for(n_nodes, 100);
        let own_id = NodeId::new(1);

        let seed = random_seed();
        let enc_seed = sks[1].public_key().encrypt(&seed).unwrap();
        descriptor.enc_seeds[1] = enc_seed;

        let mut reference = HashingPrng::new(seed);
        reference.next_bytes(100);
        descriptor.hashes[1] = reference.finalize_hash();

        let tmp = tempfile::tempdir().unwrap();
        let cip_file = tmp.path().join("cip.bin");
        std::fs::write(&cip_file, b"not used here").unwrap();
        let own_encrypted_seed = b"some other ciphertext".to_vec();

        let (path, is_self) = contribute_slot(
            own_id,
            &sks[1],
            &own_encrypted_seed,
            &cip_file,
            3,
            &descriptor,
            tmp.path(),
        )
        .await
        .unwrap();

        assert!(!is_self);
        assert!(path.is_file());
        let expanded = std::fs::read(&path).unwrap();
        assert_eq!(expanded.len(), 100);
    }

    #[tokio::test]
    async fn contribute_slot_rejects_a_tampered_hash() {
        let n_nodes = 2;
        let (mut descriptor, sks) = descriptor_for(n_nodes, 16);
        let own_id = NodeId::new(0);

        let seed = random_seed();
        let enc_seed = sks[0].public_key().encrypt(&seed).unwrap();
        descriptor.enc_seeds[0] = enc_seed;
        descriptor.hashes[0] = [0xffu8; 20];

        let tmp = tempfile::tempdir().unwrap();
        let cip_file = tmp.path().join("cip.bin");
        std::fs::write(&cip_file, b"unused").unwrap();

        let err = contribute_slot(
            own_id,
            &sks[0],
            b"not my seed",
            &cip_file,
            2,
            &descriptor,
            tmp.path(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ProtocolError::CommitmentMismatch { slot: 2, contributor } if contributor == own_id
        ));
    }

    #[tokio::test]
    async fn reconstruct_slot_xors_contributions_back_to_the_original() {
        let n_nodes = 3;
        let plaintext = b"hello anonymous world!!".to_vec();
        let msg_len = plaintext.len() as u64;

        let mut seeds = Vec::new();
        let mut masks = Vec::new();
        for _ in 0..n_nodes - 1 {
            let seed = random_seed();
            seeds.push(seed);
            masks.push(HashingPrng::new(seed));
        }

        let mut masked = plaintext.clone();
        for mask in masks.iter_mut() {
            bulk_crypto::xor_in_place(&mut masked, &mask.next_bytes(masked.len()));
        }
        let mut hashes = vec![[0u8; 20]; n_nodes];
        for (i, mask) in masks.into_iter().enumerate() {
            hashes[i + 1] = mask.finalize_hash();
        }
        let self_digest: bulk_types::Sha1Digest = {
            let mut h = Sha1::new();
            h.update(&masked);
            h.finalize().into()
        };
        hashes[0] = self_digest;

        let descriptor = Descriptor {
            author_id: NodeId::new(0),
            round_id: RoundId::new(7),
            msg_len,
            enc_seeds: vec![Vec::new(); n_nodes],
            hashes,
        };

        let tmp = tempfile::tempdir().unwrap();
        let mut contributors = BTreeMap::new();
        let author_path = tmp.path().join("author.bin");
        std::fs::write(&author_path, &masked).unwrap();
        contributors.insert(NodeId::new(0), author_path);

        for (i, seed) in seeds.into_iter().enumerate() {
            let contributor_id = NodeId::new((i + 1) as u16);
            let out_path = tmp.path().join(format!("expand-{i}.bin"));
            let prng = HashingPrng::new(seed);
            streaming::expand_seed_stream(&out_path, msg_len, prng)
                .await
                .unwrap();
            contributors.insert(contributor_id, out_path);
        }

        let out_path = tmp.path().join("reconstructed.bin");
        reconstruct_slot(0, n_nodes, &descriptor, &contributors, &out_path)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&out_path).unwrap(), plaintext);
    }

    #[tokio::test]
    async fn reconstruct_slot_rejects_a_corrupted_contribution() {
        let n_nodes = 2;
        let plaintext = b"abcdefgh".to_vec();
        let msg_len = plaintext.len() as u64;

        let seed = random_seed();
        let mut mask = HashingPrng::new(seed);
        let mut masked = plaintext.clone();
        bulk_crypto::xor_in_place(&mut masked, &mask.next_bytes(masked.len()));
        let good_hash = mask.finalize_hash();
        let self_hash: bulk_types::Sha1Digest = {
            let mut h = Sha1::new();
            h.update(&masked);
            h.finalize().into()
        };

        let descriptor = Descriptor {
            author_id: NodeId::new(0),
            round_id: RoundId::new(1),
            msg_len,
            enc_seeds: vec![Vec::new(); n_nodes],
            hashes: vec![self_hash, good_hash],
        };

        let tmp = tempfile::tempdir().unwrap();
        let author_path = tmp.path().join("author.bin");
        std::fs::write(&author_path, &masked).unwrap();

        // Corrupt the second contributor's file after the descriptor's
        // commitment was computed against the honest stream.
        let corrupted_path = tmp.path().join("corrupted.bin");
        std::fs::write(&corrupted_path, vec![0u8; plaintext.len()]).unwrap();

        let mut contributors = BTreeMap::new();
        contributors.insert(NodeId::new(0), author_path);
        contributors.insert(NodeId::new(1), corrupted_path);

        let out_path = tmp.path().join("out.bin");
        let err = reconstruct_slot(5, n_nodes, &descriptor, &contributors, &out_path)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProtocolError::CommitmentMismatch { slot: 5, contributor } if contributor == NodeId::new(1)
        ));
    }
}
