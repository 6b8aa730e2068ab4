//! Phase 1: descriptor construction.
//!
//! Draws a fresh seed per recipient, masks this node's message against
//! every other recipient's PRNG stream, and assembles the descriptor record
//! the shuffle will anonymize.

use std::path::{Path, PathBuf};

use bulk_crypto::{random_seed, HashingPrng, RsaPublicKey, Seed};
use bulk_types::{Descriptor, KeyDirectory, NodeId, ProtocolError, RoundId};
use zeroize::Zeroize as _;

use crate::streaming;

/// Everything phase 1 produces: the descriptor record to hand to the
/// shuffle, the masked ciphertext file kept locally in case this node
/// recognizes its own slot later, and the ciphertext of this node's own
/// seed (used for that recognition).
pub struct DescriptorArtifacts {
    /// The descriptor record, ready to serialize and hand to the shuffle.
    pub descriptor: Descriptor,
    /// Path to the masked ciphertext `C`. Only consumed if this node
    /// recognizes its own slot in phase 3.
    pub cip_file: PathBuf,
    /// The exact ciphertext produced by encrypting this node's own seed.
    /// Retained verbatim (never re-encrypted) for the self-recognition
    /// equality test in phase 3.
    pub own_encrypted_seed: Vec<u8>,
}

/// Builds this node's descriptor for the round.
///
/// `msg_file` is read once, streamed through in [`streaming::MASK_BLOCK`]
/// chunks; the masked output never exists fully in memory.
pub async fn build(
    own_id: NodeId,
    round_id: RoundId,
    n_nodes: usize,
    msg_file: &Path,
    key_directory: &KeyDirectory,
    temp_dir: &Path,
) -> Result<DescriptorArtifacts, ProtocolError> {
    let self_idx = own_id.into_inner() as usize;

    let mut seeds: Vec<Seed> = (0..n_nodes).map(|_| random_seed()).collect();
    let mut prngs: Vec<Option<HashingPrng>> = seeds
        .iter()
        .enumerate()
        .map(|(i, seed)| if i == self_idx { None } else { Some(HashingPrng::new(*seed)) })
        .collect();

    let cip_file = temp_dir.join(format!("descriptor-cip-{own_id}.bin"));
    let (msg_len, self_digest) = {
        let mut mask_refs: Vec<&mut HashingPrng> =
            prngs.iter_mut().filter_map(Option::as_mut).collect();
        streaming::mask_stream(msg_file, &cip_file, &mut mask_refs)
            .await
            .map_err(ProtocolError::Io)?
    };

    let mut hashes = vec![[0u8; 20]; n_nodes];
    for (i, prng) in prngs.into_iter().enumerate() {
        if i == self_idx {
            continue;
        }
        hashes[i] = prng
            .expect("every non-self index has a prng")
            .finalize_hash();
    }
    hashes[self_idx] = self_digest;

    let mut enc_seeds = Vec::with_capacity(n_nodes);
    for (i, seed) in seeds.iter().enumerate() {
        let recipient = NodeId::new(i as u16);
        let keys = key_directory
            .get(recipient)
            .ok_or_else(|| ProtocolError::Key(format!("missing public key for node {i}")))?;
        let pk = RsaPublicKey::from_der(&keys.pk1_der)
            .map_err(|err| ProtocolError::Key(err.to_string()))?;
        let ciphertext = pk
            .encrypt(seed)
            .map_err(|err| ProtocolError::Key(err.to_string()))?;
        enc_seeds.push(ciphertext);
    }
    for seed in seeds.iter_mut() {
        seed.zeroize();
    }

    let own_encrypted_seed = enc_seeds[self_idx].clone();
    let descriptor = Descriptor {
        author_id: own_id,
        round_id,
        msg_len,
        enc_seeds,
        hashes,
    };

    Ok(DescriptorArtifacts {
        descriptor,
        cip_file,
        own_encrypted_seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulk_crypto::RsaKeyPair;
    use bulk_types::NodePublicKeys;
    use std::io::Write as _;

    async fn build_directory(n_nodes: usize) -> (KeyDirectory, Vec<RsaKeyPair>) {
        let mut dir = KeyDirectory::new();
        let mut sks = Vec::with_capacity(n_nodes);
        for i in 0..n_nodes {
            let sk1 = RsaKeyPair::generate(512).unwrap();
            let sk2 = RsaKeyPair::generate(512).unwrap();
            dir.insert(
                NodeId::new(i as u16),
                NodePublicKeys {
                    pk1_der: sk1.public_key().to_der().unwrap(),
                    pk2_der: sk2.public_key().to_der().unwrap(),
                },
            );
            sks.push(sk1);
        }
        (dir, sks)
    }

    #[tokio::test]
    async fn descriptor_has_expected_shape() {
        let n_nodes = 4;
        let (directory, _sks) = build_directory(n_nodes).await;

        let tmp = tempfile::tempdir().unwrap();
        let msg_path = tmp.path().join("msg.bin");
        let mut f = std::fs::File::create(&msg_path).unwrap();
        f.write_all(b"a short test message").unwrap();
        drop(f);

        let artifacts = build(
            NodeId::new(1),
            RoundId::new(42),
            n_nodes,
            &msg_path,
            &directory,
            tmp.path(),
        )
        .await
        .unwrap();

        assert!(artifacts.descriptor.validate(n_nodes).is_ok());
        assert_eq!(artifacts.descriptor.author_id, NodeId::new(1));
        assert_eq!(artifacts.descriptor.msg_len, 21);
        assert_eq!(
            artifacts.own_encrypted_seed,
            artifacts.descriptor.enc_seeds[1]
        );
        assert!(artifacts.cip_file.is_file());
    }

    #[tokio::test]
    async fn recipient_can_decrypt_their_seed_and_match_the_hash() {
        let n_nodes = 3;
        let (directory, sks) = build_directory(n_nodes).await;

        let tmp = tempfile::tempdir().unwrap();
        let msg_path = tmp.path().join("msg.bin");
        std::fs::write(&msg_path, b"0123456789").unwrap();

        let artifacts = build(
            NodeId::new(0),
            RoundId::new(1),
            n_nodes,
            &msg_path,
            &directory,
            tmp.path(),
        )
        .await
        .unwrap();

        // Node 2 is not the author: it should be able to decrypt its seed
        // and reproduce the published commitment.
        let seed = sks[2].decrypt(&artifacts.descriptor.enc_seeds[2]).unwrap();
        let prng = HashingPrng::new(seed);
        let out_path = tmp.path().join("expanded.bin");
        let digest = streaming::expand_seed_stream(
            &out_path,
            artifacts.descriptor.msg_len,
            prng,
        )
        .await
        .unwrap();
        assert_eq!(digest, artifacts.descriptor.hashes[2]);
    }
}
