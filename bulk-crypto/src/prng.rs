//! A seeded PRNG that commits to its own output as it goes.

use rand::RngCore as _;
use rand::SeedableRng as _;
use rand_chacha::ChaCha20Rng;
use sha1::{Digest as _, Sha1};

use crate::rsa_keys::Seed;

/// Digest produced by [`HashingPrng::finalize_hash`].
pub type Digest = [u8; 20];

/// A stream PRNG that doubles as a commitment accumulator.
///
/// Every byte drawn through [`Self::next_bytes`] is folded into a running
/// SHA-1 digest. A recipient who reconstructs a masking stream this way can,
/// without re-reading any plaintext, produce the exact commitment the
/// descriptor author published — that's the "hash duality" the protocol
/// relies on to catch a cheating author without ever revealing the seed to
/// anyone but the recipient it belongs to.
pub struct HashingPrng {
    rng: ChaCha20Rng,
    hasher: Sha1,
}

impl HashingPrng {
    /// Seeds a new PRNG. The seed is exactly the 32 bytes RSA-encrypted for
    /// the recipient in the recipient's descriptor slot.
    pub fn new(seed: Seed) -> Self {
        Self {
            rng: ChaCha20Rng::from_seed(seed),
            hasher: Sha1::new(),
        }
    }

    /// Draws `n` bytes from the stream and folds them into the running
    /// digest.
    pub fn next_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.rng.fill_bytes(&mut buf);
        self.hasher.update(&buf);
        buf
    }

    /// Consumes the PRNG and returns the SHA-1 digest of every byte it has
    /// emitted so far.
    pub fn finalize_hash(self) -> Digest {
        self.hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let seed = [7u8; 32];
        let mut a = HashingPrng::new(seed);
        let mut b = HashingPrng::new(seed);
        assert_eq!(a.next_bytes(64), b.next_bytes(64));
    }

    #[test]
    fn different_seed_different_stream() {
        let mut a = HashingPrng::new([1u8; 32]);
        let mut b = HashingPrng::new([2u8; 32]);
        assert_ne!(a.next_bytes(64), b.next_bytes(64));
    }

    #[test]
    fn hash_commits_to_emitted_bytes() {
        let seed = [9u8; 32];
        let mut a = HashingPrng::new(seed);
        let emitted = a.next_bytes(128);
        let digest = a.finalize_hash();

        let mut expected = Sha1::new();
        expected.update(&emitted);
        let expected: Digest = expected.finalize().into();

        assert_eq!(digest, expected);
    }

    #[test]
    fn splitting_the_draw_does_not_change_the_digest() {
        let seed = [3u8; 32];

        let mut whole = HashingPrng::new(seed);
        let all = whole.next_bytes(100);
        let whole_digest = whole.finalize_hash();

        let mut split = HashingPrng::new(seed);
        let mut collected = split.next_bytes(40);
        collected.extend(split.next_bytes(60));
        let split_digest = split.finalize_hash();

        assert_eq!(all, collected);
        assert_eq!(whole_digest, split_digest);
    }
}
