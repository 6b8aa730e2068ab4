#![deny(missing_docs)]
//! RSA, seeded-PRNG-with-hash, and XOR primitives for the bulk protocol.
//!
//! This crate is deliberately thin: it wraps the RustCrypto-family crates
//! (`rsa`, `sha1`, `rand_chacha`) behind the small surface the bulk protocol
//! actually needs — keygen, fixed-size seed encryption, a PRNG that also
//! commits to its own output, and a byte-XOR helper. It owns no protocol
//! logic; that lives in `bulk-node`.

mod prng;
mod rsa_keys;
mod xor;

pub use prng::{Digest, HashingPrng};
pub use rsa_keys::{RsaError, RsaKeyPair, RsaPublicKey, SEED_LEN, Seed};
pub use xor::{xor_bytes, xor_in_place};

use rand::RngCore as _;

/// Draws a fresh 32-byte seed from the OS RNG.
///
/// Used once per recipient in phase 1 to produce the `s[0..N-1]` seed set.
pub fn random_seed() -> Seed {
    let mut seed = [0u8; SEED_LEN];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    seed
}
