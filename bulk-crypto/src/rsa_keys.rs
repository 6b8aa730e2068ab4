//! RSA keygen, DER (de)serialization and fixed-size seed encryption.

use rsa::pkcs1::{DecodeRsaPublicKey as _, EncodeRsaPublicKey as _};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use zeroize::Zeroize;

/// Seeds are fixed at 32 bytes: large enough to key a stream PRNG, small
/// enough to fit comfortably in one PKCS#1 v1.5 block at any realistic
/// modulus length.
pub const SEED_LEN: usize = 32;

/// A PRNG seed, as encrypted for a single recipient in a descriptor.
pub type Seed = [u8; SEED_LEN];

/// Errors raised by RSA keygen, (de)serialization or seed
/// encryption/decryption.
#[derive(Debug, thiserror::Error)]
pub enum RsaError {
    /// Key generation failed (should only happen for unreasonably small
    /// moduli).
    #[error("rsa key generation failed: {0}")]
    KeyGen(rsa::Error),
    /// The DER bytes did not decode to a valid RSA public key, or the key's
    /// internal parameters are inconsistent.
    #[error("invalid public key: {0}")]
    InvalidKey(rsa::pkcs1::Error),
    /// Encryption failed (e.g. the plaintext does not fit the modulus).
    #[error("rsa encryption failed: {0}")]
    Encrypt(rsa::Error),
    /// Decryption failed, or the decrypted seed was not exactly
    /// [`SEED_LEN`] bytes (which would indicate either a corrupted
    /// ciphertext or a seed that did not originate from this protocol).
    #[error("rsa decryption failed: {0}")]
    Decrypt(rsa::Error),
}

/// A node's RSA key pair.
///
/// The bulk protocol uses two independent key pairs per node: `pk1` (this
/// one) for seed encryption, `pk2` for the shuffle subroutine. Both are
/// generated the same way, so this type is used for either.
pub struct RsaKeyPair {
    sk: RsaPrivateKey,
}

impl RsaKeyPair {
    /// Generates a fresh key pair with the given modulus bit length.
    pub fn generate(bits: usize) -> Result<Self, RsaError> {
        let sk = RsaPrivateKey::new(&mut rand::thread_rng(), bits).map_err(RsaError::KeyGen)?;
        Ok(Self { sk })
    }

    /// Derives the public half of this key pair.
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey(rsa::RsaPublicKey::from(&self.sk))
    }

    /// Decrypts a seed previously encrypted under [`Self::public_key`].
    ///
    /// Returns [`RsaError::Decrypt`] both on a cryptographic decryption
    /// failure and on a successfully decrypted plaintext of the wrong
    /// length — either indicates the sender is cheating or the ciphertext
    /// was corrupted in transit.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Seed, RsaError> {
        let mut plain = self
            .sk
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(RsaError::Decrypt)?;
        let seed = Seed::try_from(plain.as_slice()).map_err(|_| {
            RsaError::Decrypt(rsa::Error::Decryption)
        });
        plain.zeroize();
        seed
    }
}

/// An RSA public key, as exchanged over the wire in DER form.
pub struct RsaPublicKey(rsa::RsaPublicKey);

impl RsaPublicKey {
    /// Parses and validates a DER-encoded RSA public key.
    ///
    /// This is the consistency check referred to in the key-exchange
    /// protocol: a malformed key, or one whose `n`/`e` are inconsistent,
    /// fails to parse here and the caller reports a `KeyError`.
    pub fn from_der(bytes: &[u8]) -> Result<Self, RsaError> {
        let key = rsa::RsaPublicKey::from_pkcs1_der(bytes).map_err(RsaError::InvalidKey)?;
        Ok(Self(key))
    }

    /// Encodes this public key to DER bytes for the wire.
    pub fn to_der(&self) -> Result<Vec<u8>, RsaError> {
        Ok(self
            .0
            .to_pkcs1_der()
            .map_err(RsaError::InvalidKey)?
            .into_vec())
    }

    /// Encrypts a fixed-size seed for the holder of the matching private
    /// key.
    ///
    /// PKCS#1 v1.5 encryption is randomized: two calls with the same seed
    /// produce different ciphertexts. Callers that need to recognize their
    /// own descriptor later (phase 3's self-recognition test) must encrypt
    /// once and retain the exact ciphertext, never re-encrypt for
    /// comparison.
    pub fn encrypt(&self, seed: &Seed) -> Result<Vec<u8>, RsaError> {
        self.0
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, seed.as_slice())
            .map_err(RsaError::Encrypt)
    }
}
