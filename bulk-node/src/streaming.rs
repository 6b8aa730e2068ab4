//! Block-wise streaming primitives shared by phase 1 (masking) and phases
//! 3/4 (PRNG expansion and cross-node reconstruction).
//!
//! Every function here streams: it never holds more than one block of a
//! message in memory, which is what lets the protocol move multi-megabyte
//! messages without buffering them whole.

use std::path::Path;

use bulk_crypto::{xor_in_place, HashingPrng};
use sha1::{Digest as _, Sha1};
use tokio::fs::File;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

/// Block size used while masking the author's message against the other
/// nodes' PRNG streams in phase 1.
pub const MASK_BLOCK: usize = 8192;

/// Block size used while expanding a PRNG seed to a slot's full length, and
/// while XORing contributions together during reconstruction.
pub const RECONSTRUCT_BLOCK: usize = 64 * 1024;

/// Streams `msg_path` in [`MASK_BLOCK`]-sized chunks, XORing each block
/// against bytes drawn from every PRNG in `masks`, and writes the masked
/// result to `out_path`.
///
/// Returns the message length (equal to the masked output's length, since
/// XOR preserves length) and a SHA-1 digest of every masked byte written —
/// the commitment a recipient who never sees this node's plaintext must
/// still be able to reproduce under a different set of assumptions (see
/// [`expand_seed_stream`]).
pub async fn mask_stream(
    msg_path: &Path,
    out_path: &Path,
    masks: &mut [&mut HashingPrng],
) -> std::io::Result<(u64, [u8; 20])> {
    let mut src = File::open(msg_path).await?;
    let mut dst = File::create(out_path).await?;
    let mut digest = Sha1::new();
    let mut buf = vec![0u8; MASK_BLOCK];
    let mut total = 0u64;

    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let block = &mut buf[..n];
        for mask in masks.iter_mut() {
            let r_bytes = mask.next_bytes(n);
            xor_in_place(block, &r_bytes);
        }
        dst.write_all(block).await?;
        digest.update(&block[..]);
        total += n as u64;
    }
    dst.flush().await?;
    Ok((total, digest.finalize().into()))
}

/// Expands `prng` to exactly `total_len` bytes, writing them to `out_path`
/// in [`RECONSTRUCT_BLOCK`]-sized chunks, and returns the SHA-1 digest of
/// the expanded stream — the commitment a recipient reproduces for a slot
/// it did not author, to be checked against the descriptor's published
/// hash for that recipient.
pub async fn expand_seed_stream(
    out_path: &Path,
    total_len: u64,
    mut prng: HashingPrng,
) -> std::io::Result<[u8; 20]> {
    let mut dst = File::create(out_path).await?;
    let mut remaining = total_len;

    while remaining > 0 {
        let chunk = remaining.min(RECONSTRUCT_BLOCK as u64) as usize;
        let bytes = prng.next_bytes(chunk);
        dst.write_all(&bytes).await?;
        remaining -= chunk as u64;
    }
    dst.flush().await?;
    Ok(prng.finalize_hash())
}
