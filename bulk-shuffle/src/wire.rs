//! Fixed-size padded blob encoding and the tiny framing [`RingShuffle`] uses
//! to move a working set between ring neighbors.

use std::io::{Read, Write};
use std::net::TcpStream;

use rand::RngCore as _;

use crate::ShuffleError;

const LEN_PREFIX: usize = 8;

/// Which lap around the ring a working set belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Pass {
    /// The mixing lap: each hop appends its own blob, permutes, and
    /// re-randomizes padding.
    Mix,
    /// The broadcast lap: the final permuted set travels unchanged,
    /// distributing it to every node.
    Broadcast,
}

impl Pass {
    fn tag(self) -> u8 {
        match self {
            Pass::Mix => 0,
            Pass::Broadcast => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, ShuffleError> {
        match tag {
            0 => Ok(Pass::Mix),
            1 => Ok(Pass::Broadcast),
            other => Err(ShuffleError::Protocol(format!("unknown pass tag {other}"))),
        }
    }
}

/// Pads `real` to exactly `max_len` bytes: an 8-byte big-endian length
/// prefix, the real bytes, then random filler.
pub(crate) fn pad_blob(real: &[u8], max_len: u64) -> Result<Vec<u8>, ShuffleError> {
    let needed = LEN_PREFIX as u64 + real.len() as u64;
    if needed > max_len {
        return Err(ShuffleError::BlobTooLarge {
            real_len: real.len() as u64,
            max: max_len,
        });
    }
    let mut out = Vec::with_capacity(max_len as usize);
    out.extend_from_slice(&(real.len() as u64).to_be_bytes());
    out.extend_from_slice(real);
    let filler = max_len - needed;
    let mut pad = vec![0u8; filler as usize];
    rand::rngs::OsRng.fill_bytes(&mut pad);
    out.extend_from_slice(&pad);
    Ok(out)
}

/// Recovers the real bytes from a padded blob.
pub(crate) fn unpad_blob(padded: &[u8]) -> Result<Vec<u8>, ShuffleError> {
    if padded.len() < LEN_PREFIX {
        return Err(ShuffleError::Protocol("padded blob shorter than its own length prefix".into()));
    }
    let mut len_buf = [0u8; LEN_PREFIX];
    len_buf.copy_from_slice(&padded[..LEN_PREFIX]);
    let real_len = u64::from_be_bytes(len_buf) as usize;
    let body = &padded[LEN_PREFIX..];
    if real_len > body.len() {
        return Err(ShuffleError::Protocol(
            "padded blob's length prefix exceeds its own body".into(),
        ));
    }
    Ok(body[..real_len].to_vec())
}

/// Strips and regenerates the padding of an already-padded blob, keeping
/// the real bytes intact. This is the "re-randomization" step applied at
/// every ring hop.
pub(crate) fn repad_blob(padded: &[u8], max_len: u64) -> Result<Vec<u8>, ShuffleError> {
    let real = unpad_blob(padded)?;
    pad_blob(&real, max_len)
}

/// Sends one working set as a single frame: `[tag:u8][count:u32][entries]`,
/// each entry exactly `max_blob_len` bytes.
pub(crate) fn send_set(
    mut stream: TcpStream,
    pass: Pass,
    entries: &[Vec<u8>],
) -> Result<(), ShuffleError> {
    stream.write_all(&[pass.tag()])?;
    stream.write_all(&(entries.len() as u32).to_be_bytes())?;
    for entry in entries {
        stream.write_all(entry)?;
    }
    stream.flush()?;
    Ok(())
}

/// Receives one working set, validating every entry is exactly
/// `max_blob_len` bytes and that the frame carries the expected lap tag.
pub(crate) fn recv_set(
    mut stream: TcpStream,
    expect: Pass,
    max_blob_len: u64,
) -> Result<Vec<Vec<u8>>, ShuffleError> {
    let mut tag = [0u8; 1];
    stream.read_exact(&mut tag)?;
    let pass = Pass::from_tag(tag[0])?;
    if pass != expect {
        return Err(ShuffleError::Protocol(format!(
            "expected {expect:?} pass, got {pass:?}"
        )));
    }
    let mut count_buf = [0u8; 4];
    stream.read_exact(&mut count_buf)?;
    let count = u32::from_be_bytes(count_buf) as usize;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let mut buf = vec![0u8; max_blob_len as usize];
        stream.read_exact(&mut buf)?;
        entries.push(buf);
    }
    Ok(entries)
}
