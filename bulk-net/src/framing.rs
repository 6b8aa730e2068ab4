//! The length-prefix frame shared by every send/recv primitive in this
//! crate.

use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

use bulk_types::wire::TransportErrorKind;

/// No single message or file this protocol moves is expected to exceed this
/// size; a peer claiming otherwise is either confused or hostile.
pub const MAX_FRAME_BYTES: u64 = 512 * 1024 * 1024;

fn short_read(err: std::io::Error) -> TransportErrorKind {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportErrorKind::ShortRead
    } else {
        TransportErrorKind::Io(err)
    }
}

/// Writes a length-prefixed frame: an 8-byte big-endian length, then the
/// bytes themselves.
pub(crate) async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> Result<(), TransportErrorKind> {
    writer
        .write_all(&(bytes.len() as u64).to_be_bytes())
        .await
        .map_err(TransportErrorKind::Io)?;
    writer.write_all(bytes).await.map_err(TransportErrorKind::Io)?;
    writer.flush().await.map_err(TransportErrorKind::Io)?;
    Ok(())
}

/// Reads a length-prefixed frame fully into memory, rejecting anything
/// larger than [`MAX_FRAME_BYTES`].
pub(crate) async fn read_frame<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, TransportErrorKind> {
    let len = read_len_prefix(reader).await?;
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(short_read)?;
    Ok(buf)
}

/// Reads just the 8-byte length prefix, validating it against
/// [`MAX_FRAME_BYTES`].
pub(crate) async fn read_len_prefix<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<u64, TransportErrorKind> {
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf).await.map_err(short_read)?;
    let len = u64::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(TransportErrorKind::FrameTooLarge {
            got: len,
            max: MAX_FRAME_BYTES,
        });
    }
    Ok(len)
}
