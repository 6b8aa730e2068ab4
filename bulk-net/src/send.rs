//! One-shot outbound primitives: connect, deliver, disconnect.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt as _;
use tokio::net::TcpStream;
use tracing::instrument;

use bulk_types::wire::TransportErrorKind;

use crate::framing::write_frame;

/// How many times to retry a connection that is refused outright, and how
/// long to wait between attempts.
///
/// Peers in a round start at roughly the same time, so a connect attempt
/// can race a peer's listener bind; this absorbs that race without needing
/// callers to coordinate a startup order. Bounded overall by the caller's
/// own round-trip timeout, not by this constant.
const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(20);

async fn connect(addr: SocketAddr) -> Result<TcpStream, TransportErrorKind> {
    for attempt in 0..CONNECT_ATTEMPTS {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(_) if attempt + 1 < CONNECT_ATTEMPTS => {
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(_) => return Err(TransportErrorKind::ConnectionRefused(addr)),
        }
    }
    unreachable!("loop always returns on its last iteration")
}

/// Connects to `addr`, sends `bytes` as one length-prefixed frame, and
/// closes the connection.
#[instrument(level = "trace", skip(bytes), fields(len = bytes.len()))]
pub async fn send_to_addr(addr: SocketAddr, bytes: &[u8]) -> Result<(), TransportErrorKind> {
    let mut stream = connect(addr).await?;
    write_frame(&mut stream, bytes).await
}

/// Connects to `addr` and streams the file at `path` as one length-prefixed
/// frame, without reading it fully into memory.
#[instrument(level = "trace", skip(path), fields(path = %path.as_ref().display()))]
pub async fn send_file_to_addr(
    addr: SocketAddr,
    path: impl AsRef<Path>,
) -> Result<(), TransportErrorKind> {
    let path = path.as_ref();
    let mut stream = connect(addr).await?;
    let mut file = File::open(path).await.map_err(TransportErrorKind::Io)?;
    let len = file
        .metadata()
        .await
        .map_err(TransportErrorKind::Io)?
        .len();

    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(TransportErrorKind::Io)?;
    tokio::io::copy(&mut file, &mut stream)
        .await
        .map_err(TransportErrorKind::Io)?;
    stream.flush().await.map_err(TransportErrorKind::Io)?;
    Ok(())
}
