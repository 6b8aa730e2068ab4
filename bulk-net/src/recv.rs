//! Leader-side multi-accept primitives: bind, accept exactly `n`, gather.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt as _;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::instrument;

use bulk_types::wire::TransportErrorKind;

use crate::framing::{read_frame, read_len_prefix};

/// Binds `bind_addr`, accepts exactly `n` inbound connections, and reads one
/// length-prefixed message frame from each.
///
/// Connections are accepted sequentially (so the returned address list is
/// the order peers connected in) but read concurrently, mirroring how a
/// session pool would drain several open sockets at once. Returns an error
/// if the listener cannot produce `n` connections or if any frame fails to
/// parse.
#[instrument(level = "debug", skip_all, fields(%bind_addr, n))]
pub async fn recv_from_n(
    bind_addr: SocketAddr,
    n: usize,
) -> Result<(Vec<Vec<u8>>, Vec<SocketAddr>), TransportErrorKind> {
    let listener = TcpListener::bind(bind_addr).await?;
    let mut join_set: JoinSet<Result<(Vec<u8>, SocketAddr), TransportErrorKind>> = JoinSet::new();

    for _ in 0..n {
        let (mut stream, peer) = listener.accept().await?;
        join_set.spawn(async move {
            let payload = read_frame(&mut stream).await?;
            Ok((payload, peer))
        });
    }

    gather(join_set, n).await
}

/// Binds `bind_addr`, accepts exactly `n` inbound connections, and spools
/// each one's streamed file frame to a distinct path under `dest_dir`.
///
/// Returns the spooled paths and the peer addresses they arrived from, in
/// the same relative order. `dest_dir` must already exist.
#[instrument(level = "debug", skip_all, fields(%bind_addr, n, dest_dir = %dest_dir.as_ref().display()))]
pub async fn recv_files_from_n(
    bind_addr: SocketAddr,
    n: usize,
    dest_dir: impl AsRef<Path>,
) -> Result<(Vec<PathBuf>, Vec<SocketAddr>), TransportErrorKind> {
    let dest_dir = dest_dir.as_ref();
    let listener = TcpListener::bind(bind_addr).await?;
    let mut join_set: JoinSet<Result<(PathBuf, SocketAddr), TransportErrorKind>> = JoinSet::new();

    for i in 0..n {
        let (stream, peer) = listener.accept().await?;
        let dest = dest_dir.join(format!("inbound-{i}.tar"));
        join_set.spawn(async move {
            spool_file_frame(stream, &dest).await?;
            Ok((dest, peer))
        });
    }

    gather(join_set, n).await
}

async fn spool_file_frame(mut stream: TcpStream, dest: &Path) -> Result<(), TransportErrorKind> {
    let len = read_len_prefix(&mut stream).await?;
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(TransportErrorKind::Io)?;
    let mut limited = (&mut stream).take(len);
    let copied = tokio::io::copy(&mut limited, &mut file)
        .await
        .map_err(TransportErrorKind::Io)?;
    if copied != len {
        return Err(TransportErrorKind::ShortRead);
    }
    Ok(())
}

async fn gather<T>(
    mut join_set: JoinSet<Result<(T, SocketAddr), TransportErrorKind>>,
    expected: usize,
) -> Result<(Vec<T>, Vec<SocketAddr>), TransportErrorKind> {
    let mut items = Vec::with_capacity(expected);
    let mut addrs = Vec::with_capacity(expected);
    while let Some(joined) = join_set.join_next().await {
        let (item, addr) = joined.expect("recv task panicked")?;
        items.push(item);
        addrs.push(addr);
    }
    if items.len() != expected {
        return Err(TransportErrorKind::IncompleteGather {
            expected,
            got: items.len(),
        });
    }
    Ok((items, addrs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_recv_one_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bind_addr = listener.local_addr().unwrap();
        drop(listener);

        let recv_task = tokio::spawn(recv_from_n(bind_addr, 1));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        crate::send_to_addr(bind_addr, b"hello round").await.unwrap();

        let (payloads, addrs) = recv_task.await.unwrap().unwrap();
        assert_eq!(payloads, vec![b"hello round".to_vec()]);
        assert_eq!(addrs.len(), 1);
    }

    #[tokio::test]
    async fn gathers_from_several_senders_concurrently() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bind_addr = listener.local_addr().unwrap();
        drop(listener);

        let recv_task = tokio::spawn(recv_from_n(bind_addr, 3));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        for i in 0..3u8 {
            crate::send_to_addr(bind_addr, &[i]).await.unwrap();
        }

        let (payloads, addrs) = recv_task.await.unwrap().unwrap();
        assert_eq!(payloads.len(), 3);
        assert_eq!(addrs.len(), 3);
    }
}
