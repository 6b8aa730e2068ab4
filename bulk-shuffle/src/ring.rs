//! A demo-grade Chaumian-mix-style ring shuffle.

use std::fs;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use rand::seq::SliceRandom as _;
use tracing::instrument;

use crate::wire::{pad_blob, recv_set, repad_blob, send_set, unpad_blob, Pass};
use crate::{Shuffle, ShuffleError, ShuffleInput};

/// How many times to retry a ring-neighbor connection before giving up.
/// Neighbors all start their ring lap around the same time, so the listener
/// on the other end may not be bound yet on the first attempt.
const CONNECT_ATTEMPTS: u32 = 100;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(20);

fn connect_with_retry(addr: SocketAddr) -> std::io::Result<TcpStream> {
    let mut last_err = None;
    for attempt in 0..CONNECT_ATTEMPTS {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                last_err = Some(err);
                if attempt + 1 < CONNECT_ATTEMPTS {
                    thread::sleep(CONNECT_RETRY_DELAY);
                }
            }
        }
    }
    Err(last_err.expect("CONNECT_ATTEMPTS is at least 1"))
}

/// The shipped [`Shuffle`] implementation.
///
/// Each node, in ring order starting at the leader, receives the current
/// working set, adds its own blob, applies a private random permutation and
/// fresh padding re-randomization, and forwards to its successor. Once the
/// set has traveled the full ring back to the leader, the leader sends it
/// around once more unmodified so every node ends up with a local copy.
///
/// This anonymizes authorship only against an observer who cannot correlate
/// which connection carried which blob — a single corrupt node still sees
/// every blob pass through it in the clear. It is a teaching-grade
/// placeholder for a hardened mix-net, not one.
#[derive(Default)]
pub struct RingShuffle;

impl RingShuffle {
    /// Creates a new ring shuffle. Stateless: all per-round state lives in
    /// [`ShuffleInput`].
    pub fn new() -> Self {
        Self
    }

    fn write_outputs(
        entries: &[Vec<u8>],
        temp_dir: &std::path::Path,
    ) -> Result<Vec<PathBuf>, ShuffleError> {
        let mut paths = Vec::with_capacity(entries.len());
        for (k, padded) in entries.iter().enumerate() {
            let real = unpad_blob(padded)?;
            let path = temp_dir.join(format!("shuffled-{k}.bin"));
            fs::write(&path, real)?;
            paths.push(path);
        }
        Ok(paths)
    }
}

impl Shuffle for RingShuffle {
    #[instrument(level = "debug", skip(self, input), fields(id = %input.id, n_nodes = input.n_nodes))]
    fn run(&self, input: ShuffleInput) -> Result<Vec<PathBuf>, ShuffleError> {
        let ShuffleInput {
            blob_path,
            max_blob_len,
            next_addr,
            leader_addr,
            self_addr,
            id,
            n_nodes,
            temp_dir,
            ..
        } = input;

        let own_real = fs::read(&blob_path)?;
        let own_padded = pad_blob(&own_real, max_blob_len)?;

        if n_nodes <= 1 {
            return Self::write_outputs(&[own_padded], &temp_dir);
        }

        let is_leader = id.is_leader();
        let is_last = id.into_inner() as usize == n_nodes - 1;

        let final_set = if is_leader {
            send_set(connect_with_retry(next_addr)?, Pass::Mix, &[own_padded])?;

            let listener = TcpListener::bind(self_addr)?;
            let (stream, _) = listener.accept()?;
            let final_set = recv_set(stream, Pass::Mix, max_blob_len)?;

            send_set(connect_with_retry(next_addr)?, Pass::Broadcast, &final_set)?;
            final_set
        } else {
            let listener = TcpListener::bind(self_addr)?;

            let (mix_in, _) = listener.accept()?;
            let mut set = recv_set(mix_in, Pass::Mix, max_blob_len)?;
            set.push(own_padded);
            set.shuffle(&mut rand::thread_rng());
            let set = set
                .iter()
                .map(|entry| repad_blob(entry, max_blob_len))
                .collect::<Result<Vec<_>, _>>()?;

            let mix_target = if is_last { leader_addr } else { next_addr };
            send_set(connect_with_retry(mix_target)?, Pass::Mix, &set)?;

            let (broadcast_in, _) = listener.accept()?;
            let final_set = recv_set(broadcast_in, Pass::Broadcast, max_blob_len)?;

            if !is_last {
                send_set(connect_with_retry(next_addr)?, Pass::Broadcast, &final_set)?;
            }
            final_set
        };

        Self::write_outputs(&final_set, &temp_dir)
    }
}
