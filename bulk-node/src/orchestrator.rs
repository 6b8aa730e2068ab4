//! The phase 0→4 state machine one node runs to completion once per round.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bulk_crypto::{RsaKeyPair, RsaPublicKey};
use bulk_shuffle::{RingShuffle, Shuffle, ShuffleInput};
use bulk_types::wire::{KeyExchangeBroadcast, KeyExchangeHello, TransportErrorKind};
use bulk_types::{Descriptor, KeyDirectory, NodeId, NodePublicKeys, ProtocolError, RoundId};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::NodeConfig;
use crate::metrics as node_metrics;
use crate::{archive, descriptor, reconstruct};

/// Which step of the round is currently in flight. Used only for
/// diagnostics (tracing spans, the phase gauge, and the phase named in an
/// error report); it carries no protocol state of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Phase 0: RSA public key exchange and directory construction.
    KeyExchange,
    /// Phase 1: descriptor construction (masking, seed encryption).
    DescriptorBuild,
    /// Phase 2: the anonymizing shuffle.
    Shuffle,
    /// Phase 3: per-slot contribution and tar-of-tars aggregation.
    SlotComputeAggregate,
    /// Phase 4: cross-node XOR reconstruction and commitment verification.
    Reconstruct,
}

impl Phase {
    fn index(self) -> u8 {
        match self {
            Phase::KeyExchange => 0,
            Phase::DescriptorBuild => 1,
            Phase::Shuffle => 2,
            Phase::SlotComputeAggregate => 3,
            Phase::Reconstruct => 4,
        }
    }
}

/// What a completed round produced.
#[derive(Debug)]
pub struct RoundSummary {
    /// The round that completed.
    pub round_id: RoundId,
    /// How many nodes participated.
    pub n_nodes: usize,
    /// Wall-clock time from phase 0's start to phase 4's completion.
    pub elapsed: Duration,
    /// Paths to the `n_nodes` reconstructed plaintext files, in slot order.
    pub slot_files: Vec<PathBuf>,
    /// `slot_files[k]`'s size in bytes, same order.
    pub slot_sizes: Vec<u64>,
    /// Keeps the round's scratch directory (where `slot_files` live) alive
    /// for as long as the summary is held, instead of it vanishing the
    /// instant [`Round::run`] returns.
    _temp_dir: Arc<TempDir>,
}

/// One node's run through a single round of the protocol.
///
/// Owns the round's scratch directory and all key material generated for
/// it; both are dropped (and the temp directory removed) when the `Round`
/// is dropped, whether the round succeeded or failed.
pub struct Round {
    config: NodeConfig,
    shuffle: Arc<dyn Shuffle + Send + Sync>,
    phase: Phase,
    temp_dir: Arc<TempDir>,
    sk1: Option<RsaKeyPair>,
    key_directory: KeyDirectory,
    /// Populated only by the leader in phase 0: every other node's declared
    /// listen address, keyed by its claimed id (never by arrival order —
    /// a late or out-of-order connection must still reach the right node).
    peer_addrs: BTreeMap<NodeId, SocketAddr>,
    descriptor_artifacts: Option<descriptor::DescriptorArtifacts>,
    cancellation: CancellationToken,
}

impl Round {
    /// Builds a round that will use the shipped [`RingShuffle`].
    pub fn new(config: NodeConfig) -> Result<Self, ProtocolError> {
        Self::with_shuffle(config, RingShuffle::new())
    }

    /// Builds a round using a caller-supplied shuffle implementation.
    pub fn with_shuffle(
        config: NodeConfig,
        shuffle: impl Shuffle + Send + Sync + 'static,
    ) -> Result<Self, ProtocolError> {
        config.validate()?;
        let temp_dir = TempDir::new().map_err(ProtocolError::Io)?;
        Ok(Self {
            config,
            shuffle: Arc::new(shuffle),
            phase: Phase::KeyExchange,
            temp_dir: Arc::new(temp_dir),
            sk1: None,
            key_directory: KeyDirectory::new(),
            peer_addrs: BTreeMap::new(),
            descriptor_artifacts: None,
            cancellation: CancellationToken::new(),
        })
    }

    /// A handle the embedding application can use to cancel this round
    /// cooperatively between suspension points, by calling `.cancel()` on
    /// it from another task. Clone freely; cancelling any clone cancels
    /// the round.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        metrics::gauge!(node_metrics::METRICS_ID_NODE_PHASE).set(phase.index() as f64);
    }

    /// Returns `Err(ProtocolError::Cancelled)` if the round's cancellation
    /// token has fired. Called between phases and after every suspension
    /// point long enough to be worth checking early.
    fn check_cancelled(&self) -> Result<(), ProtocolError> {
        if self.cancellation.is_cancelled() {
            return Err(ProtocolError::Cancelled);
        }
        Ok(())
    }

    /// Bounds a single network round-trip to `config.network_timeout`, so a
    /// peer that never connects or never sends aborts the round instead of
    /// hanging it forever. Also races the round's cancellation token, so a
    /// cooperative cancel takes effect immediately instead of waiting for
    /// the timeout.
    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, TransportErrorKind>>,
    ) -> Result<T, ProtocolError> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(ProtocolError::Cancelled),
            outcome = tokio::time::timeout(self.config.network_timeout, fut) => match outcome {
                Ok(result) => Ok(result?),
                Err(_) => Err(ProtocolError::Transport(TransportErrorKind::Io(
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "network timeout elapsed"),
                ))),
            },
        }
    }

    /// Runs phases 0 through 4 to completion, emitting a structured
    /// tracing event and updating metrics on the way out either way.
    #[instrument(level = "info", skip(self))]
    pub async fn run(mut self) -> Result<RoundSummary, ProtocolError> {
        let round_id = self.config.round();
        let n_nodes = self.config.n_nodes.get();
        let outcome = self.run_inner().await;

        match &outcome {
            Ok(summary) => {
                tracing::info!(
                    round_id = round_id.into_inner(),
                    n_nodes,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    slot_sizes = ?summary.slot_sizes,
                    "round complete"
                );
                metrics::counter!(node_metrics::METRICS_ID_NODE_ROUNDS_COMPLETED).increment(1);
                metrics::histogram!(node_metrics::METRICS_ID_NODE_ROUND_DURATION_SECONDS)
                    .record(summary.elapsed.as_secs_f64());
            }
            Err(err) => {
                tracing::error!(
                    round_id = round_id.into_inner(),
                    phase = ?self.phase,
                    error = %err,
                    "round aborted"
                );
                metrics::counter!(node_metrics::METRICS_ID_NODE_ROUNDS_ABORTED).increment(1);
                if matches!(err, ProtocolError::CommitmentMismatch { .. }) {
                    metrics::counter!(node_metrics::METRICS_ID_NODE_COMMITMENT_MISMATCHES_TOTAL)
                        .increment(1);
                }
            }
        }

        outcome
    }

    async fn run_inner(&mut self) -> Result<RoundSummary, ProtocolError> {
        let start = Instant::now();

        self.check_cancelled()?;
        self.phase0_key_exchange().await?;
        self.check_cancelled()?;
        self.phase1_descriptor_build().await?;
        self.check_cancelled()?;
        let descriptors = self.phase2_shuffle().await?;
        self.check_cancelled()?;
        let outer_tar_path = self.phase3_slot_compute_aggregate(&descriptors).await?;
        self.check_cancelled()?;
        let slot_files = self.phase4_reconstruct(&descriptors, &outer_tar_path).await?;

        let mut slot_sizes = Vec::with_capacity(slot_files.len());
        for path in &slot_files {
            let meta = tokio::fs::metadata(path).await.map_err(ProtocolError::Io)?;
            slot_sizes.push(meta.len());
        }

        Ok(RoundSummary {
            round_id: self.config.round(),
            n_nodes: self.config.n_nodes.get(),
            elapsed: start.elapsed(),
            slot_files,
            slot_sizes,
            _temp_dir: Arc::clone(&self.temp_dir),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn phase0_key_exchange(&mut self) -> Result<(), ProtocolError> {
        self.set_phase(Phase::KeyExchange);
        let n_nodes = self.config.n_nodes.get();
        let own_id = self.config.node_id();
        let round_id = self.config.round();

        let sk1 = RsaKeyPair::generate(self.config.key_len)
            .map_err(|err| ProtocolError::Key(err.to_string()))?;
        let sk2 = RsaKeyPair::generate(self.config.key_len)
            .map_err(|err| ProtocolError::Key(err.to_string()))?;
        let pk1_der = sk1
            .public_key()
            .to_der()
            .map_err(|err| ProtocolError::Key(err.to_string()))?;
        let pk2_der = sk2
            .public_key()
            .to_der()
            .map_err(|err| ProtocolError::Key(err.to_string()))?;

        let mut directory = KeyDirectory::new();
        directory.insert(
            own_id,
            NodePublicKeys {
                pk1_der: pk1_der.clone(),
                pk2_der: pk2_der.clone(),
            },
        );

        if self.config.am_leader() {
            let (payloads, _peer_addrs) = self
                .with_timeout(bulk_net::recv_from_n(self.config.self_addr, n_nodes - 1))
                .await?;

            for payload in &payloads {
                let hello: KeyExchangeHello = ciborium::from_reader(payload.as_slice())
                    .map_err(|err| ProtocolError::Serialization(err.to_string()))?;
                if hello.round_id != round_id {
                    return Err(ProtocolError::RoundMismatch {
                        expected: round_id,
                        got: hello.round_id,
                    });
                }
                directory.insert(
                    hello.id,
                    NodePublicKeys {
                        pk1_der: hello.pk1_der.clone(),
                        pk2_der: hello.pk2_der.clone(),
                    },
                );
                self.peer_addrs.insert(hello.id, hello.addr);
            }

            if !directory.is_complete(n_nodes) {
                return Err(ProtocolError::Key(format!(
                    "directory has {} entries, expected {n_nodes}",
                    directory.len()
                )));
            }

            let mut keys = BTreeMap::new();
            for (id, node_keys) in directory.iter() {
                keys.insert(id, (node_keys.pk1_der.clone(), node_keys.pk2_der.clone()));
            }
            let broadcast = KeyExchangeBroadcast { round_id, keys };
            let mut buf = Vec::new();
            ciborium::into_writer(&broadcast, &mut buf)
                .map_err(|err| ProtocolError::Serialization(err.to_string()))?;

            for addr in self.peer_addrs.values() {
                self.with_timeout(bulk_net::send_to_addr(*addr, &buf)).await?;
            }
        } else {
            let hello = KeyExchangeHello {
                id: own_id,
                round_id,
                addr: self.config.self_addr,
                pk1_der: pk1_der.clone(),
                pk2_der: pk2_der.clone(),
            };
            let mut buf = Vec::new();
            ciborium::into_writer(&hello, &mut buf)
                .map_err(|err| ProtocolError::Serialization(err.to_string()))?;
            self.with_timeout(bulk_net::send_to_addr(self.config.leader_addr, &buf))
                .await?;

            let (payloads, _peer_addrs) = self
                .with_timeout(bulk_net::recv_from_n(self.config.self_addr, 1))
                .await?;
            let broadcast: KeyExchangeBroadcast = ciborium::from_reader(payloads[0].as_slice())
                .map_err(|err| ProtocolError::Serialization(err.to_string()))?;
            if broadcast.round_id != round_id {
                return Err(ProtocolError::RoundMismatch {
                    expected: round_id,
                    got: broadcast.round_id,
                });
            }

            for (id, (pk1, pk2)) in broadcast.keys {
                RsaPublicKey::from_der(&pk1).map_err(|err| ProtocolError::Key(err.to_string()))?;
                RsaPublicKey::from_der(&pk2).map_err(|err| ProtocolError::Key(err.to_string()))?;
                directory.insert(
                    id,
                    NodePublicKeys {
                        pk1_der: pk1,
                        pk2_der: pk2,
                    },
                );
            }

            if !directory.is_complete(n_nodes) {
                return Err(ProtocolError::Key(format!(
                    "directory has {} entries, expected {n_nodes}",
                    directory.len()
                )));
            }
        }

        self.sk1 = Some(sk1);
        self.key_directory = directory;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn phase1_descriptor_build(&mut self) -> Result<(), ProtocolError> {
        self.set_phase(Phase::DescriptorBuild);
        let artifacts = descriptor::build(
            self.config.node_id(),
            self.config.round(),
            self.config.n_nodes.get(),
            &self.config.msg_file,
            &self.key_directory,
            self.temp_dir.path(),
        )
        .await?;
        self.descriptor_artifacts = Some(artifacts);
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn phase2_shuffle(&mut self) -> Result<Vec<Descriptor>, ProtocolError> {
        self.set_phase(Phase::Shuffle);
        let own_id = self.config.node_id();
        let round_id = self.config.round();
        let n_nodes = self.config.n_nodes.get();

        let artifacts = self
            .descriptor_artifacts
            .as_ref()
            .expect("phase 1 ran first");
        let blob_path = self.temp_dir.path().join(format!("descriptor-blob-{own_id}.cbor"));
        let mut buf = Vec::new();
        ciborium::into_writer(&artifacts.descriptor, &mut buf)
            .map_err(|err| ProtocolError::Serialization(err.to_string()))?;
        tokio::fs::write(&blob_path, &buf)
            .await
            .map_err(ProtocolError::Io)?;

        let max_blob_len = (buf.len() as u64).next_power_of_two().max(1);
        let input = ShuffleInput {
            blob_path,
            max_blob_len,
            prev_addr: self.config.prev_addr,
            next_addr: self.config.next_addr,
            leader_addr: self.config.leader_addr,
            self_addr: self.config.self_addr,
            id: own_id,
            n_nodes,
            round_id,
            temp_dir: Arc::clone(&self.temp_dir),
        };

        let shuffle = Arc::clone(&self.shuffle);
        let outputs = tokio::task::spawn_blocking(move || shuffle.run(input))
            .await
            .expect("shuffle task panicked")
            .map_err(|err| ProtocolError::Shuffle(err.to_string()))?;

        let mut descriptors = Vec::with_capacity(outputs.len());
        for path in outputs {
            let bytes = tokio::fs::read(&path).await.map_err(ProtocolError::Io)?;
            let found: Descriptor = ciborium::from_reader(bytes.as_slice())
                .map_err(|err| ProtocolError::Serialization(err.to_string()))?;
            if found.round_id != round_id {
                return Err(ProtocolError::RoundMismatch {
                    expected: round_id,
                    got: found.round_id,
                });
            }
            found
                .validate(n_nodes)
                .map_err(ProtocolError::Archive)?;
            descriptors.push(found);
        }

        Ok(descriptors)
    }

    #[instrument(level = "debug", skip(self, descriptors))]
    async fn phase3_slot_compute_aggregate(
        &mut self,
        descriptors: &[Descriptor],
    ) -> Result<PathBuf, ProtocolError> {
        self.set_phase(Phase::SlotComputeAggregate);
        let own_id = self.config.node_id();
        let n_nodes = self.config.n_nodes.get();
        let sk1 = self.sk1.as_ref().expect("phase 0 ran first");
        let artifacts = self
            .descriptor_artifacts
            .as_ref()
            .expect("phase 1 ran first");

        let mut self_slots_found = 0usize;
        let mut slot_files = Vec::with_capacity(descriptors.len());
        for (k, desc) in descriptors.iter().enumerate() {
            let (path, is_self) = reconstruct::contribute_slot(
                own_id,
                sk1,
                &artifacts.own_encrypted_seed,
                &artifacts.cip_file,
                k,
                desc,
                self.temp_dir.path(),
            )
            .await?;
            if is_self {
                self_slots_found += 1;
                // Two descriptors recognized as ours would mean two distinct
                // RSA ciphertexts collided, which self-recognition assumes
                // cannot happen. Abort rather than silently pick one.
                debug_assert!(self_slots_found <= 1, "recognized self in more than one slot");
                if self_slots_found > 1 {
                    return Err(ProtocolError::SelfAbsent);
                }
            }
            slot_files.push(path);
        }
        if self_slots_found == 0 {
            return Err(ProtocolError::SelfAbsent);
        }

        let node_tar_path = self.temp_dir.path().join(format!("node-tar-{own_id}.tar"));
        {
            let node_tar_path = node_tar_path.clone();
            let slot_files = slot_files.clone();
            tokio::task::spawn_blocking(move || archive::pack_node_tar(own_id, &slot_files, &node_tar_path))
                .await
                .expect("archive task panicked")?;
        }

        let outer_tar_path = if self.config.am_leader() {
            let (mut inbound, _peer_addrs) = self
                .with_timeout(bulk_net::recv_files_from_n(
                    self.config.self_addr,
                    n_nodes - 1,
                    self.temp_dir.path(),
                ))
                .await?;
            inbound.push(node_tar_path.clone());

            let outer_path = self.temp_dir.path().join("outer.tar");
            {
                let outer_path = outer_path.clone();
                tokio::task::spawn_blocking(move || archive::pack_outer(&inbound, &outer_path))
                    .await
                    .expect("archive task panicked")?;
            }

            for addr in self.peer_addrs.values() {
                self.with_timeout(bulk_net::send_file_to_addr(*addr, &outer_path))
                    .await?;
            }
            outer_path
        } else {
            self.with_timeout(bulk_net::send_file_to_addr(
                self.config.leader_addr,
                &node_tar_path,
            ))
            .await?;
            let (mut inbound, _peer_addrs) = self
                .with_timeout(bulk_net::recv_files_from_n(
                    self.config.self_addr,
                    1,
                    self.temp_dir.path(),
                ))
                .await?;
            inbound.remove(0)
        };

        Ok(outer_tar_path)
    }

    #[instrument(level = "debug", skip(self, descriptors))]
    async fn phase4_reconstruct(
        &mut self,
        descriptors: &[Descriptor],
        outer_tar_path: &std::path::Path,
    ) -> Result<Vec<PathBuf>, ProtocolError> {
        self.set_phase(Phase::Reconstruct);
        let n_nodes = self.config.n_nodes.get();

        let temp_dir = Arc::clone(&self.temp_dir);
        let outer_tar_path_owned = outer_tar_path.to_path_buf();
        let slot_contributors = tokio::task::spawn_blocking(move || {
            archive::unpack_outer(&outer_tar_path_owned, n_nodes, temp_dir.path())
        })
        .await
        .expect("archive task panicked")?;

        let mut outputs = Vec::with_capacity(n_nodes);
        for (k, desc) in descriptors.iter().enumerate() {
            let out_path = self.temp_dir.path().join(format!("slot-{k}-plaintext.bin"));
            reconstruct::reconstruct_slot(k, n_nodes, desc, &slot_contributors[k], &out_path)
                .await?;
            outputs.push(out_path);
        }

        Ok(outputs)
    }
}
