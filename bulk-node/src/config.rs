//! Configuration types and CLI/environment parsing for a bulk-protocol node.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use bulk_types::{NodeId, ProtocolError, RoundId};

/// The configuration for one node's participation in a round.
///
/// Configurable via command line arguments or `BULK_NODE_*` environment
/// variables.
#[derive(Parser, Debug, Clone)]
pub struct NodeConfig {
    /// This node's id, in `0..n_nodes`. Node 0 is the round's leader.
    #[clap(long, env = "BULK_NODE_ID")]
    pub id: u16,

    /// Total number of nodes participating in the round.
    #[clap(long, env = "BULK_NODE_N_NODES")]
    pub n_nodes: NonZeroUsize,

    /// Bit length of every RSA modulus generated for this round.
    #[clap(long, env = "BULK_NODE_KEY_LEN", default_value = "2048")]
    pub key_len: usize,

    /// The round this node is joining.
    #[clap(long, env = "BULK_NODE_ROUND_ID")]
    pub round_id: u64,

    /// This node's own listen address.
    #[clap(long, env = "BULK_NODE_SELF_ADDR")]
    pub self_addr: SocketAddr,

    /// The leader's address (node 0). Nodes other than the leader connect
    /// here during phase 0 and phase 3.
    #[clap(long, env = "BULK_NODE_LEADER_ADDR")]
    pub leader_addr: SocketAddr,

    /// Address of this node's predecessor in the shuffle ring.
    #[clap(long, env = "BULK_NODE_PREV_ADDR")]
    pub prev_addr: SocketAddr,

    /// Address of this node's successor in the shuffle ring.
    #[clap(long, env = "BULK_NODE_NEXT_ADDR")]
    pub next_addr: SocketAddr,

    /// Path to the plaintext message this node contributes to the round.
    #[clap(long, env = "BULK_NODE_MSG_FILE")]
    pub msg_file: PathBuf,

    /// How long to wait for a single network round-trip before treating it
    /// as a transport failure.
    #[clap(
        long,
        env = "BULK_NODE_NETWORK_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub network_timeout: Duration,
}

impl NodeConfig {
    /// This node's id as the newtype the rest of the crate uses.
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.id)
    }

    /// The round id as the newtype the rest of the crate uses.
    pub fn round(&self) -> RoundId {
        RoundId::new(self.round_id)
    }

    /// `true` iff this node is the round's leader (id 0).
    pub fn am_leader(&self) -> bool {
        self.id == 0
    }

    /// `true` iff this node is last in ring order (`id == n_nodes - 1`).
    pub fn am_last(&self) -> bool {
        self.id as usize == self.n_nodes.get() - 1
    }

    /// Validates the invariants a `NodeConfig` must satisfy before a round
    /// can start: at least 2 nodes, this node's id in range, and the
    /// message file present on disk.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.n_nodes.get() < 2 {
            return Err(ProtocolError::Config(format!(
                "n_nodes must be at least 2, got {}",
                self.n_nodes
            )));
        }
        if self.id as usize >= self.n_nodes.get() {
            return Err(ProtocolError::Config(format!(
                "id {} out of range for {} nodes",
                self.id, self.n_nodes
            )));
        }
        if !self.msg_file.is_file() {
            return Err(ProtocolError::Config(format!(
                "message file {} does not exist",
                self.msg_file.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn base_config(msg_file: PathBuf) -> NodeConfig {
        NodeConfig {
            id: 1,
            n_nodes: NonZeroUsize::new(3).unwrap(),
            key_len: 512,
            round_id: 7,
            self_addr: "127.0.0.1:9001".parse().unwrap(),
            leader_addr: "127.0.0.1:9000".parse().unwrap(),
            prev_addr: "127.0.0.1:9000".parse().unwrap(),
            next_addr: "127.0.0.1:9002".parse().unwrap(),
            msg_file,
            network_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn valid_config_passes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "hello").unwrap();
        let config = base_config(f.path().to_path_buf());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn too_few_nodes_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "hello").unwrap();
        let mut config = base_config(f.path().to_path_buf());
        config.n_nodes = NonZeroUsize::new(1).unwrap();
        assert!(matches!(config.validate(), Err(ProtocolError::Config(_))));
    }

    #[test]
    fn id_out_of_range_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "hello").unwrap();
        let mut config = base_config(f.path().to_path_buf());
        config.id = 5;
        assert!(matches!(config.validate(), Err(ProtocolError::Config(_))));
    }

    #[test]
    fn missing_msg_file_is_rejected() {
        let config = base_config(PathBuf::from("/nonexistent/path/to/msg"));
        assert!(matches!(config.validate(), Err(ProtocolError::Config(_))));
    }

    #[test]
    fn role_helpers() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "hello").unwrap();
        let mut config = base_config(f.path().to_path_buf());
        config.id = 0;
        assert!(config.am_leader());
        assert!(!config.am_last());

        config.id = 2;
        assert!(!config.am_leader());
        assert!(config.am_last());
    }
}
