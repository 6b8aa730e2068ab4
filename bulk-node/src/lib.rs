#![deny(missing_docs)]
//! One node's participation in the shuffle-plus-bulk anonymous exchange
//! protocol: key exchange, descriptor construction, shuffle invocation,
//! slot computation and cross-node reconstruction.

pub mod archive;
pub mod config;
pub mod descriptor;
pub mod metrics;
pub mod orchestrator;
pub mod reconstruct;
pub mod streaming;

pub use config::NodeConfig;
pub use orchestrator::{Phase, Round, RoundSummary};
