//! Bulk node binary.
//!
//! Parses [`bulk_node::NodeConfig`] from CLI args / `BULK_NODE_*`
//! environment variables, initializes tracing, runs exactly one round, and
//! reports the outcome.

use std::process::ExitCode;

use clap::Parser;
use eyre::Context;

use bulk_node::{NodeConfig, Round};

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    bulk_node::metrics::describe_metrics();

    let config = NodeConfig::parse();
    tracing::info!("starting bulk-node with config: {config:#?}");

    let round = Round::new(config).context("while preparing round")?;
    match round.run().await {
        Ok(summary) => {
            tracing::info!(
                round_id = summary.round_id.into_inner(),
                n_nodes = summary.n_nodes,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "round finished successfully"
            );
            for (slot, path) in summary.slot_files.iter().enumerate() {
                tracing::info!(slot, path = %path.display(), size = summary.slot_sizes[slot], "reconstructed slot");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::error!(error = %err, "round failed");
            Err(err).context("while running round")
        }
    }
}
