//! Metrics definitions for a bulk-protocol node.
//!
//! This module defines all metrics keys a node emits and provides
//! [`describe_metrics`] to set metadata for each one using the `metrics`
//! crate, the same shape the rest of the workspace follows.

/// Gauge: the orchestrator's current phase, as its numeric index
/// (0=KeyExchange .. 4=Reconstruct). Only meaningful while a round is
/// in flight.
pub const METRICS_ID_NODE_PHASE: &str = "bulk_node_phase";

/// Histogram: wall-clock duration of a completed round, in seconds.
pub const METRICS_ID_NODE_ROUND_DURATION_SECONDS: &str = "bulk_node_round_duration_seconds";

/// Counter: total commitment mismatches observed across all slots and
/// rounds on this node (each one aborts the round it occurred in).
pub const METRICS_ID_NODE_COMMITMENT_MISMATCHES_TOTAL: &str =
    "bulk_node_commitment_mismatches_total";

/// Counter: total rounds this node has completed successfully.
pub const METRICS_ID_NODE_ROUNDS_COMPLETED: &str = "bulk_node_rounds_completed_total";

/// Counter: total rounds this node aborted due to an error.
pub const METRICS_ID_NODE_ROUNDS_ABORTED: &str = "bulk_node_rounds_aborted_total";

/// Describes all metrics a node emits.
///
/// Call once at startup, before the first round runs.
pub fn describe_metrics() {
    metrics::describe_gauge!(
        METRICS_ID_NODE_PHASE,
        metrics::Unit::Count,
        "Current phase index of the in-flight round (0=KeyExchange..4=Reconstruct)"
    );
    metrics::describe_histogram!(
        METRICS_ID_NODE_ROUND_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock duration of a completed round"
    );
    metrics::describe_counter!(
        METRICS_ID_NODE_COMMITMENT_MISMATCHES_TOTAL,
        metrics::Unit::Count,
        "Number of commitment mismatches observed across all slots"
    );
    metrics::describe_counter!(
        METRICS_ID_NODE_ROUNDS_COMPLETED,
        metrics::Unit::Count,
        "Number of rounds this node completed successfully"
    );
    metrics::describe_counter!(
        METRICS_ID_NODE_ROUNDS_ABORTED,
        metrics::Unit::Count,
        "Number of rounds this node aborted due to an error"
    );
}
