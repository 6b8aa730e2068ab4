//! Errors raised by a shuffle invocation.

/// Failure modes of a [`crate::Shuffle`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ShuffleError {
    /// A network I/O error occurred while exchanging working sets with a
    /// ring neighbor.
    #[error("shuffle network I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A peer sent a malformed frame (wrong element count, truncated
    /// padding, etc).
    #[error("malformed shuffle frame: {0}")]
    Protocol(String),
    /// This node's own contribution exceeds the round's padding ceiling.
    #[error("blob of {real_len} bytes exceeds padding ceiling of {max} bytes")]
    BlobTooLarge {
        /// The blob's actual length.
        real_len: u64,
        /// The configured ceiling.
        max: u64,
    },
}
