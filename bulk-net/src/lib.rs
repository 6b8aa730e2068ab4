#![deny(missing_docs)]
//! Length-prefixed TCP transport for the bulk protocol.
//!
//! Every message and every file the protocol moves between nodes crosses
//! the wire as one length-prefixed frame: an 8-byte big-endian length
//! followed by that many bytes. This crate knows nothing about descriptors,
//! rounds or phases — it is the same kind of thin transport layer a
//! websocket session wrapper would be, just over a raw [`tokio::net::TcpStream`]
//! instead of a websocket, since the protocol needs a plain bidirectional
//! byte pipe rather than message framing a browser could speak.

mod framing;
mod recv;
mod send;

pub use bulk_types::wire::TransportErrorKind;
pub use framing::MAX_FRAME_BYTES;
pub use recv::{recv_files_from_n, recv_from_n};
pub use send::{send_file_to_addr, send_to_addr};
