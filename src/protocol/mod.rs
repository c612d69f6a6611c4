//! # Memcached Text Protocol
//!
//! Request/response types and the `tokio_util` codec that frames them on a
//! TCP stream. Only the commands the client issues are modeled.

pub mod codec;
pub mod types;

pub use codec::MemcacheCodec;
pub use types::{Command, Item, Response, StoreMode};

use thiserror::Error;

/// Transport-level failures while talking to a node.
///
/// Every variant leaves the connection in an unknown state, so the connection
/// layer tears it down and reports the node as unavailable.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed reply: {0}")]
    Malformed(String),

    #[error("Reply exceeds frame limit ({0} bytes buffered)")]
    FrameTooLarge(usize),

    #[error("Connection closed by peer")]
    Closed,
}
