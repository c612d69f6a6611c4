//! # Cache Error Types
//!
//! Unified error handling for cluster operations. Transient per-node failures
//! are recovered internally through retry and fallback; the variants below are
//! what remains visible to callers once that machinery gives up.
//!
//! A cache miss is not an error: `get` returns `Ok(None)` and `delete`
//! returns `Ok(false)`.

use thiserror::Error;

/// Cache operation result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the sharded cache client
#[derive(Debug, Error)]
pub enum CacheError {
    /// Value could not be represented by the configured codec
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// A single node could not be reached (retried internally before surfacing)
    #[error("Node unavailable: {node} - {reason}")]
    NodeUnavailable { node: String, reason: String },

    /// Every viable candidate node for a key was exhausted
    #[error("Cluster unavailable for key '{key}': {attempted} node(s) attempted")]
    ClusterUnavailable { key: String, attempted: usize },

    /// The overall operation deadline elapsed
    #[error("Timeout waiting for operation: {operation}")]
    Timeout { operation: String },

    /// No pooled connection became available in time
    #[error("Connection pool exhausted for node {node}")]
    PoolExhausted { node: String },

    /// Key is empty, oversized or contains characters the protocol cannot carry
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Operation attempted against an empty node set
    #[error("No nodes configured")]
    NoNodesConfigured,

    /// Server answered with ERROR, CLIENT_ERROR or SERVER_ERROR
    #[error("Server error from {node}: {message}")]
    ServerError { node: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl CacheError {
    /// Create a node unavailable error
    pub fn node_unavailable(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NodeUnavailable {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Create a cluster unavailable error
    pub fn cluster_unavailable(key: impl Into<String>, attempted: usize) -> Self {
        Self::ClusterUnavailable {
            key: key.into(),
            attempted,
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(node: impl Into<String>) -> Self {
        Self::PoolExhausted { node: node.into() }
    }

    /// Create a server error
    pub fn server_error(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServerError {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// Whether the error means the node itself is unhealthy.
    ///
    /// Only these failures count against node health and trigger a fallback
    /// attempt. Pool exhaustion is contention on a healthy node and server
    /// replies prove the node is alive, so neither qualifies.
    #[must_use]
    pub fn is_node_failure(&self) -> bool {
        matches!(self, CacheError::NodeUnavailable { .. })
    }

    /// Check if error is recoverable (worth retrying by the caller)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            CacheError::NodeUnavailable { .. }
            | CacheError::ClusterUnavailable { .. }
            | CacheError::Timeout { .. }
            | CacheError::PoolExhausted { .. } => true,
            CacheError::ServerError { message, .. } => message.starts_with("SERVER_ERROR"),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::EncodingError(error.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(error: bincode::Error) -> Self {
        CacheError::EncodingError(error.to_string())
    }
}
