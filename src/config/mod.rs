//! # Client Configuration
//!
//! Every knob the client uses is explicit on [`ClientConfig`]. The struct is
//! built once, validated, and handed to [`CacheClient::new`]; nothing is read
//! from process-wide state afterwards.
//!
//! ## Usage
//!
//! ```rust
//! use cream_client::config::ClientConfig;
//!
//! let config = ClientConfig {
//!     servers: vec![
//!         "localhost:11201".to_string(),
//!         "localhost:11202".to_string(),
//!         "localhost:11203".to_string(),
//!     ],
//!     ..ClientConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! assert_eq!(config.failover.fallback_depth, 2);
//! ```
//!
//! [`CacheClient::new`]: crate::client::CacheClient::new

pub mod loader;

use crate::codec::Codec;
use crate::constants::{
    DEFAULT_POINTS_PER_SERVER, DEFAULT_VALUE_MAX_BYTES, MAX_KEY_LENGTH, NAMESPACE_SEPARATOR,
};
use crate::error::{CacheError, CacheResult};
use crate::node::{HealthPolicy, NodeAddress};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sharded cache client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Ordered `host:port[:weight]` node list
    pub servers: Vec<String>,
    /// Value serialization codec
    pub codec: Codec,
    /// Optional prefix applied as `namespace:key`
    pub namespace: Option<String>,
    /// TTL applied when an operation passes none (0 = never expire)
    pub default_ttl_secs: u64,
    /// Largest encoded value accepted for storage
    pub value_max_bytes: usize,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub failover: FailoverConfig,
    pub pool: PoolConfig,
    pub ring: RingConfig,
}

/// Timeouts applied at each layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per request on one connection, also bounds pool checkout
    pub request_ms: u64,
    /// TCP connect to a node
    pub connect_ms: u64,
    /// Whole public operation, fallbacks included
    pub operation_deadline_ms: u64,
}

/// Per-node retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts against the same node after a network failure
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
}

/// Fallback routing and node health thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Distinct fallback nodes tried after the primary
    pub fallback_depth: usize,
    /// Consecutive failures that mark a node Down
    pub failure_threshold: u32,
    /// Failures further apart than this reset the count
    pub failure_window_ms: u64,
    /// How long a Down node is skipped before a probe
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections per node
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Synthetic ring points per weight-1 server
    pub points_per_server: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:11211".to_string()],
            codec: Codec::Json,
            namespace: None,
            default_ttl_secs: 0,
            value_max_bytes: DEFAULT_VALUE_MAX_BYTES,
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            failover: FailoverConfig::default(),
            pool: PoolConfig::default(),
            ring: RingConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 1000,
            connect_ms: 1000,
            operation_deadline_ms: 5000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 100,
        }
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            fallback_depth: 2,
            failure_threshold: 2,
            failure_window_ms: 60_000,
            cooldown_ms: 30_000,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { size: 4 }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            points_per_server: DEFAULT_POINTS_PER_SERVER,
        }
    }
}

impl ClientConfig {
    /// Config for a node list with every other setting at its default
    pub fn with_servers<S: Into<String>>(servers: impl IntoIterator<Item = S>) -> Self {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> CacheResult<()> {
        NodeAddress::parse_list(&self.servers)?;

        if let Some(namespace) = &self.namespace {
            if namespace.is_empty() {
                return Err(CacheError::config_error("namespace must not be empty when set"));
            }
            if namespace.len() + 1 >= MAX_KEY_LENGTH {
                return Err(CacheError::config_error(format!(
                    "namespace leaves no room for keys (max key length {MAX_KEY_LENGTH})"
                )));
            }
            if namespace.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
                return Err(CacheError::config_error(
                    "namespace must not contain whitespace or control characters",
                ));
            }
            if namespace.contains(NAMESPACE_SEPARATOR) {
                return Err(CacheError::config_error(format!(
                    "namespace must not contain '{NAMESPACE_SEPARATOR}'"
                )));
            }
        }

        if self.timeouts.request_ms == 0 {
            return Err(CacheError::config_error("timeouts.request_ms must be greater than 0"));
        }
        if self.timeouts.connect_ms == 0 {
            return Err(CacheError::config_error("timeouts.connect_ms must be greater than 0"));
        }
        if self.timeouts.operation_deadline_ms == 0 {
            return Err(CacheError::config_error(
                "timeouts.operation_deadline_ms must be greater than 0",
            ));
        }
        if self.retry.max_retries > 10 {
            return Err(CacheError::config_error("retry.max_retries should not exceed 10"));
        }
        if self.failover.failure_threshold == 0 {
            return Err(CacheError::config_error(
                "failover.failure_threshold must be greater than 0",
            ));
        }
        if self.failover.cooldown_ms == 0 {
            return Err(CacheError::config_error("failover.cooldown_ms must be greater than 0"));
        }
        if self.pool.size == 0 {
            return Err(CacheError::config_error("pool.size must be greater than 0"));
        }
        if self.ring.points_per_server == 0 {
            return Err(CacheError::config_error(
                "ring.points_per_server must be greater than 0",
            ));
        }
        if self.value_max_bytes == 0 {
            return Err(CacheError::config_error("value_max_bytes must be greater than 0"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.connect_ms)
    }

    pub fn operation_deadline(&self) -> Duration {
        Duration::from_millis(self.timeouts.operation_deadline_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry.retry_delay_ms)
    }

    /// TTL used when an operation passes none
    pub fn default_ttl(&self) -> Option<Duration> {
        match self.default_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            failure_threshold: self.failover.failure_threshold,
            failure_window: Duration::from_millis(self.failover.failure_window_ms),
            cooldown: Duration::from_millis(self.failover.cooldown_ms),
        }
    }
}
