//! # Server Discovery
//!
//! Pluggable sources for the node address list. The client never decides
//! where addresses come from; it asks a [`ServerSource`] and swaps in whatever
//! comes back via [`CacheClient::refresh_from`].
//!
//! [`CacheClient::refresh_from`]: crate::client::CacheClient::refresh_from

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;

/// Environment variable read by [`EnvServers::default`]
pub const DEFAULT_SERVERS_VAR: &str = "MEMCACHE_SERVERS";

/// Something that can produce the current `host:port[:weight]` list
#[async_trait]
pub trait ServerSource: Send + Sync {
    async fn servers(&self) -> CacheResult<Vec<String>>;

    /// Human-readable source name for logs
    fn describe(&self) -> String;
}

/// A fixed list
#[derive(Debug, Clone, Default)]
pub struct StaticServers {
    servers: Vec<String>,
}

impl StaticServers {
    pub fn new<S: Into<String>>(servers: impl IntoIterator<Item = S>) -> Self {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ServerSource for StaticServers {
    async fn servers(&self) -> CacheResult<Vec<String>> {
        Ok(self.servers.clone())
    }

    fn describe(&self) -> String {
        format!("static({} servers)", self.servers.len())
    }
}

/// Comma-separated list read from an environment variable at refresh time
#[derive(Debug, Clone)]
pub struct EnvServers {
    variable: String,
}

impl EnvServers {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    /// Split a comma-separated list, dropping blanks
    pub fn parse(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for EnvServers {
    fn default() -> Self {
        Self::new(DEFAULT_SERVERS_VAR)
    }
}

#[async_trait]
impl ServerSource for EnvServers {
    async fn servers(&self) -> CacheResult<Vec<String>> {
        let value = std::env::var(&self.variable).map_err(|e| {
            CacheError::config_error(format!("cannot read {}: {e}", self.variable))
        })?;
        Ok(Self::parse(&value))
    }

    fn describe(&self) -> String {
        format!("env({})", self.variable)
    }
}
