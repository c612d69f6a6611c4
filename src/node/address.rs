//! Node addresses in `host:port[:weight]` form.

use crate::constants::DEFAULT_PORT;
use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one cache node plus its ring weight
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
    pub weight: u32,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            weight: 1,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// `host:port`, the identity hashed onto the ring
    pub fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse an ordered address list, rejecting duplicates
    pub fn parse_list<S: AsRef<str>>(addresses: &[S]) -> CacheResult<Vec<NodeAddress>> {
        let mut parsed: Vec<NodeAddress> = Vec::with_capacity(addresses.len());
        for raw in addresses {
            let address: NodeAddress = raw.as_ref().parse()?;
            if parsed.iter().any(|existing| existing.name() == address.name()) {
                return Err(CacheError::config_error(format!(
                    "duplicate node address '{}'",
                    address.name()
                )));
            }
            parsed.push(address);
        }
        Ok(parsed)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CacheError::config_error("empty node address"));
        }

        let invalid = |reason: &str| CacheError::config_error(format!("invalid node address '{trimmed}': {reason}"));

        // Bracketed IPv6 literal: [::1]:11211[:weight]
        let (host, rest) = if let Some(stripped) = trimmed.strip_prefix('[') {
            let end = stripped.find(']').ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            let rest = &stripped[end + 1..];
            (stripped[..end].to_string(), rest.strip_prefix(':').unwrap_or(rest))
        } else {
            match trimmed.split_once(':') {
                Some((host, rest)) => (host.to_string(), rest),
                None => (trimmed.to_string(), ""),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let mut parts = rest.split(':').filter(|p| !p.is_empty());
        let port = match parts.next() {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("port is not a number"))?,
            None => DEFAULT_PORT,
        };
        let weight = match parts.next() {
            Some(weight) => weight.parse::<u32>().map_err(|_| invalid("weight is not a number"))?,
            None => 1,
        };
        if parts.next().is_some() {
            return Err(invalid("too many ':' separated parts"));
        }
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }
        if weight == 0 {
            return Err(invalid("weight must be greater than 0"));
        }

        Ok(NodeAddress { host, port, weight })
    }
}
