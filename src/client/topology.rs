//! Immutable snapshot of the node set and its ring.

use crate::config::ClientConfig;
use crate::error::CacheResult;
use crate::node::{Node, NodeAddress};
use crate::ring::Ring;
use std::collections::HashMap;
use std::sync::Arc;

/// Ring plus the nodes it indexes, `nodes[i]` matching `ring.nodes()[i]`.
///
/// Replaced wholesale on refresh; never mutated in place.
#[derive(Debug)]
pub(crate) struct Topology {
    ring: Ring,
    nodes: Vec<Arc<Node>>,
}

impl Topology {
    /// Build a snapshot, reusing nodes from `previous` whose `host:port`
    /// survives so their health and pooled connections carry over
    pub fn build(addresses: Vec<NodeAddress>, config: &ClientConfig, previous: Option<&Topology>) -> Self {
        let mut existing: HashMap<&str, &Arc<Node>> = previous
            .map(|topology| topology.nodes.iter().map(|node| (node.name(), node)).collect())
            .unwrap_or_default();

        let nodes = addresses
            .iter()
            .map(|address| match existing.remove(address.name().as_str()) {
                Some(node) => Arc::clone(node),
                None => Arc::new(Node::new(address.clone(), config)),
            })
            .collect();

        Self {
            ring: Ring::new(addresses, config.ring.points_per_server),
            nodes,
        }
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Primary then fallback nodes for a qualified key
    pub fn candidates(&self, key: &str, fallback_depth: usize) -> CacheResult<Vec<Arc<Node>>> {
        Ok(self
            .ring
            .candidates(key.as_bytes(), fallback_depth)?
            .into_iter()
            .map(|index| Arc::clone(&self.nodes[index]))
            .collect())
    }

    /// Index of the key's primary node
    pub fn primary(&self, key: &str) -> CacheResult<usize> {
        self.ring.primary(key.as_bytes())
    }

    pub fn node(&self, index: usize) -> &Arc<Node> {
        &self.nodes[index]
    }
}
