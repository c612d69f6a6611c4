//! # Consistent Hash Ring
//!
//! Maps keys to nodes so that adding or removing a node only reassigns the
//! keys whose nearest point moved (about 1/N of the keyspace), instead of
//! reshuffling everything the way `hash(key) % N` would.
//!
//! ## Layout
//!
//! Every node contributes `points_per_server * weight * N / total_weight`
//! synthetic points. Clockwise runs toward lower positions: a key is owned by
//! the node holding the last point at or below the key's hash, wrapping to the
//! highest point when the hash sits below every point. This is the lookup
//! Dalli performs, so keys written by Ruby clients are found on the same
//! node. Walking further clockwise yields the fallback candidates, each node
//! appearing once.
//!
//! Points at identical positions are ordered by node name, so two rings built
//! from the same node set always agree.
//!
//! A `Ring` is immutable. Node set changes build a new ring.

pub mod hashing;

use crate::error::{CacheError, CacheResult};
use crate::node::NodeAddress;

pub use hashing::{key_hash, point_hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RingPoint {
    position: u32,
    node: usize,
}

/// Immutable continuum of node points
#[derive(Debug, Clone)]
pub struct Ring {
    points: Vec<RingPoint>,
    nodes: Vec<NodeAddress>,
}

impl Ring {
    /// Build the continuum for an ordered node set
    pub fn new(nodes: Vec<NodeAddress>, points_per_server: u32) -> Self {
        let total_weight: u64 = nodes.iter().map(|n| u64::from(n.weight)).sum();
        let node_count = nodes.len() as u64;
        let names: Vec<String> = nodes.iter().map(NodeAddress::name).collect();

        let mut points = Vec::new();
        for (index, node) in nodes.iter().enumerate() {
            let count = (node_count * u64::from(points_per_server) * u64::from(node.weight))
                .checked_div(total_weight)
                .unwrap_or(0)
                .max(1);
            for point in 0..count as u32 {
                points.push(RingPoint {
                    position: point_hash(&names[index], point),
                    node: index,
                });
            }
        }

        sort_points(&mut points, &names);

        Self { points, nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes on the ring
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn nodes(&self) -> &[NodeAddress] {
        &self.nodes
    }

    /// Index into [`Ring::nodes`] of the key's primary node
    pub fn primary(&self, key: &[u8]) -> CacheResult<usize> {
        let start = self.start_index(key)?;
        Ok(self.points[start].node)
    }

    /// Address of the key's primary node
    pub fn primary_address(&self, key: &[u8]) -> CacheResult<&NodeAddress> {
        let index = self.primary(key)?;
        Ok(&self.nodes[index])
    }

    /// Primary followed by up to `fallback_depth` distinct fallback nodes,
    /// in clockwise ring order
    pub fn candidates(&self, key: &[u8], fallback_depth: usize) -> CacheResult<Vec<usize>> {
        let start = self.start_index(key)?;
        let wanted = (fallback_depth + 1).min(self.nodes.len());

        let mut seen = vec![false; self.nodes.len()];
        let mut candidates = Vec::with_capacity(wanted);
        let len = self.points.len();
        for offset in 0..len {
            let point = self.points[(start + len - offset) % len];
            if !seen[point.node] {
                seen[point.node] = true;
                candidates.push(point.node);
                if candidates.len() == wanted {
                    break;
                }
            }
        }

        Ok(candidates)
    }

    fn start_index(&self, key: &[u8]) -> CacheResult<usize> {
        if self.points.is_empty() {
            return Err(CacheError::NoNodesConfigured);
        }
        let hash = key_hash(key);
        let above = self.points.partition_point(|p| p.position <= hash);
        Ok(above.checked_sub(1).unwrap_or(self.points.len() - 1))
    }
}

fn sort_points(points: &mut [RingPoint], names: &[String]) {
    points.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| names[a.node].cmp(&names[b.node]))
    });
}
