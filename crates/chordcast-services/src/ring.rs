//! Ring topology model.
//!
//! The ring is the set of discovery nodes ordered by hash, wrapping from the
//! largest hash back to the smallest. It is built once from the topology
//! file and never changes afterwards, so every query here is a pure function
//! of the sorted node list.

use chordcast_core::topology::{RingNode, Topology, TopologyError};
use chordcast_core::wire::{ring_mask, RingHash};

#[derive(Debug, thiserror::Error)]
pub enum RingError {
    #[error("ring has no nodes")]
    Empty,
    #[error("node {0} is not on the ring")]
    UnknownNode(String),
    #[error("request exceeded {max} hops (arrived with {hops})")]
    RoutingLoop { hops: u8, max: u8 },
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// `key` lies strictly inside the circular interval `(low, high)`.
///
/// When `low > high` the interval wraps past zero. When `low == high` the
/// interval covers the whole circle except `low` itself, which is what a
/// single-node ring needs.
pub fn is_between(key: RingHash, low: RingHash, high: RingHash) -> bool {
    if low < high {
        low < key && key < high
    } else {
        key > low || key < high
    }
}

#[derive(Debug, Clone)]
pub struct Ring {
    nodes: Vec<RingNode>,
    address_bits: u32,
}

impl Ring {
    pub fn from_topology(topology: &Topology, address_bits: u32) -> Result<Self, RingError> {
        Ok(Self {
            nodes: topology.validated(address_bits)?,
            address_bits,
        })
    }

    /// Build a ring from already trusted nodes. They are validated the same
    /// way a topology file is.
    pub fn new(nodes: Vec<RingNode>, address_bits: u32) -> Result<Self, RingError> {
        if nodes.is_empty() {
            return Err(RingError::Empty);
        }
        Self::from_topology(&Topology { dht: nodes }, address_bits)
    }

    pub fn address_bits(&self) -> u32 {
        self.address_bits
    }

    /// Largest valid position, `2^m - 1`.
    pub fn mask(&self) -> RingHash {
        ring_mask(self.address_bits)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in ascending hash order.
    pub fn nodes(&self) -> &[RingNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Result<&RingNode, RingError> {
        self.position(id).map(|i| &self.nodes[i])
    }

    fn position(&self, id: &str) -> Result<usize, RingError> {
        self.nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| RingError::UnknownNode(id.to_string()))
    }

    pub fn successor(&self, id: &str) -> Result<&RingNode, RingError> {
        let i = self.position(id)?;
        Ok(&self.nodes[(i + 1) % self.nodes.len()])
    }

    pub fn predecessor(&self, id: &str) -> Result<&RingNode, RingError> {
        let i = self.position(id)?;
        Ok(&self.nodes[(i + self.nodes.len() - 1) % self.nodes.len()])
    }

    /// The node whose arc `(node, successor]` contains `key`.
    ///
    /// A key equal to a node's hash makes that node the predecessor. The walk
    /// visits each node at most once.
    pub fn find_predecessor(&self, key: RingHash) -> &RingNode {
        let count = self.nodes.len();
        for i in 0..count {
            let node = &self.nodes[i];
            let next = &self.nodes[(i + 1) % count];
            if key == node.hash || is_between(key, node.hash, next.hash) {
                return node;
            }
        }
        // Every key falls in some arc; only reachable for a corrupt ring.
        &self.nodes[count - 1]
    }

    /// The node that owns `key`.
    pub fn find_successor(&self, key: RingHash) -> &RingNode {
        let count = self.nodes.len();
        let pred = self.find_predecessor(key);
        let i = self
            .nodes
            .iter()
            .position(|n| n.id == pred.id)
            .unwrap_or(count - 1);
        &self.nodes[(i + 1) % count]
    }
}
