//! Finger tables.
//!
//! Entry `i` of a node's table is the owner of `(hash + 2^i) mod 2^m`. Entry
//! 0 is therefore always the node's immediate successor, and the entries
//! reach exponentially further around the ring.

use serde::Serialize;

use chordcast_core::topology::RingNode;
use chordcast_core::wire::RingHash;

use crate::ring::{is_between, Ring, RingError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerEntry {
    /// `(owner.hash + 2^index) mod 2^m`.
    pub start: RingHash,
    pub node: RingNode,
}

#[derive(Debug, Clone)]
pub struct FingerTable {
    owner: RingNode,
    entries: Vec<FingerEntry>,
}

impl FingerTable {
    pub fn build(node_id: &str, ring: &Ring) -> Result<Self, RingError> {
        let owner = ring.node(node_id)?.clone();
        let mask = ring.mask();
        let entries = (0..ring.address_bits())
            .map(|i| {
                let start = owner.hash.wrapping_add(1u64 << i) & mask;
                FingerEntry {
                    start,
                    node: ring.find_successor(start).clone(),
                }
            })
            .collect();
        Ok(Self { owner, entries })
    }

    pub fn owner(&self) -> &RingNode {
        &self.owner
    }

    pub fn entries(&self) -> &[FingerEntry] {
        &self.entries
    }

    /// Entry 0.
    pub fn successor(&self) -> &RingNode {
        match self.entries.first() {
            Some(entry) => &entry.node,
            None => &self.owner,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.node.id == id)
    }

    /// Each node referenced by the table once, in table order.
    pub fn distinct_nodes(&self) -> Vec<RingNode> {
        let mut out: Vec<RingNode> = Vec::new();
        for entry in &self.entries {
            if !out.iter().any(|n| n.id == entry.node.id) {
                out.push(entry.node.clone());
            }
        }
        out
    }

    /// The entry that gets furthest toward `key` without passing it.
    ///
    /// Falls back to the last entry when no entry lies between this node and
    /// the key.
    pub fn closest_preceding(&self, key: RingHash) -> &RingNode {
        self.entries
            .iter()
            .rev()
            .map(|e| &e.node)
            .find(|n| n.id != self.owner.id && (n.hash == key || is_between(n.hash, self.owner.hash, key)))
            .unwrap_or_else(|| match self.entries.last() {
                Some(entry) => &entry.node,
                None => &self.owner,
            })
    }
}
