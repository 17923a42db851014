//! Ring topology file.
//!
//! The deployment describes its discovery nodes in a JSON document:
//!
//! ```json
//! {"dht": [{"id": "dht1", "hash": 10, "IP": "10.0.0.1", "port": 5556}]}
//! ```
//!
//! The ring is fixed for the lifetime of a deployment, so the file is read
//! once at startup and validated before any node begins routing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::wire::{ring_mask, RingHash, MAX_ADDRESS_BITS};

/// One discovery node on the ring. Identity is `id`, ordering is `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingNode {
    pub id: String,
    pub hash: RingHash,
    #[serde(rename = "IP")]
    pub address: String,
    pub port: u16,
}

impl RingNode {
    pub fn new(id: impl Into<String>, hash: RingHash, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            hash,
            address: address.into(),
            port,
        }
    }

    /// `address:port`, suitable for `TcpStream::connect`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// The parsed topology document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub dht: Vec<RingNode>,
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse topology: {0}")]
    ParseFailed(#[from] serde_json::Error),
    #[error("topology contains no nodes")]
    Empty,
    #[error("duplicate node id {0}")]
    DuplicateId(String),
    #[error("duplicate node hash {0}")]
    DuplicateHash(RingHash),
    #[error("node {id} has hash {hash} outside a {bits}-bit ring")]
    HashOutOfRange { id: String, hash: RingHash, bits: u32 },
    #[error("address bits must be within 1..={}, got {0}", MAX_ADDRESS_BITS)]
    InvalidAddressBits(u32),
}

impl Topology {
    pub fn from_json(text: &str) -> Result<Self, TopologyError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TopologyError::ReadFailed(path.to_path_buf(), e))?;
        Self::from_json(&text)
    }

    /// Check the topology against a ring of `2^address_bits` positions and
    /// return its nodes sorted ascending by hash.
    pub fn validated(&self, address_bits: u32) -> Result<Vec<RingNode>, TopologyError> {
        if address_bits == 0 || address_bits > MAX_ADDRESS_BITS {
            return Err(TopologyError::InvalidAddressBits(address_bits));
        }
        if self.dht.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mask = ring_mask(address_bits);
        let mut ids = HashSet::new();
        let mut hashes = HashSet::new();
        for node in &self.dht {
            if node.hash > mask {
                return Err(TopologyError::HashOutOfRange {
                    id: node.id.clone(),
                    hash: node.hash,
                    bits: address_bits,
                });
            }
            if !ids.insert(node.id.as_str()) {
                return Err(TopologyError::DuplicateId(node.id.clone()));
            }
            if !hashes.insert(node.hash) {
                return Err(TopologyError::DuplicateHash(node.hash));
            }
        }

        let mut nodes = self.dht.clone();
        nodes.sort_by_key(|n| n.hash);
        Ok(nodes)
    }

    pub fn node(&self, id: &str) -> Option<&RingNode> {
        self.dht.iter().find(|n| n.id == id)
    }

    /// Any node will do as an entry point; registrants spread their load.
    pub fn pick_random(&self) -> Option<&RingNode> {
        self.dht.choose(&mut rand::thread_rng())
    }
}
