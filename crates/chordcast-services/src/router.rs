//! Request routing.
//!
//! For each topic the router decides whether this node owns it or which
//! finger the request should travel through next. Requests naming several
//! topics are split into one narrowed sub-request per next hop.

use std::sync::Arc;

use chordcast_core::topology::RingNode;
use chordcast_core::wire::{topic_hash, RingHash};

use crate::finger::FingerTable;
use crate::ring::{Ring, RingError};

/// Maps a topic onto a ring of `2^address_bits` positions.
pub type TopicHashFn = fn(&str, u32) -> RingHash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// This node owns the key.
    Local,
    /// The owner is in the finger table; send straight to it.
    Finger(RingNode),
    /// The owner is out of reach; send as far as possible without passing
    /// the key and let that node continue.
    BestEffort(RingNode),
}

impl Route {
    pub fn next_hop(&self) -> Option<&RingNode> {
        match self {
            Route::Local => None,
            Route::Finger(n) | Route::BestEffort(n) => Some(n),
        }
    }
}

/// Topics destined for one next hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub node: RingNode,
    pub topics: Vec<String>,
}

/// How a topic list splits across this node and its fingers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub local: Vec<String>,
    pub forwards: Vec<Hop>,
}

impl Plan {
    pub fn is_local_only(&self) -> bool {
        self.forwards.is_empty()
    }
}

pub struct Router {
    ring: Arc<Ring>,
    fingers: FingerTable,
    max_hops: u8,
    hasher: TopicHashFn,
}

impl Router {
    pub fn new(ring: Arc<Ring>, fingers: FingerTable, max_hops: u8) -> Self {
        Self {
            ring,
            fingers,
            max_hops,
            hasher: topic_hash,
        }
    }

    pub fn with_topic_hasher(mut self, hasher: TopicHashFn) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn local(&self) -> &RingNode {
        self.fingers.owner()
    }

    pub fn fingers(&self) -> &FingerTable {
        &self.fingers
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn max_hops(&self) -> u8 {
        self.max_hops
    }

    pub fn hash_topic(&self, topic: &str) -> RingHash {
        (self.hasher)(topic, self.ring.address_bits()) & self.ring.mask()
    }

    pub fn route(&self, key: RingHash) -> Route {
        let local = self.fingers.owner();
        let owner = self.ring.find_successor(key);
        if owner.id == local.id {
            return Route::Local;
        }
        if self.fingers.contains(&owner.id) {
            return Route::Finger(owner.clone());
        }
        let hop = self.fingers.closest_preceding(key);
        if hop.id == local.id {
            Route::BestEffort(self.fingers.successor().clone())
        } else {
            Route::BestEffort(hop.clone())
        }
    }

    /// Split `topics` between this node and its next hops. Duplicate topics
    /// are dropped; hops appear in the order their first topic did.
    pub fn plan(&self, topics: &[String]) -> Plan {
        let mut plan = Plan::default();
        let mut seen: Vec<&str> = Vec::with_capacity(topics.len());
        for topic in topics {
            if seen.contains(&topic.as_str()) {
                continue;
            }
            seen.push(topic.as_str());

            let route = self.route(self.hash_topic(topic));
            tracing::debug!(topic = %topic, ?route, "routed topic");
            match route.next_hop() {
                None => plan.local.push(topic.clone()),
                Some(node) => match plan.forwards.iter_mut().find(|h| h.node.id == node.id) {
                    Some(hop) => hop.topics.push(topic.clone()),
                    None => plan.forwards.push(Hop {
                        node: node.clone(),
                        topics: vec![topic.clone()],
                    }),
                },
            }
        }
        plan
    }

    /// Fails once a request has taken more than `max_hops` hops.
    pub fn check_hops(&self, hops: u8) -> Result<(), RingError> {
        if hops > self.max_hops {
            return Err(RingError::RoutingLoop {
                hops,
                max: self.max_hops,
            });
        }
        Ok(())
    }
}
