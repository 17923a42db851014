//! chordcast integration test harness.
//!
//! Every test starts a small ring of real daemons on 127.0.0.1, each on a
//! listener bound to an ephemeral port before the topology is built, and
//! talks to it with `DiscoveryClient`.
//!
//!   cargo test --test integration

use std::sync::Arc;

use anyhow::{Context, Result};

use chordcast_core::config::ChordcastConfig;
use chordcast_core::message::RegistrantInfo;
use chordcast_core::topology::RingNode;
use chordcast_core::wire::topic_hash;
use chordcast_services::{DiscoveryClient, Ring};
use chordcastd::{Daemon, DaemonHandle};

mod faults;
mod lookup;
mod readiness;
mod register;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const BITS: u32 = 8;

/// The three-node layout used by most tests.
pub const THREE: &[u64] = &[10, 90, 170];

pub struct Cluster {
    pub ring: Arc<Ring>,
    pub nodes: Vec<(String, DaemonHandle)>,
}

impl Cluster {
    pub async fn start(hashes: &[u64]) -> Result<Self> {
        Self::start_with(hashes, &[], |_| {}).await
    }

    /// Nodes named in `down` are in the topology but never started; their
    /// ports refuse connections.
    pub async fn start_with(
        hashes: &[u64],
        down: &[&str],
        tweak: impl Fn(&mut ChordcastConfig),
    ) -> Result<Self> {
        let mut ring_nodes = Vec::new();
        let mut listeners = Vec::new();
        for (i, hash) in hashes.iter().enumerate() {
            let id = format!("dht{}", i + 1);
            let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
            let port = listener.local_addr()?.port();
            ring_nodes.push(RingNode::new(id.clone(), *hash, "127.0.0.1", port));
            if !down.contains(&id.as_str()) {
                listeners.push((id, listener));
            }
        }
        let ring = Arc::new(Ring::new(ring_nodes, BITS)?);

        let mut nodes = Vec::new();
        for (id, listener) in listeners {
            let mut config = ChordcastConfig::default();
            config.node.name = id.clone();
            config.ring.address_bits = BITS;
            config.network.peer_timeout_ms = 1000;
            tweak(&mut config);
            let handle = Daemon::start_with_listener(config, ring.clone(), listener)
                .await
                .with_context(|| format!("failed to start {id}"))?;
            nodes.push((id, handle));
        }
        Ok(Self { ring, nodes })
    }

    pub fn node(&self, id: &str) -> &DaemonHandle {
        &self
            .nodes
            .iter()
            .find(|(n, _)| n == id)
            .unwrap_or_else(|| panic!("{id} is not running"))
            .1
    }

    pub async fn client(&self, id: &str) -> Result<DiscoveryClient> {
        let addr = self.node(id).local_addr().to_string();
        Ok(DiscoveryClient::connect(&addr)
            .await?
            .with_timeout(std::time::Duration::from_secs(5)))
    }

    pub fn owner(&self, topic: &str) -> String {
        self.ring.find_successor(topic_hash(topic, BITS)).id.clone()
    }

    /// A topic name whose hash lands on node `id`.
    pub fn topic_owned_by(&self, id: &str) -> String {
        (0..10_000)
            .map(|i| format!("topic-{i}"))
            .find(|t| self.owner(t) == id)
            .unwrap_or_else(|| panic!("no topic found for {id}"))
    }

    pub async fn shutdown(self) {
        for (_, handle) in self.nodes {
            handle.shutdown().await;
        }
    }
}

pub fn registrant(id: &str, port: u16) -> RegistrantInfo {
    RegistrantInfo {
        id: id.into(),
        address: "127.0.0.1".into(),
        port,
    }
}

/// Ids of the registrants node `id` stores, with their topics.
pub fn stored(cluster: &Cluster, id: &str) -> Vec<(String, Vec<String>)> {
    cluster
        .node(id)
        .snapshot()
        .registrations
        .into_iter()
        .map(|r| (r.info.id, r.topics.into_iter().collect()))
        .collect()
}
