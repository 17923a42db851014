//! HTTP API handlers: exposes node state as JSON.
//!
//! Handlers only read the snapshot the event loop publishes whenever the
//! node changes, plus the ring the node was started with. They never reach
//! into the live node.

pub mod ring;
pub mod status;

use std::sync::Arc;

use tokio::sync::watch;

use chordcast_services::{NodeSnapshot, Ring};

#[derive(Clone)]
pub struct ApiState {
    pub snapshots: watch::Receiver<NodeSnapshot>,
    /// Membership is fixed for the node's lifetime.
    pub ring: Arc<Ring>,
}

impl ApiState {
    pub fn new(snapshots: watch::Receiver<NodeSnapshot>, ring: Arc<Ring>) -> Self {
        Self { snapshots, ring }
    }

    fn snapshot(&self) -> NodeSnapshot {
        self.snapshots.borrow().clone()
    }
}

pub use ring::{handle_fingers, handle_ring, handle_topic};
pub use status::{handle_registrations, handle_status};

#[cfg(test)]
pub(crate) mod fixture {
    use chordcast_core::message::{RegisterRequest, RegistrantInfo, Request, Role};
    use chordcast_core::topology::RingNode;
    use chordcast_services::{DiscoveryNode, NodeSettings, RequestContext};

    use super::*;

    /// A three-node ring seen from `dht2`, with one publisher registered.
    pub fn state() -> ApiState {
        let ring = Arc::new(
            Ring::new(
                vec![
                    RingNode::new("dht1", 10, "10.0.0.1", 5556),
                    RingNode::new("dht2", 90, "10.0.0.2", 5556),
                    RingNode::new("dht3", 170, "10.0.0.3", 5556),
                ],
                8,
            )
            .unwrap(),
        );
        let mut node = DiscoveryNode::new("dht2", ring.clone(), NodeSettings::default())
            .unwrap()
            .with_topic_hasher(|_, _| 50);
        node.handle_request(
            RequestContext::client(1, 1),
            Request::Register(RegisterRequest::new(
                Role::Publisher,
                RegistrantInfo {
                    id: "pub1".into(),
                    address: "10.0.1.1".into(),
                    port: 7000,
                },
                vec!["weather".into()],
            )),
        );
        let (_tx, rx) = watch::channel(node.snapshot());
        ApiState::new(rx, ring)
    }
}
