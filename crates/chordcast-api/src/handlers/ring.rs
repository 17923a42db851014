//! /ring, /fingers and /topics/{topic} handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use chordcast_core::topology::RingNode;
use chordcast_core::wire::{topic_hash, RingHash};
use chordcast_services::FingerEntry;

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct RingResponse {
    pub address_bits: u32,
    pub nodes: Vec<RingNode>,
}

pub async fn handle_ring(State(state): State<ApiState>) -> Json<RingResponse> {
    Json(RingResponse {
        address_bits: state.ring.address_bits(),
        nodes: state.ring.nodes().to_vec(),
    })
}

#[derive(Debug, Serialize)]
pub struct FingersResponse {
    pub node: String,
    pub fingers: Vec<FingerEntry>,
}

pub async fn handle_fingers(State(state): State<ApiState>) -> Json<FingersResponse> {
    let s = state.snapshot();
    Json(FingersResponse {
        node: s.node.id,
        fingers: s.fingers,
    })
}

// ── /topics/{topic} ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TopicResponse {
    pub topic: String,
    pub hash: RingHash,
    pub owner: RingNode,
}

/// Where a topic lives on the ring.
pub async fn handle_topic(State(state): State<ApiState>, Path(topic): Path<String>) -> Json<TopicResponse> {
    let hash = topic_hash(&topic, state.ring.address_bits());
    let owner = state.ring.find_successor(hash).clone();
    Json(TopicResponse { topic, hash, owner })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixture;

    #[tokio::test]
    async fn ring_is_sorted_by_hash() {
        let Json(ring) = handle_ring(State(fixture::state())).await;
        let hashes: Vec<_> = ring.nodes.iter().map(|n| n.hash).collect();
        assert_eq!(hashes, vec![10, 90, 170]);
        assert_eq!(ring.address_bits, 8);
    }

    #[tokio::test]
    async fn fingers_cover_every_bit() {
        let Json(f) = handle_fingers(State(fixture::state())).await;
        assert_eq!(f.node, "dht2");
        assert_eq!(f.fingers.len(), 8);
        assert_eq!(f.fingers[0].start, 91);
        assert_eq!(f.fingers[0].node.id, "dht3");
    }

    #[tokio::test]
    async fn topic_owner_follows_the_ring() {
        let Json(t) = handle_topic(State(fixture::state()), Path("weather".into())).await;
        assert_eq!(t.hash, topic_hash("weather", 8));
        let expected = match t.hash {
            10..=89 => "dht2",
            90..=169 => "dht3",
            _ => "dht1",
        };
        assert_eq!(t.owner.id, expected);
    }

    #[tokio::test]
    async fn ring_does_not_depend_on_published_snapshots() {
        let state = fixture::state();
        let copy = state.clone();
        assert!(std::sync::Arc::ptr_eq(&state.ring, &copy.ring));

        // The snapshot sender is gone; ring views are still served.
        let Json(ring) = handle_ring(State(copy)).await;
        assert_eq!(ring.nodes.len(), 3);
        let Json(t) = handle_topic(State(state), Path("news".into())).await;
        assert!(["dht1", "dht2", "dht3"].contains(&t.owner.id.as_str()));
    }
}
