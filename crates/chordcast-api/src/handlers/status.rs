//! /status and /registrations handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use chordcast_core::message::{Dissemination, Role};
use chordcast_core::wire::RingHash;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub node: String,
    pub hash: RingHash,
    pub endpoint: String,
    pub address_bits: u32,
    pub dissemination: Dissemination,
    pub ready: bool,
    pub local_quorum_met: bool,
    pub publishers: usize,
    pub subscribers: usize,
    pub brokers: usize,
    pub pending_forwards: usize,
    pub ring_size: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let s = state.snapshot();
    Json(StatusResponse {
        endpoint: s.node.endpoint(),
        node: s.node.id,
        hash: s.node.hash,
        address_bits: s.address_bits,
        dissemination: s.dissemination,
        ready: s.ready,
        local_quorum_met: s.local_quorum_met,
        publishers: s.publishers,
        subscribers: s.subscribers,
        brokers: s.brokers,
        pending_forwards: s.pending_forwards,
        ring_size: state.ring.len(),
    })
}

// ── /registrations ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RegistrationsResponse {
    pub registrations: Vec<RegistrationInfo>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationInfo {
    pub id: String,
    pub role: Role,
    pub address: String,
    pub port: u16,
    pub topics: Vec<String>,
}

pub async fn handle_registrations(State(state): State<ApiState>) -> Json<RegistrationsResponse> {
    let registrations = state
        .snapshot()
        .registrations
        .into_iter()
        .map(|r| RegistrationInfo {
            id: r.info.id,
            role: r.role,
            address: r.info.address,
            port: r.info.port,
            topics: r.topics.into_iter().collect(),
        })
        .collect();
    Json(RegistrationsResponse { registrations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixture;

    #[tokio::test]
    async fn status_reports_counts_and_identity() {
        let Json(status) = handle_status(State(fixture::state())).await;
        assert_eq!(status.node, "dht2");
        assert_eq!(status.hash, 90);
        assert_eq!(status.endpoint, "10.0.0.2:5556");
        assert_eq!(status.publishers, 1);
        assert_eq!(status.subscribers, 0);
        assert_eq!(status.ring_size, 3);
        assert!(!status.ready);
        assert!(!status.local_quorum_met);
    }

    #[tokio::test]
    async fn registrations_list_topics() {
        let Json(list) = handle_registrations(State(fixture::state())).await;
        assert_eq!(list.registrations.len(), 1);
        let r = &list.registrations[0];
        assert_eq!(r.id, "pub1");
        assert_eq!(r.role, Role::Publisher);
        assert_eq!(r.topics, vec!["weather".to_string()]);

        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["registrations"][0]["role"], "publisher");
    }
}
