//! Node status, ring, finger table and registration commands.

use anyhow::Result;
use serde::Deserialize;

use chordcast_core::topology::RingNode;

use super::http::{base_url, get_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    node: String,
    hash: u64,
    endpoint: String,
    address_bits: u32,
    dissemination: String,
    ready: bool,
    local_quorum_met: bool,
    publishers: usize,
    subscribers: usize,
    brokers: usize,
    pending_forwards: usize,
    ring_size: usize,
}

#[derive(Deserialize)]
struct RingResponse {
    address_bits: u32,
    nodes: Vec<RingNode>,
}

#[derive(Deserialize)]
struct FingersResponse {
    node: String,
    fingers: Vec<FingerInfo>,
}

#[derive(Deserialize)]
struct FingerInfo {
    start: u64,
    node: RingNode,
}

#[derive(Deserialize)]
struct RegistrationsResponse {
    registrations: Vec<RegistrationInfo>,
}

#[derive(Deserialize)]
struct RegistrationInfo {
    id: String,
    role: String,
    address: String,
    port: u16,
    topics: Vec<String>,
}

#[derive(Deserialize)]
struct TopicResponse {
    topic: String,
    hash: u64,
    owner: RingNode,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let s: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Discovery Node {}", s.node);
    println!("═══════════════════════════════════════");
    println!("  Endpoint         : {}", s.endpoint);
    println!("  Ring hash        : {} ({}-bit space)", s.hash, s.address_bits);
    println!("  Ring size        : {}", s.ring_size);
    println!("  Dissemination    : {}", s.dissemination);
    println!("  System ready     : {}", s.ready);
    println!("  Local quorum     : {}", s.local_quorum_met);
    println!("  Publishers       : {}", s.publishers);
    println!("  Subscribers      : {}", s.subscribers);
    println!("  Brokers          : {}", s.brokers);
    println!("  Pending forwards : {}", s.pending_forwards);
    Ok(())
}

pub async fn cmd_ring(port: u16) -> Result<()> {
    let r: RingResponse = get_json(&format!("{}/ring", base_url(port))).await?;

    println!("Ring ({} nodes, {}-bit space)", r.nodes.len(), r.address_bits);
    for n in &r.nodes {
        println!("  {:>20}  {:<10} {}", n.hash, n.id, n.endpoint());
    }
    Ok(())
}

pub async fn cmd_fingers(port: u16) -> Result<()> {
    let f: FingersResponse = get_json(&format!("{}/fingers", base_url(port))).await?;

    println!("Finger table of {}", f.node);
    for (i, e) in f.fingers.iter().enumerate() {
        println!("  [{:>2}] start {:>20} -> {} ({})", i, e.start, e.node.id, e.node.hash);
    }
    Ok(())
}

pub async fn cmd_registrations(port: u16) -> Result<()> {
    let r: RegistrationsResponse = get_json(&format!("{}/registrations", base_url(port))).await?;

    if r.registrations.is_empty() {
        println!("No registrants stored on this node.");
        return Ok(());
    }
    for reg in &r.registrations {
        println!("  ┌─ {} ({})", reg.id, reg.role);
        println!("  │  address : {}:{}", reg.address, reg.port);
        println!("  └─ topics  : {}", reg.topics.join(", "));
    }
    Ok(())
}

pub async fn cmd_topic(port: u16, topic: &str) -> Result<()> {
    let t: TopicResponse = get_json(&format!("{}/topics/{}", base_url(port), topic)).await?;
    println!("{} -> hash {} -> {} ({})", t.topic, t.hash, t.owner.id, t.owner.endpoint());
    Ok(())
}
