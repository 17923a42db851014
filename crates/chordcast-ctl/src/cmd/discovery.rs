//! Commands that speak the discovery protocol to a ring node.

use anyhow::{Result, bail};

use chordcast_core::message::{LookupResponse, RegistrantInfo, Role, Status};
use chordcast_core::topology::Topology;
use chordcast_core::wire::{DEFAULT_PORT, topic_hash};
use chordcast_services::DiscoveryClient;

/// Which ring node to talk to.
pub enum Target {
    Node(String),
    Topology(std::path::PathBuf),
}

impl Target {
    /// Resolve to a `host:port`. A topology file yields a random member, the
    /// way registrants spread their load over the ring.
    pub fn endpoint(&self) -> Result<String> {
        match self {
            Target::Node(addr) => Ok(addr.clone()),
            Target::Topology(path) => {
                let topology = Topology::load(path)?;
                match topology.pick_random() {
                    Some(node) => Ok(node.endpoint()),
                    None => bail!("{} lists no nodes", path.display()),
                }
            }
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Target::Node(format!("127.0.0.1:{DEFAULT_PORT}"))
    }
}

async fn connect(target: &Target) -> Result<DiscoveryClient> {
    DiscoveryClient::connect(&target.endpoint()?).await
}

pub async fn cmd_register(target: &Target, args: &[&str]) -> Result<()> {
    let [role, id, address, port, topics @ ..] = args else {
        bail!("usage: register <pub|sub|broker> <id> <address> <port> [topics...]");
    };
    let role: Role = role.parse().map_err(anyhow::Error::msg)?;
    let info = RegistrantInfo {
        id: id.to_string(),
        address: address.to_string(),
        port: port.parse()?,
    };
    let topics = topics.iter().map(|t| t.to_string()).collect();

    let resp = connect(target).await?.register(role, info, topics).await?;
    match resp.status {
        Status::Success => println!("registered {id}"),
        _ => bail!(
            "registration failed: {}",
            resp.reason.unwrap_or_else(|| "no reason given".into())
        ),
    }
    Ok(())
}

pub async fn cmd_ready(target: &Target) -> Result<()> {
    let ready = connect(target).await?.is_ready().await?;
    println!("{}", if ready { "ready" } else { "not ready" });
    Ok(())
}

pub async fn cmd_wait_ready(target: &Target, attempts: u32) -> Result<()> {
    if connect(target).await?.wait_ready(attempts).await? {
        println!("ready");
        Ok(())
    } else {
        bail!("system not ready after {attempts} polls")
    }
}

pub async fn cmd_lookup(target: &Target, topics: &[&str], attempts: u32) -> Result<()> {
    let topics = topics.iter().map(|t| t.to_string()).collect();
    let resp = connect(target).await?.lookup_when_ready(topics, attempts).await?;
    print_lookup(resp)
}

pub async fn cmd_lookup_all(target: &Target) -> Result<()> {
    let resp = connect(target).await?.lookup_all().await?;
    print_lookup(resp)
}

fn print_lookup(resp: LookupResponse) -> Result<()> {
    match resp.status {
        Status::Success => {
            if resp.publishers.is_empty() {
                println!("no publishers");
            }
            for p in &resp.publishers {
                println!("  {:<16} {}:{}", p.id, p.address, p.port);
            }
            Ok(())
        }
        Status::CheckAgain => bail!("system not ready yet, check again later"),
        Status::Failure => bail!("lookup failed"),
    }
}

pub fn cmd_hash(topic: &str, bits: u32) -> Result<()> {
    if bits == 0 || bits > chordcast_core::wire::MAX_ADDRESS_BITS {
        bail!("bits must be within 1..={}", chordcast_core::wire::MAX_ADDRESS_BITS);
    }
    println!("{topic} -> {}", topic_hash(topic, bits));
    Ok(())
}
