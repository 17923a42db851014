//! Wiring for one ring node: listener, peer links, event loop and the
//! optional status API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use chordcast_core::config::ChordcastConfig;
use chordcast_core::topology::Topology;
use chordcast_services::{DiscoveryNode, NodeSettings, NodeSnapshot, Ring};

use crate::event_loop::{EventLoop, PeerSenders};
use crate::listener::DiscoveryListener;
use crate::peer::PeerLink;

pub struct Daemon;

impl Daemon {
    /// Load the topology named by the config, bind the node's port and start.
    pub async fn start(config: ChordcastConfig) -> Result<DaemonHandle> {
        let path = &config.ring.topology_path;
        let topology = Topology::load(path)?;
        let ring = Arc::new(
            Ring::from_topology(&topology, config.ring.address_bits)
                .with_context(|| format!("invalid topology {}", path.display()))?,
        );
        let name = node_name(&config)?;
        let local = ring.node(name)?;
        let port = if config.node.port == 0 {
            local.port
        } else {
            config.node.port
        };

        let bind = format!("{}:{port}", config.node.bind_addr);
        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind discovery listener on {bind}"))?;
        Self::spawn(config, ring, listener)
    }

    /// Start on an already bound listener. The ring is taken as given.
    pub async fn start_with_listener(
        config: ChordcastConfig,
        ring: Arc<Ring>,
        listener: std::net::TcpListener,
    ) -> Result<DaemonHandle> {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        Self::spawn(config, ring, listener)
    }

    fn spawn(config: ChordcastConfig, ring: Arc<Ring>, listener: TcpListener) -> Result<DaemonHandle> {
        let name = node_name(&config)?;
        let node = DiscoveryNode::new(name, ring.clone(), NodeSettings::from_config(&config))?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            node = %node.id(),
            hash = node.local().hash,
            addr = %local_addr,
            dissemination = ?config.dissemination,
            "discovery node listening"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snap_tx, snap_rx) = watch::channel(node.snapshot());
        let mut tasks = Vec::new();

        // ── Peer links ────────────────────────────────────────────────────────
        let timeout = Duration::from_millis(config.network.peer_timeout_ms);
        let mut peers = PeerSenders::new();
        for peer in node.peers() {
            let (job_tx, job_rx) = mpsc::unbounded_channel();
            peers.insert(peer.id.clone(), job_tx);
            tasks.push(tokio::spawn(
                PeerLink::new(peer, timeout, job_rx, events_tx.clone(), shutdown_tx.subscribe()).run(),
            ));
        }

        // ── Listener ──────────────────────────────────────────────────────────
        let listener = DiscoveryListener::new(listener, events_tx, shutdown_tx.subscribe());
        tasks.push(tokio::spawn(async move {
            if let Err(e) = listener.run().await {
                tracing::error!(error = %e, "discovery listener failed");
            }
        }));

        // ── Event loop ────────────────────────────────────────────────────────
        tasks.push(tokio::spawn(
            EventLoop::new(node, events_rx, peers, snap_tx, shutdown_tx.subscribe()).run(),
        ));

        // ── Status API ────────────────────────────────────────────────────────
        let api = match config.network.api_port {
            0 => None,
            port => {
                let state = chordcast_api::ApiState::new(snap_rx.clone(), ring);
                Some(tokio::spawn(async move {
                    if let Err(e) = chordcast_api::serve(state, port).await {
                        tracing::error!(error = %e, "status server failed");
                    }
                }))
            }
        };

        Ok(DaemonHandle {
            local_addr,
            snapshots: snap_rx,
            shutdown: shutdown_tx,
            tasks,
            api,
        })
    }
}

fn node_name(config: &ChordcastConfig) -> Result<&str> {
    if config.node.name.is_empty() {
        bail!("node.name is not set; pass it on the command line or set CHORDCAST_NODE__NAME");
    }
    Ok(&config.node.name)
}

pub struct DaemonHandle {
    local_addr: SocketAddr,
    snapshots: watch::Receiver<NodeSnapshot>,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
    api: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Latest published state of the node.
    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeSnapshot> {
        self.snapshots.clone()
    }

    /// Sender that stops every task of this node.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Wait until the node's tasks have stopped.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "node task panicked");
            }
        }
        if let Some(api) = self.api {
            api.abort();
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        self.join().await;
    }
}
