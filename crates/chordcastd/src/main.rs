//! chordcastd: Chord-ring discovery daemon.
//!
//! Usage: chordcastd [node-name] [topology.json]

use std::path::PathBuf;

use anyhow::Result;

use chordcast_core::config::ChordcastConfig;
use chordcastd::Daemon;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = ChordcastConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = ChordcastConfig::load()?;

    let mut args = std::env::args().skip(1);
    if let Some(name) = args.next() {
        config.node.name = name;
    }
    if let Some(path) = args.next() {
        config.ring.topology_path = PathBuf::from(path);
    }
    tracing::info!(
        node = %config.node.name,
        topology = %config.ring.topology_path.display(),
        "chordcastd starting"
    );

    let handle = Daemon::start(config).await?;

    // ── Shutdown ─────────────────────────────────────────────────────────────
    let shutdown = handle.shutdown_sender();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        let _ = shutdown.send(());
    });

    handle.join().await;
    tracing::info!("shut down");
    Ok(())
}
