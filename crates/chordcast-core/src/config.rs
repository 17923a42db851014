//! Configuration system for chordcast.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CHORDCAST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/chordcast/config.toml
//!   3. ~/.config/chordcast/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::message::Dissemination;
use crate::wire::{DEFAULT_ADDRESS_BITS, DEFAULT_PEER_TIMEOUT_MS, MAX_ADDRESS_BITS};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordcastConfig {
    /// Plain values serialize ahead of the tables below.
    pub dissemination: Dissemination,
    pub node: NodeConfig,
    pub ring: RingConfig,
    pub quorum: QuorumConfig,
    pub capacity: CapacityConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Ring id of this node. Must appear in the topology file.
    pub name: String,
    /// Address to listen on.
    pub bind_addr: String,
    /// Discovery port. 0 = take it from the topology entry.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub topology_path: PathBuf,
    /// Size of the hash space in bits.
    pub address_bits: u32,
    /// Forwarding chains longer than this fail. 0 = 2 * address_bits.
    pub max_hops: u32,
}

/// How many distinct registrants the whole system expects before it is
/// considered ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    pub publishers: usize,
    pub subscribers: usize,
    /// Only consulted under broker dissemination.
    pub brokers: usize,
}

/// Per-node registration limits. 0 = unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub max_publishers: usize,
    pub max_subscribers: usize,
    pub max_brokers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Receive timeout on node-to-node forwards.
    pub peer_timeout_ms: u64,
    /// HTTP status API port. 0 = disabled.
    pub api_port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            bind_addr: "0.0.0.0".into(),
            port: 0,
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            topology_path: config_dir().join("dht.json"),
            address_bits: DEFAULT_ADDRESS_BITS,
            max_hops: 0,
        }
    }
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            publishers: 1,
            subscribers: 1,
            brokers: 1,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peer_timeout_ms: DEFAULT_PEER_TIMEOUT_MS,
            api_port: 0,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("chordcast")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ChordcastConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ChordcastConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CHORDCAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ChordcastConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Hop limit after resolving the 0 = derive default.
    pub fn effective_max_hops(&self) -> u32 {
        if self.ring.max_hops == 0 {
            2 * self.ring.address_bits
        } else {
            self.ring.max_hops
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bits = self.ring.address_bits;
        if bits == 0 || bits > MAX_ADDRESS_BITS {
            return Err(ConfigError::Invalid(format!(
                "ring.address_bits must be within 1..={MAX_ADDRESS_BITS}, got {bits}"
            )));
        }
        // Hop counts travel in a single header byte.
        if self.effective_max_hops() > u8::MAX as u32 {
            return Err(ConfigError::Invalid(format!(
                "ring.max_hops must fit in a byte, got {}",
                self.effective_max_hops()
            )));
        }
        if self.network.peer_timeout_ms == 0 {
            return Err(ConfigError::Invalid("network.peer_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// Apply CHORDCAST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CHORDCAST_NODE__NAME") {
            self.node.name = v;
        }
        if let Ok(v) = std::env::var("CHORDCAST_NODE__PORT") {
            if let Ok(p) = v.parse() {
                self.node.port = p;
            }
        }
        if let Ok(v) = std::env::var("CHORDCAST_RING__TOPOLOGY_PATH") {
            self.ring.topology_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CHORDCAST_RING__ADDRESS_BITS") {
            if let Ok(b) = v.parse() {
                self.ring.address_bits = b;
            }
        }
        if let Ok(v) = std::env::var("CHORDCAST_DISSEMINATION") {
            if let Ok(d) = v.parse() {
                self.dissemination = d;
            }
        }
        if let Ok(v) = std::env::var("CHORDCAST_QUORUM__PUBLISHERS") {
            if let Ok(n) = v.parse() {
                self.quorum.publishers = n;
            }
        }
        if let Ok(v) = std::env::var("CHORDCAST_QUORUM__SUBSCRIBERS") {
            if let Ok(n) = v.parse() {
                self.quorum.subscribers = n;
            }
        }
        if let Ok(v) = std::env::var("CHORDCAST_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_conventions() {
        let config = ChordcastConfig::default();
        assert_eq!(config.ring.address_bits, 8);
        assert_eq!(config.effective_max_hops(), 16);
        assert_eq!(config.network.peer_timeout_ms, 2000);
        assert_eq!(config.network.api_port, 0);
        assert_eq!(config.dissemination, Dissemination::Direct);
        assert_eq!(config.capacity.max_publishers, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ChordcastConfig::from_toml(
            r#"
            dissemination = "broker"

            [node]
            name = "dht2"

            [quorum]
            publishers = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.node.name, "dht2");
        assert_eq!(config.node.port, 0);
        assert_eq!(config.quorum.publishers, 3);
        assert_eq!(config.quorum.subscribers, 1);
        assert_eq!(config.dissemination, Dissemination::Broker);
    }

    #[test]
    fn explicit_max_hops_wins() {
        let mut config = ChordcastConfig::default();
        config.ring.max_hops = 5;
        assert_eq!(config.effective_max_hops(), 5);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = ChordcastConfig::default();
        config.ring.address_bits = 0;
        assert!(config.validate().is_err());

        let mut config = ChordcastConfig::default();
        config.ring.address_bits = 64;
        // 2 * 64 hops still fits in a byte.
        assert!(config.validate().is_ok());
        config.ring.max_hops = 300;
        assert!(config.validate().is_err());

        let mut config = ChordcastConfig::default();
        config.network.peer_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let tmp = std::env::temp_dir().join(format!("chordcast-config-test-{}", std::process::id()));
        let config_path = tmp.join("config.toml");
        std::fs::create_dir_all(&tmp).unwrap();

        unsafe {
            std::env::set_var("CHORDCAST_CONFIG", config_path.to_str().unwrap());
        }

        let path = ChordcastConfig::write_default_if_missing().expect("write_default_if_missing failed");
        assert!(path.exists());

        let config = ChordcastConfig::load().expect("load should succeed");
        assert_eq!(config.ring.address_bits, DEFAULT_ADDRESS_BITS);

        unsafe {
            std::env::remove_var("CHORDCAST_CONFIG");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
