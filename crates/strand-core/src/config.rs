//! Configuration system for Strand.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $STRAND_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/strand/config.toml
//!   3. ~/.config/strand/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::{DEFAULT_CHUNK_BYTES, HANDSHAKE_TIMEOUT_SECS, REASSEMBLY_TIMEOUT_SECS};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrandConfig {
    pub node: NodeConfig,
    pub coordinator: CoordinatorConfig,
    pub network: NetworkConfig,
    pub source: SourceConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Unique peer name. Empty = derived from hostname and PID at startup.
    pub name: String,
    /// Strand this node joins.
    pub strand: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// TCP endpoint of the rendezvous coordinator.
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP bind address for payload chunks; also the endpoint advertised to
    /// the coordinator. Port 0 = OS-assigned.
    pub payload_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Whether this node originates units of its own. A node with no source
    /// (or a failed one) operates in pure-relay mode.
    pub enabled: bool,
    /// Directory of files fed into the strand as opaque payload units,
    /// in lexical order.
    pub path: PathBuf,
    /// Pacing between originated units, in milliseconds.
    pub unit_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum chunk payload per datagram. Units larger than this are split.
    pub max_chunk_bytes: usize,
    /// Dedup window capacity per origin. Oldest keys are evicted beyond this.
    pub dedup_window: usize,
    /// Incomplete reassembly buffers older than this are discarded.
    pub reassembly_timeout_secs: u64,
    /// Neighbor handshake timeout.
    pub connect_timeout_secs: u64,
    /// Lazy connect attempts when forwarding to a disconnected neighbor
    /// before the unit is dropped for that hop.
    pub connect_retries: u32,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for StrandConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            coordinator: CoordinatorConfig::default(),
            network: NetworkConfig::default(),
            source: SourceConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            strand: "default".to_string(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:9000".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            payload_addr: "127.0.0.1:0".to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: data_dir().join("units"),
            unit_interval_ms: 40,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: DEFAULT_CHUNK_BYTES,
            dedup_window: 4096,
            reassembly_timeout_secs: REASSEMBLY_TIMEOUT_SECS,
            connect_timeout_secs: HANDSHAKE_TIMEOUT_SECS,
            connect_retries: 1,
        }
    }
}

// ── Path helpers ─────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("strand")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("strand")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ───────────────────────────────────────────────────────────────────

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
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl StrandConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            StrandConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("STRAND_CONFIG")
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
            let text = toml::to_string_pretty(&StrandConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply STRAND_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("STRAND_NODE__NAME") {
            self.node.name = v;
        }
        if let Ok(v) = std::env::var("STRAND_NODE__STRAND") {
            self.node.strand = v;
        }
        if let Ok(v) = std::env::var("STRAND_COORDINATOR__ENDPOINT") {
            self.coordinator.endpoint = v;
        }
        if let Ok(v) = std::env::var("STRAND_NETWORK__PAYLOAD_ADDR") {
            self.network.payload_addr = v;
        }
        if let Ok(v) = std::env::var("STRAND_SOURCE__ENABLED") {
            self.source.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("STRAND_SOURCE__PATH") {
            self.source.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("STRAND_RELAY__CONNECT_RETRIES") {
            if let Ok(n) = v.parse() {
                self.relay.connect_retries = n;
            }
        }
        if let Ok(v) = std::env::var("STRAND_RELAY__DEDUP_WINDOW") {
            if let Ok(n) = v.parse() {
                self.relay.dedup_window = n;
            }
        }
    }
}
