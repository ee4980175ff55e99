//! Node configuration surface (§6).
//!
//! A `NodeConfig` is parsed from a TOML file and overridable by CLI flags
//! (see `src/bin/*.rs`). No component reaches for a hidden global; every
//! constructor in this crate takes a `NodeConfig` (or a narrower slice of
//! it) explicitly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub storage: StorageConfig,
    pub timeout: TimeoutConfig,
    pub interval: IntervalConfig,
    pub retry: RetryConfig,
    pub consensus: ConsensusConfig,
    pub replication: ReplicationConfig,
    pub network: NetworkConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            timeout: TimeoutConfig::default(),
            interval: IntervalConfig::default(),
            retry: RetryConfig::default(),
            consensus: ConsensusConfig::default(),
            replication: ReplicationConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parses a `NodeConfig` from a TOML file on disk, falling back to
    /// defaults for any field the file omits.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("reading {}: {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `storage.base.path` — parent directory for all node stores.
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { base_path: PathBuf::from("./data") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub lock_ms: u64,
    pub sync_ms: u64,
    pub connection_ms: u64,
    pub read_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { lock_ms: 2_000, sync_ms: 3_000, connection_ms: 1_000, read_ms: 2_000 }
    }
}

impl TimeoutConfig {
    pub fn lock(&self) -> Duration {
        Duration::from_millis(self.lock_ms)
    }
    pub fn sync(&self) -> Duration {
        Duration::from_millis(self.sync_ms)
    }
    pub fn connection(&self) -> Duration {
        Duration::from_millis(self.connection_ms)
    }
    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub health_check_sec: u64,
    pub cleanup_sec: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self { health_check_sec: 5, cleanup_sec: 10 }
    }
}

impl IntervalConfig {
    pub fn health_check(&self) -> Duration {
        Duration::from_secs(self.health_check_sec)
    }
    pub fn cleanup(&self) -> Duration {
        Duration::from_secs(self.cleanup_sec)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// `consensus.require.unanimity` — unanimous vs majority lock grants.
    /// Authoritative: `consensus.require.unanimity` decides majority vs
    /// unanimous lock grants, not a hardcoded policy.
    pub require_unanimity: bool,
    pub round_timeout_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self { require_unanimity: false, round_timeout_ms: 5_000 }
    }
}

impl ConsensusConfig {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// `replication.verify.writes` — post-write read-back check.
    pub verify_writes: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self { verify_writes: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub default_host: String,
    /// Comma-separated in the TOML source; stored already split.
    pub default_ports: Vec<u16>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { default_host: "127.0.0.1".to_string(), default_ports: Vec::new() }
    }
}
