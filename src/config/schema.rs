//! Configuration schema for the node plugin
//!
//! Configuration is stored at `/etc/fluid/csi-node.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Node identity and label cache settings
    pub node: NodeConfig,

    /// External command locations
    pub commands: CommandsConfig,

    /// Session manager readiness polling
    pub session_manager: SessionManagerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Node settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name of the node object this plugin runs on
    pub id: String,

    /// Reuse a previously fetched node record when patching labels
    pub allow_stale_node: bool,

    /// Refetch the cached node record after N seconds (0 = never expires)
    pub node_cache_ttl_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            allow_stale_node: true,
            node_cache_ttl_secs: 0,
        }
    }
}

/// Paths of the external commands the plugin runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// mount binary
    pub mount: String,

    /// umount binary
    pub umount: String,

    /// kubectl binary used as the metadata store client
    pub kubectl: String,

    /// Script that blocks until a FUSE mount point is ready
    pub check_mount: PathBuf,

    /// Script that reports whether a volume is still bind mounted
    pub check_bind_mounts: PathBuf,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            mount: "mount".to_string(),
            umount: "umount".to_string(),
            kubectl: "kubectl".to_string(),
            check_mount: PathBuf::from("/usr/local/bin/check_mount.sh"),
            check_bind_mounts: PathBuf::from("/usr/local/bin/check_bind_mounts.sh"),
        }
    }
}

/// Session manager readiness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionManagerConfig {
    /// Delay between readiness file checks in milliseconds
    pub poll_interval_ms: u64,

    /// Number of checks before giving up
    pub max_attempts: u32,
}

impl SessionManagerConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_attempts: 30,
        }
    }
}
