//! Configuration management for the node plugin

pub mod schema;

pub use schema::Config;

use crate::error::{CsiError, CsiResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Environment variable that disables reuse of a cached node record
pub const ALLOW_PATCH_STALE_NODE_ENV: &str = "ALLOW_PATCH_STALE_NODE";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("/etc/fluid/csi-node.toml")
    }

    /// Load configuration, using defaults if the file does not exist.
    ///
    /// Environment overrides are applied after the file is read.
    pub async fn load(&self) -> CsiResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CsiResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CsiError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| CsiError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment overrides. Only an unset variable or `"true"` keeps
/// stale node reuse enabled.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var(ALLOW_PATCH_STALE_NODE_ENV) {
        config.node.allow_stale_node = value == "true";
        debug!(
            "{}={} sets allow_stale_node={}",
            ALLOW_PATCH_STALE_NODE_ENV, value, config.node.allow_stale_node
        );
    }
}
