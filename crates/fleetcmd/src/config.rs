//! Configuration loading and types

use std::path::{Path, PathBuf};

use fleetcmd_core::{CoreError, HostConfig, HostFilter, RunPolicy};
use fleetcmd_exec::HostTarget;
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "FLEETCMD_CONFIG";

/// Top-level configuration, read from `fleetcmd.toml`
///
/// ```toml
/// [run]
/// mode = "parallel"
/// stop_on_error = true
/// timeout_secs = 60
///
/// [[host]]
/// addr = "web-1.example.com"
/// user = "deploy"
/// tags = ["web"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default run policy
    #[serde(default)]
    pub run: RunPolicy,
    /// Known hosts, in run order
    #[serde(default)]
    pub host: Vec<HostConfig>,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CoreError::ConfigError(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), hosts = config.host.len(), "loaded config");
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        for path in default_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Config::default())
    }

    /// Targets of the hosts matching `filter`, in config order
    ///
    /// # Errors
    /// Returns the first invalid host entry among the selected ones
    pub fn select_hosts(&self, filter: &HostFilter) -> Result<Vec<HostTarget>, CoreError> {
        self.host
            .iter()
            .enumerate()
            .filter(|(_, host)| filter.matches(host))
            .map(|(index, host)| host.target(index))
            .collect()
    }
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("fleetcmd.toml"),
        PathBuf::from("/etc/fleetcmd/fleetcmd.toml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("fleetcmd/fleetcmd.toml"));
    }
    paths
}
