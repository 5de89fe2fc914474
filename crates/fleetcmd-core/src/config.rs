//! Configuration types for hosts and run policy

use std::path::PathBuf;
use std::time::Duration;

use fleetcmd_exec::HostTarget;
use serde::{Deserialize, Serialize};

use crate::cluster::ExecutionMode;
use crate::error::CoreError;

/// Configuration for a single host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Hostname or IP address, optionally as `user@host`
    pub addr: String,
    /// SSH user (overrides a user given in `addr`)
    pub user: Option<String>,
    /// SSH port (client default when unset)
    pub port: Option<u16>,
    /// Path to SSH private key (optional, falls back to ssh-agent)
    pub ssh_key: Option<PathBuf>,
    /// Remote working directory
    pub cwd: Option<String>,
    /// Force a remote terminal
    #[serde(default)]
    pub interactive: bool,
    /// Tags for filtering and grouping
    #[serde(default)]
    pub tags: Vec<String>,
}

impl HostConfig {
    /// Build the SSH target for this entry
    ///
    /// `index` is the entry's position, used in error messages.
    ///
    /// # Errors
    /// - `CoreError::MissingAddress` if `addr` is blank
    /// - `CoreError::InvalidHost` if `addr` has no host part or contains whitespace
    pub fn target(&self, index: usize) -> Result<HostTarget, CoreError> {
        let addr = self.addr.trim();
        if addr.is_empty() {
            return Err(CoreError::MissingAddress(index));
        }
        if addr.contains(char::is_whitespace) {
            return Err(CoreError::InvalidHost {
                host: addr.to_string(),
                reason: "address contains whitespace".to_string(),
            });
        }

        let mut target = HostTarget::parse(addr);
        if target.host.is_empty() {
            return Err(CoreError::InvalidHost {
                host: addr.to_string(),
                reason: "missing host after '@'".to_string(),
            });
        }

        if let Some(user) = &self.user {
            target = target.with_user(user.clone());
        }
        if let Some(port) = self.port {
            target = target.with_port(port);
        }
        if let Some(key) = &self.ssh_key {
            target = target.with_key(key.clone());
        }
        if let Some(cwd) = &self.cwd {
            target = target.with_cwd(cwd.clone());
        }

        Ok(target.interactive(self.interactive))
    }

    /// Whether the entry carries every tag in `tags`
    #[must_use]
    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|tag| self.tags.contains(tag))
    }
}

/// How rounds are run unless overridden on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPolicy {
    /// Parallel or sequential
    pub mode: ExecutionMode,
    /// Abort at the first failing host
    pub stop_on_error: bool,
    /// Per-host timeout in seconds (zero or unset disables it)
    pub timeout_secs: Option<u64>,
    /// Working directory applied to every host
    pub cwd: Option<String>,
}

impl RunPolicy {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Host selection
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    /// Only include these addresses
    pub hosts: Vec<String>,
    /// Only include hosts with these tags (AND logic)
    pub tags: Vec<String>,
}

impl HostFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.tags.is_empty()
    }

    #[must_use]
    pub fn matches(&self, host: &HostConfig) -> bool {
        let addr_ok = self.hosts.is_empty() || self.hosts.iter().any(|h| *h == host.addr);
        addr_ok && host.has_tags(&self.tags)
    }
}
