//! Connection details for a remote host

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where and how to reach a host with the SSH client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTarget {
    /// Host address or `~/.ssh/config` alias
    pub host: String,
    /// Login user (the client's default when unset)
    #[serde(default)]
    pub user: Option<String>,
    /// Port (the client's default when unset)
    #[serde(default)]
    pub port: Option<u16>,
    /// Identity file passed with `-i`
    #[serde(default)]
    pub key: Option<PathBuf>,
    /// Remote working directory
    #[serde(default)]
    pub cwd: Option<String>,
    /// Force pseudo-terminal allocation
    #[serde(default)]
    pub interactive: bool,
}

impl HostTarget {
    /// Parse `host` or `user@host`
    pub fn parse(spec: impl AsRef<str>) -> Self {
        let spec = spec.as_ref().trim();
        match spec.split_once('@') {
            Some((user, host)) if !user.is_empty() => Self {
                host: host.to_string(),
                user: Some(user.to_string()),
                ..Self::default()
            },
            _ => Self {
                host: spec.trim_start_matches('@').to_string(),
                ..Self::default()
            },
        }
    }

    /// Set login user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set SSH key path
    #[must_use]
    pub fn with_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.key = Some(path.into());
        self
    }

    /// Set remote working directory
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Force pseudo-terminal allocation
    #[must_use]
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// `user@host`, or the bare host without a user
    #[must_use]
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) if !user.is_empty() => format!("{user}@{}", self.host),
            _ => self.host.clone(),
        }
    }
}
