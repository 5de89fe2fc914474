//! Core error types for fleetcmd-core

use std::fmt;

use fleetcmd_exec::ExecError;
use thiserror::Error;

/// Which step of a round a host failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Spawning the command (parallel mode)
    Start,
    /// Waiting for the command (parallel mode)
    Wait,
    /// Start and wait together (sequential mode)
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Start => "start",
            Phase::Wait => "wait",
            Phase::Run => "run",
        })
    }
}

/// Summary error of a round, pointing at the host that produced it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{phase} failed on {host}: {source}")]
pub struct ClusterError {
    /// Host label as given to the cluster
    pub host: String,
    /// Position of the host in the cluster
    pub index: usize,
    pub phase: Phase,
    /// The host's own error
    pub source: ExecError,
}

impl ClusterError {
    pub(crate) fn new(index: usize, host: &str, phase: Phase, source: ExecError) -> Self {
        Self {
            host: host.to_string(),
            index,
            phase,
            source,
        }
    }
}

/// Errors in fleet configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Host entry without an address
    #[error("host entry {0} has no address")]
    MissingAddress(usize),

    /// Host entry with an unusable value
    #[error("invalid host {host}: {reason}")]
    InvalidHost {
        /// Address of the offending entry
        host: String,
        /// What is wrong with it
        reason: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}
