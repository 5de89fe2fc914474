//! Error types for fleetcmd-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while starting or waiting on a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// No candidate binary was found on the search path
    #[error("can't find {what} binary, tried: {candidates:?}")]
    BinaryNotFound {
        /// Which binary was being resolved (`shell`, `ssh`)
        what: &'static str,
        /// Candidates in the order they were tried
        candidates: Vec<String>,
    },

    /// SSH identity file does not exist
    #[error("SSH key not found: {0}")]
    KeyNotFound(String),

    /// Remote command requested without a host
    #[error("no host to run ssh command")]
    NoHost,

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// Process exited with a non-zero status
    #[error("command exited with status {code}")]
    ExitStatus {
        /// Exit status code
        code: i32,
    },

    /// Process was terminated by a signal it was not sent by us
    #[error("command terminated by signal {signal}")]
    Signaled {
        /// Terminating signal number
        signal: i32,
    },

    /// Process was killed because it outlived its timeout
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
        /// Signal the process died from, if the OS reported one
        signal: Option<i32>,
    },

    /// Process was killed on request before it finished
    #[error("command cancelled")]
    Cancelled,

    /// I/O error while supervising the process
    #[error("I/O error: {0}")]
    Io(String),

    /// `wait` called with no running command
    #[error("command not started")]
    NotStarted,

    /// `start` called while a command is still running
    #[error("command already running")]
    AlreadyRunning,
}

impl ExecError {
    /// Signal that terminated the process, if any
    #[must_use]
    pub fn signal(&self) -> Option<i32> {
        match self {
            ExecError::Signaled { signal } => Some(*signal),
            ExecError::Timeout { signal, .. } => *signal,
            _ => None,
        }
    }

    /// Exit code of a process that exited on its own
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::ExitStatus { code } => Some(*code),
            _ => None,
        }
    }

    /// Check if the process was killed by its timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }

    /// Check if the error happened before any process was spawned
    #[must_use]
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            ExecError::BinaryNotFound { .. }
                | ExecError::KeyNotFound(_)
                | ExecError::NoHost
                | ExecError::Spawn(_)
                | ExecError::AlreadyRunning
        )
    }
}

impl From<std::io::Error> for ExecError {
    fn from(err: std::io::Error) -> Self {
        ExecError::Io(err.to_string())
    }
}
