//! Result types for command execution

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Serialize, Serializer};

use crate::error::ExecError;

/// Shared handle to captured process output
///
/// Clones point at the same bytes, so a handle returned from `start` keeps
/// filling while the process runs and can be read at any point.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the captured bytes
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Captured output as text, replacing invalid UTF-8
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Check whether the captured text contains `needle`
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.to_string_lossy().contains(needle)
    }

    pub(crate) fn append(&self, data: &[u8]) {
        self.lock().extend_from_slice(data);
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutputBuffer")
            .field(&self.to_string_lossy())
            .finish()
    }
}

impl Serialize for OutputBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

/// Captured output of one command invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandResult {
    /// stdout output, without prefixes
    pub stdout: OutputBuffer,
    /// stderr output, without prefixes
    pub stderr: OutputBuffer,
}

impl CommandResult {
    /// Combine stdout and stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        let stdout = self.stdout.to_string_lossy();
        let stderr = self.stderr.to_string_lossy();
        if stderr.is_empty() {
            stdout
        } else {
            format!("{stdout}{stderr}")
        }
    }
}

/// Output and exit error of a command that was started successfully
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Captured output
    pub output: CommandResult,
    /// Exit error reported by `wait`, if any
    pub error: Option<ExecError>,
}

impl RunOutcome {
    /// Check if command succeeded
    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Turn into a plain result, dropping the output on failure
    ///
    /// # Errors
    /// Returns the exit error recorded by `wait`
    pub fn into_result(self) -> Result<CommandResult, ExecError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.output),
        }
    }
}
