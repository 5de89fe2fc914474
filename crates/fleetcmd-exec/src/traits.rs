//! Command executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CommandResult, RunOutcome};

/// Two-phase start/wait contract shared by local and remote execution
///
/// `start` spawns and returns output handles that fill while the process
/// runs; `wait` reaps it. Each `start` must be followed by `wait` (or
/// `abort`) before the next one.
#[async_trait]
pub trait CommandExecutor: Send {
    /// Spawn `command`, killing it if it outlives a positive `timeout`
    ///
    /// # Errors
    /// Resolution and spawn failures; nothing is left running on error
    fn start(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError>;

    /// Block until the running command exits
    async fn wait(&mut self) -> Result<(), ExecError>;

    /// Kill the running command and reap it
    async fn abort(&mut self) -> Result<(), ExecError>;

    /// `start` followed by `wait`
    ///
    /// The outer error is a start failure; an exit failure is carried in
    /// [`RunOutcome::error`] alongside the captured output.
    async fn run(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<RunOutcome, ExecError> {
        let output = self.start(command, timeout)?;
        let error = self.wait().await.err();
        Ok(RunOutcome { output, error })
    }

    /// Whether a started command has not been waited on yet
    fn is_running(&self) -> bool;

    /// Drop a command that will never be waited on, killing it
    fn discard(&mut self);

    /// Working directory for subsequent commands
    fn set_cwd(&mut self, cwd: Option<&str>);

    fn executor_type(&self) -> &'static str;
}
