//! Remote command execution through the OpenSSH client binary

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::colors::{paint_error, paint_host};
use crate::error::ExecError;
use crate::keys::validate_key;
use crate::local::{CommandRunner, Prefixes, RunnerConfig};
use crate::path::ExecEnv;
use crate::result::CommandResult;
use crate::target::HostTarget;
use crate::traits::CommandExecutor;

/// Console prefixes tagging output with a colored host name
#[must_use]
pub fn host_prefixes(host: &str) -> Prefixes {
    let tag = paint_host(host);
    Prefixes {
        stdout: format!("{tag} "),
        stderr: format!("{tag}{}", paint_error("@err ")),
        ..Prefixes::default()
    }
}

/// Single-quote `text` for one more round of shell evaluation
#[must_use]
pub fn single_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Commands that prompt for a password need a terminal on the remote side
#[must_use]
pub fn needs_tty(command: &str) -> bool {
    command.contains("sudo")
}

/// Runs commands on one host by wrapping them in an `ssh` invocation
///
/// The `ssh` command line is executed by a [`CommandRunner`], so output
/// streaming, recording and timeouts behave exactly like local commands.
#[derive(Debug)]
pub struct SshCommand {
    runner: CommandRunner,
    target: HostTarget,
    /// SSH client, given explicitly or resolved on first start
    client: Option<String>,
}

impl SshCommand {
    /// Create an adapter for `host` or `user@host`
    pub fn new(host: impl AsRef<str>) -> Self {
        Self::from_target(HostTarget::parse(host), ExecEnv::from_env())
    }

    /// Create an adapter for a fully described host
    #[must_use]
    pub fn from_target(target: HostTarget, env: ExecEnv) -> Self {
        let config = RunnerConfig {
            prefix: host_prefixes(&target.destination()),
            ..RunnerConfig::default()
        };

        Self {
            runner: CommandRunner::with_env(config, env),
            target,
            client: None,
        }
    }

    /// Use `client` verbatim as the SSH client command
    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn set_client(&mut self, client: Option<String>) {
        self.client = client;
    }

    #[must_use]
    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut HostTarget {
        &mut self.target
    }

    #[must_use]
    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut CommandRunner {
        &mut self.runner
    }

    fn resolve_client(&mut self) -> Result<String, ExecError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = self.runner.env().resolve_ssh()?.display().to_string();
        self.client = Some(client.clone());
        Ok(client)
    }

    /// Argument vector of the `ssh` invocation for `command`
    #[must_use]
    pub fn remote_args(&self, client: &str, command: &str) -> Vec<String> {
        let mut args = vec![client.to_string(), self.target.destination()];

        if self.target.interactive || needs_tty(command) {
            args.push("-tt".to_string());
        }
        if let Some(port) = self.target.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(key) = &self.target.key {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }

        let remote = match &self.target.cwd {
            Some(cwd) if !cwd.is_empty() => format!("cd {cwd} && {command}"),
            _ => command.to_string(),
        };
        args.push(single_quote(&remote));

        args
    }

    /// Start `command` on the remote host
    ///
    /// # Errors
    /// - `ExecError::NoHost` if no host is configured
    /// - `ExecError::BinaryNotFound` if the SSH client can't be found
    /// - `ExecError::KeyNotFound` if the identity file is missing
    /// - any error of [`CommandRunner::start`]
    #[instrument(skip(self), fields(host = %self.target.host), level = "debug")]
    pub fn start(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError> {
        if self.target.host.is_empty() {
            return Err(ExecError::NoHost);
        }

        let client = self.resolve_client()?;
        if let Some(key) = &self.target.key {
            validate_key(key)?;
        }

        let tty = self.target.interactive || needs_tty(command);
        self.runner.config_mut().inherit_stdin = tty;

        let invocation = self.remote_args(&client, command).join(" ");
        debug!(invocation = %invocation, "starting remote command");

        self.runner.start(&invocation, timeout)
    }

    /// Wait for the remote command
    ///
    /// # Errors
    /// See [`CommandRunner::wait`]
    pub async fn wait(&mut self) -> Result<(), ExecError> {
        self.runner.wait().await
    }

    /// Kill the local `ssh` process, ending the remote session
    ///
    /// # Errors
    /// See [`CommandRunner::abort`]
    pub async fn abort(&mut self) -> Result<(), ExecError> {
        self.runner.abort().await
    }
}

#[async_trait]
impl CommandExecutor for SshCommand {
    fn start(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError> {
        SshCommand::start(self, command, timeout)
    }

    async fn wait(&mut self) -> Result<(), ExecError> {
        SshCommand::wait(self).await
    }

    async fn abort(&mut self) -> Result<(), ExecError> {
        SshCommand::abort(self).await
    }

    fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    fn discard(&mut self) {
        self.runner.discard();
    }

    fn set_cwd(&mut self, cwd: Option<&str>) {
        self.target.cwd = cwd.map(str::to_string);
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}
