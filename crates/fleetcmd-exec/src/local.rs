//! Local command execution using `tokio::process`

use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::colors::paint_error;
use crate::error::ExecError;
use crate::path::ExecEnv;
use crate::result::CommandResult;
use crate::stream::{PrefixedStream, Sink};
use crate::traits::CommandExecutor;

/// Prefixes written in front of each console line
#[derive(Debug, Clone)]
pub struct Prefixes {
    /// Before the echoed command line
    pub echo: String,
    /// Before each stdout line
    pub stdout: String,
    /// Before each stderr line
    pub stderr: String,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            echo: "$ ".to_string(),
            stdout: "> ".to_string(),
            stderr: paint_error("@err "),
        }
    }
}

/// How a [`CommandRunner`] invokes the shell and handles output
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Shell to try before `$SHELL`, `bash` and `sh`
    pub shell: Option<PathBuf>,
    /// Pass `-i` to the shell
    pub interactive: bool,
    /// Pass `-l` to the shell
    pub login: bool,
    /// Keep a copy of stdout in the result
    pub record_stdout: bool,
    /// Keep a copy of stderr in the result
    pub record_stderr: bool,
    /// Don't print stdout (still recorded)
    pub mute_stdout: bool,
    /// Don't print stderr (still recorded)
    pub mute_stderr: bool,
    /// Don't print the command line before running it
    pub mute_echo: bool,
    /// Connect the child to our stdin instead of `/dev/null`
    pub inherit_stdin: bool,
    /// Working directory of the child
    pub cwd: Option<PathBuf>,
    pub prefix: Prefixes,
    /// Console destination for stdout lines and the echoed command
    pub stdout_sink: Sink,
    /// Console destination for stderr lines
    pub stderr_sink: Sink,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: None,
            interactive: false,
            login: false,
            record_stdout: true,
            record_stderr: true,
            mute_stdout: false,
            mute_stderr: false,
            mute_echo: false,
            inherit_stdin: false,
            cwd: None,
            prefix: Prefixes::default(),
            stdout_sink: Sink::Stdout,
            stderr_sink: Sink::Stderr,
        }
    }
}

impl RunnerConfig {
    /// Mute all console output; recording is unaffected
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.mute_stdout = true;
        self.mute_stderr = true;
        self.mute_echo = true;
        self
    }

    /// Shell arguments that run `command`
    #[must_use]
    pub fn shell_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if self.interactive {
            args.push("-i".to_string());
        }
        if self.login {
            args.push("-l".to_string());
        }
        args.push("-c".to_string());
        args.push(command.to_string());
        args
    }

    fn stdout_writer(&self) -> Box<dyn Write + Send> {
        if self.mute_stdout {
            Sink::Discard.open()
        } else {
            self.stdout_sink.open()
        }
    }

    fn stderr_writer(&self) -> Box<dyn Write + Send> {
        if self.mute_stderr {
            Sink::Discard.open()
        } else {
            self.stderr_sink.open()
        }
    }
}

/// How the supervised child ended
#[derive(Debug)]
enum Exit {
    Finished(ExitStatus),
    TimedOut(ExitStatus),
    Cancelled,
}

type Pump = JoinHandle<(PrefixedStream, io::Result<()>)>;

/// A spawned child and the tasks attached to it
///
/// Dropping this without `finish` kills the child: the supervisor treats a
/// dropped cancel sender as a kill request.
#[derive(Debug)]
struct RunningCommand {
    command: String,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    /// Process group of the child, when it leads its own
    group: Option<Pid>,
    supervisor: JoinHandle<io::Result<Exit>>,
    stdout: Pump,
    stderr: Pump,
    cancel: Option<oneshot::Sender<()>>,
}

impl RunningCommand {
    async fn finish(self, kill: bool) -> Result<(), ExecError> {
        let RunningCommand {
            command,
            timeout,
            deadline,
            group,
            supervisor,
            stdout,
            stderr,
            mut cancel,
        } = self;

        if kill {
            if let Some(tx) = cancel.take() {
                let _ = tx.send(());
            }
        }

        let exit = supervisor.await;
        // release the cancellation scope whatever the outcome
        drop(cancel);

        // background jobs of the child may still hold the pipes open; the
        // deadline stays armed until both reach EOF
        let drain = async { tokio::join!(stderr, stdout) };
        tokio::pin!(drain);
        let mut killed_late = false;
        let (stderr, stdout) = match (deadline, group) {
            (Some(deadline), Some(group)) => {
                let drained = tokio::time::timeout_at(deadline, &mut drain).await;
                match drained {
                    Ok(pumps) => pumps,
                    Err(_) => {
                        warn!(command = %command, "output still open at deadline, killing process group");
                        kill_group(group);
                        killed_late = true;
                        drain.await
                    }
                }
            }
            _ => drain.await,
        };

        for (name, pump) in [("stderr", stderr), ("stdout", stdout)] {
            match pump {
                Ok((mut stream, read)) => {
                    if let Err(e) = read {
                        warn!(command = %command, stream = name, error = %e, "output pump failed");
                    }
                    if let Err(e) = stream.close() {
                        warn!(command = %command, stream = name, error = %e, "failed to flush output");
                    }
                }
                Err(e) => {
                    warn!(command = %command, stream = name, error = %e, "output pump panicked");
                }
            }
        }

        let exit = exit
            .map_err(|e| ExecError::Io(e.to_string()))?
            .map_err(ExecError::from)?;

        let timed_out = |signal: Option<i32>| -> Result<(), ExecError> {
            let timeout = timeout.unwrap_or_default();
            error!(command = %command, timeout = ?timeout, "command timed out");
            Err(ExecError::Timeout { timeout, signal })
        };

        match exit {
            Exit::Finished(_) if killed_late => timed_out(Some(Signal::SIGKILL as i32)),
            Exit::Finished(status) => exit_result(status),
            Exit::TimedOut(status) => timed_out(status.signal()),
            Exit::Cancelled => Err(ExecError::Cancelled),
        }
    }
}

fn exit_result(status: ExitStatus) -> Result<(), ExecError> {
    if status.success() {
        return Ok(());
    }
    if let Some(signal) = status.signal() {
        return Err(ExecError::Signaled { signal });
    }
    Err(ExecError::ExitStatus {
        code: status.code().unwrap_or(-1),
    })
}

/// Owns the child until it exits, killing it on timeout or cancellation
async fn supervise(
    mut child: Child,
    deadline: Option<Instant>,
    group: Option<Pid>,
    cancel: oneshot::Receiver<()>,
) -> io::Result<Exit> {
    let expired = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status = child.wait() => Ok(Exit::Finished(status?)),
        () = expired => {
            terminate(&mut child, group);
            Ok(Exit::TimedOut(child.wait().await?))
        }
        _ = cancel => {
            terminate(&mut child, group);
            child.wait().await?;
            Ok(Exit::Cancelled)
        }
    }
}

fn terminate(child: &mut Child, group: Option<Pid>) {
    // the whole group, so grandchildren holding our pipes die too
    if let Some(group) = group {
        kill_group(group);
        return;
    }

    if let Err(e) = child.start_kill() {
        warn!(pid = ?child.id(), error = %e, "failed to kill child process");
    }
}

fn kill_group(group: Pid) {
    // ESRCH: everyone in the group is already gone
    match killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid = %group, error = %e, "failed to kill process group"),
    }
}

/// Copy a child pipe into its stream until EOF
///
/// Keeps draining after a sink error so the child never blocks on a full
/// pipe; the first error is reported back.
fn pump<R>(mut reader: R, mut stream: PrefixedStream) -> Pump
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        let mut result = Ok(());

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };

            if let Err(e) = stream.write_all(&buf[..n]) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        (stream, result)
    })
}

/// Runs shell commands as local child processes
///
/// Output is streamed line by line to the configured sinks with prefixes,
/// and recorded unprefixed into the [`CommandResult`] returned by `start`.
/// The runner is reusable: each `start`/`wait` pair is one invocation.
#[derive(Debug)]
pub struct CommandRunner {
    config: RunnerConfig,
    env: ExecEnv,
    /// Cached result of shell resolution
    shell_path: Option<PathBuf>,
    /// Shell override the cache was resolved for
    resolved_for: Option<PathBuf>,
    running: Option<RunningCommand>,
}

impl CommandRunner {
    /// Create a runner resolving binaries from the process environment
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_env(config, ExecEnv::from_env())
    }

    /// Create a runner with explicit resolution inputs
    #[must_use]
    pub fn with_env(config: RunnerConfig, env: ExecEnv) -> Self {
        Self {
            config,
            env,
            shell_path: None,
            resolved_for: None,
            running: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RunnerConfig {
        &mut self.config
    }

    #[must_use]
    pub fn env(&self) -> &ExecEnv {
        &self.env
    }

    /// Shell used by the last `start`, once resolved
    #[must_use]
    pub fn shell_path(&self) -> Option<&PathBuf> {
        self.shell_path.as_ref()
    }

    /// Whether a started command has not been waited on yet
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn resolve_shell(&mut self) -> Result<PathBuf, ExecError> {
        if let Some(path) = &self.shell_path {
            if self.resolved_for == self.config.shell {
                return Ok(path.clone());
            }
        }

        let path = self.env.resolve_shell(self.config.shell.as_deref())?;
        self.shell_path = Some(path.clone());
        self.resolved_for.clone_from(&self.config.shell);
        Ok(path)
    }

    /// Spawn `command` in the shell without waiting for it
    ///
    /// The returned buffers fill while the command runs.
    ///
    /// # Errors
    /// - `ExecError::AlreadyRunning` if the previous command wasn't waited on
    /// - `ExecError::BinaryNotFound` if no shell could be resolved
    /// - `ExecError::Spawn` if the OS refused to create the process
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime
    #[instrument(skip(self), level = "debug")]
    pub fn start(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError> {
        if self.running.is_some() {
            return Err(ExecError::AlreadyRunning);
        }

        let shell = self.resolve_shell()?;
        let timeout = timeout.filter(|t| !t.is_zero());

        let stdout_stream = PrefixedStream::new(
            self.config.stdout_writer(),
            self.config.prefix.stdout.clone(),
            self.config.record_stdout,
        );
        let stderr_stream = PrefixedStream::new(
            self.config.stderr_writer(),
            self.config.prefix.stderr.clone(),
            self.config.record_stderr,
        );
        let result = CommandResult {
            stdout: stdout_stream.get(),
            stderr: stderr_stream.get(),
        };

        if !self.config.mute_echo {
            let mut echo = self.config.stdout_sink.open();
            if let Err(e) = writeln!(echo, "{}{}", self.config.prefix.echo, command) {
                warn!(error = %e, "failed to echo command");
            }
        }

        let stdin = if self.config.inherit_stdin {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let mut cmd = Command::new(&shell);
        cmd.args(self.config.shell_args(command))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }

        // a terminal-attached child must stay in the foreground group
        let own_group = !self.config.inherit_stdin;
        if own_group {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ExecError::Io("child output pipes missing".to_string()));
        };

        debug!(
            shell = %shell.display(),
            pid = ?child.id(),
            timeout = ?timeout,
            "command started"
        );

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let deadline = timeout.map(|t| Instant::now() + t);
        #[allow(clippy::cast_possible_wrap)]
        let group = child
            .id()
            .filter(|_| own_group)
            .map(|pid| Pid::from_raw(pid as i32));

        self.running = Some(RunningCommand {
            command: command.to_string(),
            timeout,
            deadline,
            group,
            stdout: pump(stdout, stdout_stream),
            stderr: pump(stderr, stderr_stream),
            supervisor: tokio::spawn(supervise(child, deadline, group, cancel_rx)),
            cancel: Some(cancel_tx),
        });

        Ok(result)
    }

    /// Wait for the running command and flush its output
    ///
    /// # Errors
    /// - `ExecError::NotStarted` if nothing is running
    /// - `ExecError::ExitStatus` / `ExecError::Signaled` for failed commands
    /// - `ExecError::Timeout` if the command was killed by its timeout
    #[instrument(skip(self), level = "debug")]
    pub async fn wait(&mut self) -> Result<(), ExecError> {
        let running = self.running.take().ok_or(ExecError::NotStarted)?;
        let result = running.finish(false).await;
        debug!(ok = result.is_ok(), "command finished");
        result
    }

    /// Forget the running command without waiting for it
    ///
    /// The child is killed and reaped in the background; its output is
    /// not flushed.
    pub fn discard(&mut self) {
        if let Some(running) = self.running.take() {
            warn!(command = %running.command, "discarding command that was never waited on");
        }
    }

    /// Kill the running command, reap it and flush its output
    ///
    /// # Errors
    /// `ExecError::NotStarted` if nothing is running, otherwise
    /// `ExecError::Cancelled` unless the child had already exited
    pub async fn abort(&mut self) -> Result<(), ExecError> {
        let running = self.running.take().ok_or(ExecError::NotStarted)?;
        running.finish(true).await
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    fn start(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError> {
        CommandRunner::start(self, command, timeout)
    }

    async fn wait(&mut self) -> Result<(), ExecError> {
        CommandRunner::wait(self).await
    }

    async fn abort(&mut self) -> Result<(), ExecError> {
        CommandRunner::abort(self).await
    }

    fn is_running(&self) -> bool {
        CommandRunner::is_running(self)
    }

    fn discard(&mut self) {
        CommandRunner::discard(self);
    }

    fn set_cwd(&mut self, cwd: Option<&str>) {
        self.config.cwd = cwd.map(PathBuf::from);
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}
