//! Cluster orchestration: one command across an ordered set of hosts
//!
//! A round runs a command on every member, either all at once
//! ([`ExecutionMode::Parallel`]) or one host after another
//! ([`ExecutionMode::Sequential`]). Results always follow the host list
//! order, whatever order the processes finish in.

use std::fmt;
use std::time::Duration;

use fleetcmd_exec::{
    CommandExecutor, CommandResult, ExecEnv, ExecError, HostTarget, RunnerConfig, SshCommand,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{ClusterError, Phase};

/// How a round schedules its hosts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Start every host, then wait for each in order
    #[default]
    Parallel,
    /// Start and wait one host at a time
    Sequential,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Sequential => "sequential",
        })
    }
}

/// A host label bound to the executor that reaches it
#[derive(Debug)]
pub struct ClusterMember<E> {
    pub host: String,
    pub executor: E,
}

/// Outcome of one host in one round
#[derive(Debug, Clone)]
pub struct ClusterResult {
    /// Host label as given to the cluster
    pub host: String,
    /// This host's own error, if it failed
    pub error: Option<ExecError>,
    /// Captured output (empty if the command never started)
    pub output: CommandResult,
}

impl ClusterResult {
    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// A parallel round between `start_all` and `wait_all`
///
/// Slot `i` belongs to member `i`. A round cut short by stop-on-error
/// holds only the hosts attempted before the failure.
#[derive(Debug)]
#[must_use = "a started round must be passed to `wait_all`"]
pub struct Round {
    results: Vec<ClusterResult>,
    started: Vec<bool>,
    error: Option<ClusterError>,
}

impl Round {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
            started: Vec::with_capacity(capacity),
            error: None,
        }
    }

    fn push(&mut self, result: ClusterResult, started: bool) {
        self.results.push(result);
        self.started.push(started);
    }

    /// Results so far; output buffers fill while commands run
    #[must_use]
    pub fn results(&self) -> &[ClusterResult] {
        &self.results
    }

    /// Start failure that cut the round short
    #[must_use]
    pub fn error(&self) -> Option<&ClusterError> {
        self.error.as_ref()
    }

    /// Number of hosts that were started successfully
    #[must_use]
    pub fn started_count(&self) -> usize {
        self.started.iter().filter(|s| **s).count()
    }
}

/// Final snapshot of a round
#[derive(Debug)]
pub struct RoundReport {
    /// One entry per attempted host, in host list order
    pub results: Vec<ClusterResult>,
    /// Summary error: the first failure by the round's ordering rules
    pub error: Option<ClusterError>,
}

impl RoundReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Results of hosts that failed
    pub fn failed(&self) -> impl Iterator<Item = &ClusterResult> {
        self.results.iter().filter(|r| !r.success())
    }

    /// Drop partial results if the round failed
    ///
    /// # Errors
    /// Returns the summary error
    pub fn into_result(self) -> Result<Vec<ClusterResult>, ClusterError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.results),
        }
    }
}

/// Runs a command across a fixed, ordered list of hosts
///
/// Members are created once and reused for every round. Duplicated hosts
/// get independent executors.
#[derive(Debug)]
pub struct ClusterCommand<E = SshCommand> {
    members: Vec<ClusterMember<E>>,
    stop_on_error: bool,
    cwd: Option<String>,
}

impl ClusterCommand<SshCommand> {
    /// One SSH adapter per `host` or `user@host` entry
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let env = ExecEnv::from_env();
        Self::from_members(hosts.into_iter().map(|host| {
            let host = host.as_ref().trim().to_string();
            let executor = SshCommand::from_target(HostTarget::parse(&host), env.clone());
            (host, executor)
        }))
    }

    /// One SSH adapter per target, labelled by its destination
    pub fn from_targets(targets: impl IntoIterator<Item = HostTarget>, env: &ExecEnv) -> Self {
        Self::from_members(targets.into_iter().map(|target| {
            let host = target.destination();
            (host, SshCommand::from_target(target, env.clone()))
        }))
    }

    /// Use `client` verbatim as the SSH client on every host
    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        let client = client.into();
        for member in &mut self.members {
            member.executor.set_client(Some(client.clone()));
        }
        self
    }

    /// Adjust every member's runner configuration
    #[must_use]
    pub fn configure_runners(mut self, configure: impl Fn(&mut RunnerConfig)) -> Self {
        for member in &mut self.members {
            configure(member.executor.runner_mut().config_mut());
        }
        self
    }
}

impl<E: CommandExecutor> ClusterCommand<E> {
    /// Cluster over explicit `(host, executor)` pairs, in order
    pub fn from_members(members: impl IntoIterator<Item = (String, E)>) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|(host, executor)| ClusterMember { host, executor })
                .collect(),
            stop_on_error: false,
            cwd: None,
        }
    }

    /// Abort rounds at the first failing host
    #[must_use]
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// Working directory applied to every host before each round
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn set_stop_on_error(&mut self, stop_on_error: bool) {
        self.stop_on_error = stop_on_error;
    }

    #[must_use]
    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    pub fn set_cwd(&mut self, cwd: Option<String>) {
        self.cwd = cwd;
    }

    #[must_use]
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Host labels in order
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.host.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn members(&self) -> &[ClusterMember<E>] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut [ClusterMember<E>] {
        &mut self.members
    }

    /// Drop commands left over from a round that was never waited on
    fn discard_stale(&mut self) {
        for member in &mut self.members {
            if member.executor.is_running() {
                warn!(host = %member.host, "discarding command from an unfinished round");
                member.executor.discard();
            }
        }
    }

    /// Start `command` on every host without waiting
    ///
    /// With stop-on-error, the first start failure ends the round and the
    /// remaining hosts are not attempted.
    #[instrument(skip(self), fields(hosts = self.members.len()))]
    pub fn start_all(&mut self, command: &str, timeout: Option<Duration>) -> Round {
        info!(mode = %ExecutionMode::Parallel, "starting round");
        self.discard_stale();

        let mut round = Round::with_capacity(self.members.len());

        for (index, member) in self.members.iter_mut().enumerate() {
            if let Some(cwd) = &self.cwd {
                member.executor.set_cwd(Some(cwd));
            }

            match member.executor.start(command, timeout) {
                Ok(output) => round.push(
                    ClusterResult {
                        host: member.host.clone(),
                        error: None,
                        output,
                    },
                    true,
                ),
                Err(err) => {
                    warn!(host = %member.host, error = %err, "failed to start command");
                    round.push(
                        ClusterResult {
                            host: member.host.clone(),
                            error: Some(err.clone()),
                            output: CommandResult::default(),
                        },
                        false,
                    );

                    if self.stop_on_error {
                        round.error = Some(ClusterError::new(index, &member.host, Phase::Start, err));
                        break;
                    }
                }
            }
        }

        round
    }

    /// Wait for every host started in `round`, in host order
    ///
    /// With stop-on-error, the first wait failure ends the round: hosts not
    /// waited on yet are aborted so nothing outlives the round.
    #[instrument(skip(self, round), fields(hosts = round.results.len()))]
    pub async fn wait_all(&mut self, round: Round) -> RoundReport {
        let Round {
            mut results,
            started,
            error: start_error,
        } = round;

        let mut stopping = false;

        for (index, member) in self.members.iter_mut().enumerate().take(results.len()) {
            if !started[index] {
                continue;
            }

            if stopping {
                results[index].error = member.executor.abort().await.err();
                continue;
            }

            if let Err(err) = member.executor.wait().await {
                warn!(host = %member.host, error = %err, "command failed");
                results[index].error = Some(err);
                stopping = self.stop_on_error;
            }
        }

        let error = start_error.or_else(|| {
            results.iter().enumerate().find_map(|(index, result)| {
                let phase = if started[index] { Phase::Wait } else { Phase::Start };
                result
                    .error
                    .clone()
                    .map(|err| ClusterError::new(index, &result.host, phase, err))
            })
        });

        info!(
            failed = results.iter().filter(|r| !r.success()).count(),
            ok = error.is_none(),
            "round finished"
        );

        RoundReport { results, error }
    }

    /// Start on every host at once, then wait for all of them
    pub async fn run_all(&mut self, command: &str, timeout: Option<Duration>) -> RoundReport {
        let round = self.start_all(command, timeout);
        self.wait_all(round).await
    }

    /// Run on one host at a time, in host order
    ///
    /// With stop-on-error, hosts after the first failure are never attempted
    /// and have no result entry.
    #[instrument(skip(self), fields(hosts = self.members.len()))]
    pub async fn run_sequential(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> RoundReport {
        info!(mode = %ExecutionMode::Sequential, "starting round");
        self.discard_stale();

        let mut results = Vec::with_capacity(self.members.len());
        let mut error = None;

        for (index, member) in self.members.iter_mut().enumerate() {
            if let Some(cwd) = &self.cwd {
                member.executor.set_cwd(Some(cwd));
            }

            let (output, host_error) = match member.executor.run(command, timeout).await {
                Ok(outcome) => (outcome.output, outcome.error),
                Err(err) => (CommandResult::default(), Some(err)),
            };

            results.push(ClusterResult {
                host: member.host.clone(),
                error: host_error.clone(),
                output,
            });

            if let Some(err) = host_error {
                warn!(host = %member.host, error = %err, "command failed");
                if error.is_none() {
                    error = Some(ClusterError::new(index, &member.host, Phase::Run, err));
                }
                if self.stop_on_error {
                    break;
                }
            }
        }

        info!(
            attempted = results.len(),
            ok = error.is_none(),
            "round finished"
        );

        RoundReport { results, error }
    }

    /// Run `command` on every host in the given mode
    pub async fn run(
        &mut self,
        mode: ExecutionMode,
        command: &str,
        timeout: Option<Duration>,
    ) -> RoundReport {
        match mode {
            ExecutionMode::Parallel => self.run_all(command, timeout).await,
            ExecutionMode::Sequential => self.run_sequential(command, timeout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Executor with canned outcomes that records every call
    #[derive(Default)]
    struct Scripted {
        name: String,
        stdout: &'static str,
        start_error: Option<ExecError>,
        wait_error: Option<ExecError>,
        running: bool,
        log: Log,
    }

    impl Scripted {
        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{}:{event}", self.name));
        }
    }

    #[async_trait]
    impl CommandExecutor for Scripted {
        fn start(
            &mut self,
            _command: &str,
            _timeout: Option<Duration>,
        ) -> Result<CommandResult, ExecError> {
            self.record("start");
            if let Some(err) = &self.start_error {
                return Err(err.clone());
            }
            if self.running {
                return Err(ExecError::AlreadyRunning);
            }
            self.running = true;
            let result = CommandResult::default();
            result.stdout.clone().write_all(self.stdout.as_bytes()).unwrap();
            Ok(result)
        }

        async fn wait(&mut self) -> Result<(), ExecError> {
            self.record("wait");
            self.running = false;
            match &self.wait_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        async fn abort(&mut self) -> Result<(), ExecError> {
            self.record("abort");
            self.running = false;
            Err(ExecError::Cancelled)
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn discard(&mut self) {
            self.record("discard");
            self.running = false;
        }

        fn set_cwd(&mut self, cwd: Option<&str>) {
            self.record(&format!("cwd={}", cwd.unwrap_or("-")));
        }

        fn executor_type(&self) -> &'static str {
            "scripted"
        }
    }

    fn failing_start() -> ExecError {
        ExecError::BinaryNotFound {
            what: "ssh",
            candidates: vec!["ssh".to_string()],
        }
    }

    fn failing_exit() -> ExecError {
        ExecError::ExitStatus { code: 1 }
    }

    /// Cluster `a`, `b`, `c` with per-host tweaks
    fn cluster(
        log: &Log,
        tweak: impl Fn(&str, &mut Scripted),
    ) -> ClusterCommand<Scripted> {
        ClusterCommand::from_members(["a", "b", "c"].into_iter().map(|name| {
            let mut executor = Scripted {
                name: name.to_string(),
                stdout: "hi\n",
                log: log.clone(),
                ..Scripted::default()
            };
            tweak(name, &mut executor);
            (name.to_string(), executor)
        }))
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_parallel_all_succeed() {
        let log = Log::default();
        let mut cluster = cluster(&log, |_, _| {});

        let report = cluster.run_all("echo hi", None).await;

        assert!(report.is_success());
        let hosts: Vec<_> = report.results.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, ["a", "b", "c"]);
        assert!(report.results.iter().all(|r| r.output.stdout.to_string() == "hi\n"));
        assert_eq!(
            events(&log),
            ["a:start", "b:start", "c:start", "a:wait", "b:wait", "c:wait"]
        );
    }

    #[tokio::test]
    async fn test_parallel_start_failure_attempts_everyone() {
        let log = Log::default();
        let mut cluster = cluster(&log, |name, e| {
            if name == "b" {
                e.start_error = Some(failing_start());
            }
        });

        let report = cluster.run_all("true", None).await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[1].error, Some(failing_start()));
        assert!(report.results[1].output.stdout.is_empty());
        let err = report.error.unwrap();
        assert_eq!((err.host.as_str(), err.phase), ("b", Phase::Start));
        assert_eq!(
            events(&log),
            ["a:start", "b:start", "c:start", "a:wait", "c:wait"]
        );
    }

    #[tokio::test]
    async fn test_parallel_start_failure_stops_round() {
        let log = Log::default();
        let mut cluster = cluster(&log, |name, e| {
            if name == "b" {
                e.start_error = Some(failing_start());
            }
        })
        .with_stop_on_error(true);

        let round = cluster.start_all("true", None);
        assert_eq!(round.results().len(), 2);
        assert_eq!(round.started_count(), 1);
        assert_eq!(round.error().map(|e| e.phase), Some(Phase::Start));

        let report = cluster.wait_all(round).await;
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.error.unwrap().host, "b");
        assert_eq!(events(&log), ["a:start", "b:start", "a:wait"]);
    }

    #[tokio::test]
    async fn test_first_wait_error_in_host_order_wins() {
        let log = Log::default();
        let mut cluster = cluster(&log, |name, e| {
            if name == "a" {
                e.wait_error = Some(failing_exit());
            }
            if name == "c" {
                e.wait_error = Some(ExecError::ExitStatus { code: 7 });
            }
        });

        let report = cluster.run_all("true", None).await;

        let err = report.error.as_ref().unwrap();
        assert_eq!((err.host.as_str(), err.phase), ("a", Phase::Wait));
        assert_eq!(err.source, failing_exit());
        assert!(report.results[1].success());
        assert_eq!(
            report.results[2].error,
            Some(ExecError::ExitStatus { code: 7 })
        );
        assert_eq!(report.failed().count(), 2);
    }

    #[tokio::test]
    async fn test_wait_failure_stops_and_aborts_the_rest() {
        let log = Log::default();
        let mut cluster = cluster(&log, |name, e| {
            if name == "a" {
                e.wait_error = Some(failing_exit());
            }
        })
        .with_stop_on_error(true);

        let report = cluster.run_all("true", None).await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.error.as_ref().unwrap().host, "a");
        assert_eq!(report.results[1].error, Some(ExecError::Cancelled));
        assert_eq!(report.results[2].error, Some(ExecError::Cancelled));
        assert_eq!(
            events(&log),
            ["a:start", "b:start", "c:start", "a:wait", "b:abort", "c:abort"]
        );
    }

    #[tokio::test]
    async fn test_sequential_stop_on_error_truncates() {
        let log = Log::default();
        let mut cluster = cluster(&log, |name, e| {
            if name == "a" {
                e.wait_error = Some(failing_exit());
            }
        })
        .with_stop_on_error(true);

        let report = cluster.run_sequential("false", None).await;

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].error, Some(failing_exit()));
        assert_eq!(report.results[0].output.stdout.to_string(), "hi\n");
        assert_eq!(report.error.unwrap().phase, Phase::Run);
        assert_eq!(events(&log), ["a:start", "a:wait"]);
    }

    #[tokio::test]
    async fn test_sequential_without_stop_runs_everyone() {
        let log = Log::default();
        let mut cluster = cluster(&log, |name, e| {
            if name == "b" {
                e.start_error = Some(failing_start());
            }
        });

        let report = cluster.run_sequential("true", None).await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.error.unwrap().host, "b");
        assert_eq!(
            events(&log),
            ["a:start", "a:wait", "b:start", "c:start", "c:wait"]
        );
    }

    #[tokio::test]
    async fn test_cwd_applied_before_each_host() {
        let log = Log::default();
        let mut cluster = cluster(&log, |_, _| {}).with_cwd("/tmp");

        cluster.run(ExecutionMode::Sequential, "pwd", None).await;

        assert_eq!(
            events(&log)[..3],
            ["a:cwd=/tmp", "a:start", "a:wait"]
        );
    }

    #[tokio::test]
    async fn test_cwd_untouched_when_unset() {
        let log = Log::default();
        let mut cluster = cluster(&log, |_, _| {});

        cluster.run(ExecutionMode::Parallel, "pwd", None).await;

        assert!(events(&log).iter().all(|e| !e.contains("cwd")));
    }

    #[tokio::test]
    async fn test_unwaited_round_is_discarded() {
        let log = Log::default();
        let mut cluster = cluster(&log, |_, _| {});

        drop(cluster.start_all("echo first", None));
        let report = cluster.run_all("echo second", None).await;

        assert!(report.is_success());
        assert_eq!(
            events(&log)[3..9],
            ["a:discard", "b:discard", "c:discard", "a:start", "b:start", "c:start"]
        );

        drop(cluster.start_all("echo third", None));
        let report = cluster.run_sequential("echo fourth", None).await;
        assert!(report.is_success());
        assert_eq!(report.results.len(), 3);
    }

    #[tokio::test]
    async fn test_rounds_are_independent() {
        let log = Log::default();
        let mut cluster = cluster(&log, |_, _| {});

        let first = cluster.run_all("echo hi", None).await;
        let second = cluster.run_all("echo hi", None).await;

        for (a, b) in first.results.iter().zip(&second.results) {
            assert_eq!(a.output.stdout.to_string(), b.output.stdout.to_string());
            assert_eq!(b.output.stdout.to_string(), "hi\n");
        }
    }

    #[test]
    fn test_execution_mode_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: ExecutionMode,
        }

        let parsed: Wrapper = toml::from_str("mode = \"sequential\"").unwrap();
        assert_eq!(parsed.mode, ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Parallel);
        assert_eq!(ExecutionMode::Parallel.to_string(), "parallel");
    }

    #[test]
    fn test_new_keeps_duplicates_and_order() {
        let cluster = ClusterCommand::new(["web-1", "deploy@web-2", "web-1"]);

        let hosts: Vec<_> = cluster.hosts().collect();
        assert_eq!(hosts, ["web-1", "deploy@web-2", "web-1"]);
        assert_eq!(cluster.members()[1].executor.target().host, "web-2");
        assert_eq!(
            cluster.members()[1].executor.target().user.as_deref(),
            Some("deploy")
        );
    }
}
