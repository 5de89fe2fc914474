//! fleetcmd CLI
//!
//! Runs a shell command on many hosts through the OpenSSH client, or on
//! this machine, streaming host-tagged output as it arrives.

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use eyre::bail;
use fleetcmd_core::{ClusterCommand, ExecutionMode, HostFilter};
use fleetcmd_exec::colors::{paint_error, paint_host};
use fleetcmd_exec::{
    CommandExecutor, CommandRunner, ExecEnv, ExecError, HostTarget, RunnerConfig,
};

mod cli;
mod config;
mod logging;
mod report;

use cli::{Cli, Commands, LocalArgs, RunArgs};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logging(cli.log_level)?;

    let config_path = cli.config;
    let code = match cli.command {
        Commands::Run(args) => run(&load_config(config_path.as_deref())?, args).await?,
        Commands::Local(args) => local(args).await?,
        Commands::Hosts => {
            hosts(&load_config(config_path.as_deref())?);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

async fn run(config: &Config, args: RunArgs) -> Result<i32> {
    let targets = if args.hosts.is_empty() {
        let filter = HostFilter {
            tags: args.tags,
            ..HostFilter::default()
        };
        config.select_hosts(&filter)?
    } else {
        args.hosts.iter().map(HostTarget::parse).collect()
    };

    if targets.is_empty() {
        bail!("no hosts selected: pass -H or add [[host]] entries to the config");
    }

    let policy = &config.run;
    let mode = if args.sequential {
        ExecutionMode::Sequential
    } else {
        policy.mode
    };
    let timeout = match args.timeout {
        Some(secs) => timeout_from_secs(secs),
        None => policy.timeout(),
    };
    let command = args.command.join(" ");

    let mut cluster = ClusterCommand::from_targets(targets, &ExecEnv::from_env())
        .with_stop_on_error(args.stop_on_error || policy.stop_on_error);
    cluster.set_cwd(args.cwd.or_else(|| policy.cwd.clone()));

    if args.quiet || args.json {
        cluster = cluster.configure_runners(|runner| {
            runner.mute_stdout = true;
            runner.mute_stderr = true;
            runner.mute_echo = true;
        });
    }

    tracing::info!(hosts = cluster.len(), %mode, command = %command, "running");
    let report = cluster.run(mode, &command, timeout).await;

    if args.json {
        println!("{}", report::to_json(&report)?);
    } else {
        print!("{}", report::summary(&report, cluster.len()));
    }

    Ok(i32::from(!report.is_success()))
}

async fn local(args: LocalArgs) -> Result<i32> {
    let config = RunnerConfig {
        login: args.login,
        interactive: args.interactive,
        inherit_stdin: args.interactive,
        ..RunnerConfig::default()
    };
    let mut runner = CommandRunner::new(config);
    let command = args.command.join(" ");

    let outcome = runner
        .run(&command, args.timeout.and_then(timeout_from_secs))
        .await?;

    Ok(match outcome.error {
        None => 0,
        Some(err) => {
            eprintln!("{}", paint_error(&err.to_string()));
            exit_code(&err)
        }
    })
}

/// Shell-style exit code for a failed command
fn exit_code(err: &ExecError) -> i32 {
    if let Some(code) = err.exit_code() {
        return code;
    }
    match err.signal() {
        Some(signal) => 128 + signal,
        None => 1,
    }
}

fn hosts(config: &Config) {
    if config.host.is_empty() {
        println!("No hosts configured");
        return;
    }

    for (index, host) in config.host.iter().enumerate() {
        let name = match host.target(index) {
            Ok(target) => paint_host(&target.destination()),
            Err(err) => paint_error(&err.to_string()),
        };
        if host.tags.is_empty() {
            println!("{name}");
        } else {
            println!("{name} [{}]", host.tags.join(", "));
        }
    }
}
