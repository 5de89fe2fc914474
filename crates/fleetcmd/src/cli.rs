//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "fleetcmd", version)]
#[command(about = "Run shell commands across a fleet of hosts over SSH", long_about = None)]
pub struct Cli {
    /// Configuration file (default: FLEETCMD_CONFIG, ./fleetcmd.toml, system and user config dirs)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (overrides FLEETCMD_LOG)
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command on several hosts
    Run(RunArgs),
    /// Run a command on this machine
    Local(LocalArgs),
    /// List configured hosts
    Hosts,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Target host as `host` or `user@host` (repeatable; overrides the config)
    #[arg(short = 'H', long = "host")]
    pub hosts: Vec<String>,

    /// Only configured hosts carrying this tag (repeatable)
    #[arg(short = 't', long = "tag")]
    pub tags: Vec<String>,

    /// Run one host at a time
    #[arg(long)]
    pub sequential: bool,

    /// Abort at the first failing host
    #[arg(long)]
    pub stop_on_error: bool,

    /// Per-host timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Working directory on every host
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<String>,

    /// Don't stream command output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print a JSON report instead of streaming output
    #[arg(long)]
    pub json: bool,

    /// Command to run
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LocalArgs {
    /// Timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Use a login shell
    #[arg(long)]
    pub login: bool,

    /// Use an interactive shell and pass stdin through
    #[arg(long)]
    pub interactive: bool,

    /// Command to run
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from([
            "fleetcmd", "run", "-H", "web-1", "-H", "root@web-2", "--stop-on-error", "--timeout",
            "30", "--", "uptime", "-p",
        ]);

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.hosts, ["web-1", "root@web-2"]);
        assert!(args.stop_on_error);
        assert!(!args.sequential);
        assert_eq!(args.timeout, Some(30));
        assert_eq!(args.command, ["uptime", "-p"]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["fleetcmd", "hosts", "--log-level", "debug"]);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(matches!(cli.command, Commands::Hosts));
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["fleetcmd", "local", "--login"]).is_err());
    }
}
