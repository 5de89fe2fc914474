//! Logging setup using `tracing` + `tracing-subscriber`
//!
//! Priority for determining the filter:
//! 1. `--log-level` flag
//! 2. `FLEETCMD_LOG` environment variable (any `EnvFilter` directive)
//! 3. `warn`
//!
//! Logs go to stderr; stdout carries command output and reports.

use eyre::Result;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "FLEETCMD_LOG";

/// Install the global subscriber; call once at startup
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(cli_level, std::env::var(LOG_ENV).ok().as_deref()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install logger: {e}"))
}

fn filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_str());
    }

    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}
