//! fleetcmd-exec: Command execution primitives
//!
//! Runs shell commands locally or through the OpenSSH client, streaming
//! prefixed output to the console while recording it for inspection.

pub mod colors;
pub mod error;
pub mod keys;
pub mod local;
pub mod path;
pub mod result;
pub mod ssh;
pub mod stream;
pub mod target;
pub mod traits;

pub use error::ExecError;
pub use local::{CommandRunner, Prefixes, RunnerConfig};
pub use path::{ExecEnv, SearchPath};
pub use result::{CommandResult, OutputBuffer, RunOutcome};
pub use ssh::SshCommand;
pub use stream::{PrefixedStream, Sink};
pub use target::HostTarget;
pub use traits::CommandExecutor;
