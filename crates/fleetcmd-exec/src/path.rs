//! Binary lookup on the executable search path

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ExecError;

/// Environment variable holding the user's shell
pub const SHELL_ENV: &str = "SHELL";

/// Environment variable overriding the SSH client binary
pub const SSH_BIN_ENV: &str = "SSH_BIN_PATH";

/// Fallback shells, tried after the explicit override and `$SHELL`
pub const DEFAULT_SHELLS: &[&str] = &["bash", "sh"];

/// Default SSH client name
pub const DEFAULT_SSH_BIN: &str = "ssh";

/// Ordered list of directories searched for executables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Search path from the given directories
    pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Search path from `$PATH`
    #[must_use]
    pub fn from_env() -> Self {
        let dirs = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect())
            .unwrap_or_default();
        Self { dirs }
    }

    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Locate an executable by name
    ///
    /// Names containing a path separator are checked as-is instead of
    /// being searched for.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }

        if name.contains(std::path::MAIN_SEPARATOR) {
            let path = PathBuf::from(name);
            return is_executable(&path).then_some(path);
        }

        self.dirs
            .iter()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(name))
            .find(|path| is_executable(path))
    }

    /// Locate the first candidate that resolves, in order
    ///
    /// # Errors
    /// Returns `ExecError::BinaryNotFound` listing the non-empty candidates
    pub fn find_first<S: AsRef<str>>(
        &self,
        what: &'static str,
        candidates: &[S],
    ) -> Result<PathBuf, ExecError> {
        for candidate in candidates {
            if let Some(path) = self.find(candidate.as_ref()) {
                debug!(what, path = %path.display(), "resolved binary");
                return Ok(path);
            }
        }

        Err(ExecError::BinaryNotFound {
            what,
            candidates: candidates
                .iter()
                .map(|c| c.as_ref().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        })
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Binary resolution inputs, captured once and handed to runners
#[derive(Debug, Clone, Default)]
pub struct ExecEnv {
    /// Directories searched for the shell and SSH client
    pub search_path: SearchPath,
    /// Value of `$SHELL`
    pub shell: Option<String>,
    /// Value of `$SSH_BIN_PATH`
    pub ssh_bin: Option<String>,
}

impl ExecEnv {
    /// Capture `$PATH`, `$SHELL` and `$SSH_BIN_PATH`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            search_path: SearchPath::from_env(),
            shell: non_empty_var(SHELL_ENV),
            ssh_bin: non_empty_var(SSH_BIN_ENV),
        }
    }

    /// Shell candidates in resolution order
    #[must_use]
    pub fn shell_candidates(&self, explicit: Option<&Path>) -> Vec<String> {
        let mut candidates: Vec<String> = explicit
            .map(|p| p.display().to_string())
            .into_iter()
            .chain(self.shell.clone())
            .collect();
        candidates.extend(DEFAULT_SHELLS.iter().map(|s| (*s).to_string()));
        candidates
    }

    /// SSH client candidates in resolution order
    #[must_use]
    pub fn ssh_candidates(&self) -> Vec<String> {
        self.ssh_bin
            .clone()
            .into_iter()
            .chain(std::iter::once(DEFAULT_SSH_BIN.to_string()))
            .collect()
    }

    /// Resolve the shell binary
    ///
    /// # Errors
    /// Returns `ExecError::BinaryNotFound` if no candidate is executable
    pub fn resolve_shell(&self, explicit: Option<&Path>) -> Result<PathBuf, ExecError> {
        self.search_path
            .find_first("shell", &self.shell_candidates(explicit))
    }

    /// Resolve the SSH client binary
    ///
    /// # Errors
    /// Returns `ExecError::BinaryNotFound` if no candidate is executable
    pub fn resolve_ssh(&self) -> Result<PathBuf, ExecError> {
        self.search_path.find_first("ssh", &self.ssh_candidates())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
