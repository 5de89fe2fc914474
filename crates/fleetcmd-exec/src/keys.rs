//! SSH identity file checks

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ExecError;

/// Check that an identity file exists before handing it to the SSH client
///
/// Keys readable by group or others are accepted but logged, since the
/// OpenSSH client refuses them with its own error.
///
/// # Errors
/// Returns `ExecError::KeyNotFound` if the path does not exist
pub fn validate_key(path: &Path) -> Result<PathBuf, ExecError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata =
        std::fs::metadata(path).map_err(|_| ExecError::KeyNotFound(path.display().to_string()))?;

    let mode = metadata.permissions().mode();
    if mode & 0o77 != 0 {
        warn!(
            path = %path.display(),
            mode = format!("{:o}", mode & 0o777),
            "SSH key permissions too open (should be 600)"
        );
    }

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn test_missing_key() {
        let err = validate_key(Path::new("/definitely/not/here/id_ed25519")).unwrap_err();
        assert_eq!(
            err,
            ExecError::KeyNotFound("/definitely/not/here/id_ed25519".to_string())
        );
    }

    #[test]
    fn test_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_test");
        fs::write(&key, b"key").unwrap();
        fs::set_permissions(&key, fs::Permissions::from_mode(0o600)).unwrap();

        assert_eq!(validate_key(&key), Ok(key.clone()));
    }
}
